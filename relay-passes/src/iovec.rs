//! Non-contiguous byte buffer: a scatter list of owned, cheaply-cloneable
//! segments. Reads drain from the front, [`IoVec::take`] appends at the back,
//! [`IoVec::drop_tail`] removes from the back, matching spec.md §4.1.

use bytes::{Buf, Bytes};
use std::io::{self, IoSlice, Write};

use relay_core::error::{Error, Result};

/// An ordered sequence of non-owning byte slices. `Bytes` gives each segment
/// cheap (`Arc`-refcounted) clones, so [`IoVec::take`] never copies the bytes
/// it's handed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IoVec {
    segments: Vec<Bytes>,
}

impl IoVec {
    /// An empty `IoVec`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a single-segment `IoVec` from a slice, copying it into an
    /// owned `Bytes`.
    pub fn from_slice(s: &[u8]) -> Self {
        Self {
            segments: vec![Bytes::copy_from_slice(s)],
        }
    }

    /// Sum of all segment lengths.
    pub fn len(&self) -> usize {
        self.segments.iter().map(Bytes::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends a segment at the back with no copy.
    pub fn take(&mut self, s: impl Into<Bytes>) -> &mut Self {
        let b: Bytes = s.into();
        if !b.is_empty() {
            self.segments.push(b);
        }
        self
    }

    /// Collects all segments into one contiguous, owned buffer. Clones every
    /// byte when there's more than one segment; `O(1)` (a single `Bytes`
    /// clone) when there's exactly one.
    pub fn concat(&self) -> Bytes {
        match self.segments.as_slice() {
            [] => Bytes::new(),
            [only] => only.clone(),
            many => {
                let total: usize = many.iter().map(Bytes::len).sum();
                let mut out = Vec::with_capacity(total);
                for seg in many {
                    out.extend_from_slice(seg);
                }
                Bytes::from(out)
            }
        }
    }

    /// Alias for [`IoVec::concat`], matching the spec's `as-one` name.
    pub fn as_one_slice(&self) -> Bytes {
        self.concat()
    }

    /// Returns a contiguous copy of the whole buffer and empties `self`.
    /// `O(1)` when there was exactly one segment.
    pub fn consume(&mut self) -> Bytes {
        let out = self.concat();
        self.segments.clear();
        out
    }

    /// Scatter-writes every segment to `w` using vectored I/O where the
    /// writer supports it, falling back to sequential writes otherwise.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<usize> {
        let slices: Vec<IoSlice<'_>> = self.segments.iter().map(|b| IoSlice::new(b)).collect();
        let mut written = 0usize;
        let mut idx = 0usize;
        let mut offset = 0usize;
        while idx < slices.len() {
            let remaining: Vec<IoSlice<'_>> = self.segments[idx..]
                .iter()
                .enumerate()
                .map(|(i, b)| {
                    if i == 0 {
                        IoSlice::new(&b[offset..])
                    } else {
                        IoSlice::new(b)
                    }
                })
                .collect();
            let n = w.write_vectored(&remaining)?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "write_vectored wrote 0 bytes"));
            }
            written += n;
            let mut remaining_n = n;
            while idx < self.segments.len() {
                let seg_len = self.segments[idx].len() - offset;
                if remaining_n < seg_len {
                    offset += remaining_n;
                    break;
                }
                remaining_n -= seg_len;
                offset = 0;
                idx += 1;
            }
        }
        Ok(written)
    }

    /// Drains bytes from the front into `dst`, returning how many were
    /// copied (`min(self.len(), dst.len())`). Fully-drained leading segments
    /// are dropped; a partially-drained segment is split in place.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let mut copied = 0usize;
        while copied < dst.len() {
            let Some(front) = self.segments.first_mut() else {
                break;
            };
            let want = dst.len() - copied;
            let take = want.min(front.len());
            dst[copied..copied + take].copy_from_slice(&front[..take]);
            copied += take;
            front.advance(take);
            if front.is_empty() {
                self.segments.remove(0);
            }
        }
        copied
    }

    /// Random access to byte `i` across segment boundaries. `O(segments)`.
    pub fn at(&self, mut i: usize) -> Option<u8> {
        for seg in &self.segments {
            if i < seg.len() {
                return Some(seg[i]);
            }
            i -= seg.len();
        }
        None
    }

    /// Returns the segment containing byte `i`, if any.
    pub fn peek(&self, mut i: usize) -> Option<&Bytes> {
        for seg in &self.segments {
            if i < seg.len() {
                return Some(seg);
            }
            i -= seg.len();
        }
        None
    }

    /// The final byte of the buffer, if non-empty.
    pub fn last_byte(&self) -> Option<u8> {
        self.segments.iter().rev().find_map(|seg| seg.last().copied())
    }

    /// Removes the final `n` bytes. Errors if the buffer holds fewer than
    /// `n` bytes. Handles removal that crosses segment boundaries by
    /// dropping whole trailing segments and truncating the final retained
    /// one.
    pub fn drop_tail(&mut self, mut n: usize) -> Result<()> {
        if n > self.len() {
            return Err(Error::protocol(format!(
                "cannot drop {n} bytes from an IoVec of length {}",
                self.len()
            )));
        }
        while n > 0 {
            let Some(last) = self.segments.last_mut() else {
                break;
            };
            if last.len() <= n {
                n -= last.len();
                self.segments.pop();
            } else {
                let keep = last.len() - n;
                *last = last.slice(0..keep);
                n = 0;
            }
        }
        Ok(())
    }

    /// Splits the buffer at byte offset `i`: `self` becomes the prefix
    /// `[0, i)` and the returned `IoVec` is the suffix `[i, len)`.
    pub fn split(&mut self, i: usize) -> IoVec {
        assert!(i <= self.len(), "split index out of bounds");
        let mut suffix = Vec::new();
        let mut remaining = i;
        let mut split_at_segment = None;
        for (idx, seg) in self.segments.iter().enumerate() {
            if remaining < seg.len() {
                split_at_segment = Some((idx, remaining));
                break;
            }
            remaining -= seg.len();
        }
        match split_at_segment {
            None => {
                // i == self.len(): suffix is empty.
            }
            Some((idx, offset)) => {
                let boundary_seg = self.segments[idx].clone();
                suffix.push(boundary_seg.slice(offset..));
                suffix.extend(self.segments.drain(idx + 1..));
                self.segments[idx] = self.segments[idx].slice(0..offset);
            }
        }
        IoVec { segments: suffix }
    }
}

impl From<Bytes> for IoVec {
    fn from(b: Bytes) -> Self {
        let mut v = IoVec::new();
        v.take(b);
        v
    }
}

impl From<Vec<u8>> for IoVec {
    fn from(v: Vec<u8>) -> Self {
        IoVec::from(Bytes::from(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_and_consume() {
        let mut v = IoVec::new();
        v.take(Bytes::from_static(b"hello"));
        v.take(Bytes::from_static(b"bar"));
        assert_eq!(v.len(), 8);
        assert_eq!(v.at(7), Some(b'r'));
        v.drop_tail(3).unwrap();
        assert_eq!(v.consume(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn split_head_and_tail() {
        let mut v = IoVec::new();
        v.take(Bytes::from_static(b"hello"));
        v.take(Bytes::from_static(b"bar"));
        let mut tail = v.split(5);
        assert_eq!(tail.consume(), Bytes::from_static(b"bar"));
        assert_eq!(v.consume(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn split_mid_segment() {
        let mut v = IoVec::new();
        v.take(Bytes::from_static(b"abcdef"));
        v.take(Bytes::from_static(b"ghij"));
        let mut tail = v.split(4);
        assert_eq!(v.consume(), Bytes::from_static(b"abcd"));
        assert_eq!(tail.consume(), Bytes::from_static(b"efghij"));
    }

    #[test]
    fn drop_tail_crosses_segment_boundary() {
        let mut v = IoVec::new();
        v.take(Bytes::from_static(b"abc"));
        v.take(Bytes::from_static(b"def"));
        v.drop_tail(4).unwrap();
        assert_eq!(v.consume(), Bytes::from_static(b"ab"));
    }

    #[test]
    fn drop_tail_too_much_errors() {
        let mut v = IoVec::from_slice(b"abc");
        assert!(v.drop_tail(4).is_err());
    }

    #[test]
    fn read_drains_from_front_across_segments() {
        let mut v = IoVec::new();
        v.take(Bytes::from_static(b"ab"));
        v.take(Bytes::from_static(b"cdef"));
        let mut dst = [0u8; 3];
        let n = v.read(&mut dst);
        assert_eq!(n, 3);
        assert_eq!(&dst, b"abc");
        assert_eq!(v.consume(), Bytes::from_static(b"def"));
    }

    #[test]
    fn write_to_scatters_all_segments() {
        let mut v = IoVec::new();
        v.take(Bytes::from_static(b"foo"));
        v.take(Bytes::from_static(b"bar"));
        let mut out = Vec::new();
        let n = v.write_to(&mut out).unwrap();
        assert_eq!(n, 6);
        assert_eq!(out, b"foobar");
    }
}
