//! `ByteSwap` reverses byte order in 8-byte lanes, passing a trailing
//! tail shorter than 8 bytes through unchanged. Self-inverse: applying it
//! twice restores the input regardless of length, because each full lane is
//! reversed twice (identity) and the tail is never touched either time.
//! Grounded in `original_source/bytes/passes.go`'s `byteSwap`.

use rand::RngCore;
use relay_core::error::Result;

use crate::iovec::IoVec;
use crate::pass::Pass;

/// Reverses every full 8-byte lane of `data`; any trailing `< 8` byte tail
/// is copied through unmodified. See the module docs for the symmetry
/// argument behind why this is its own inverse.
pub fn byte_swap(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut chunks = data.chunks_exact(8);
    for chunk in &mut chunks {
        let mut lane = [0u8; 8];
        lane.copy_from_slice(chunk);
        lane.reverse();
        out.extend_from_slice(&lane);
    }
    out.extend_from_slice(chunks.remainder());
    out
}

/// The `ByteSwap` pass. Used both as its own forward and inverse; register
/// the same instance (or a fresh one, it's stateless) on both sides of a
/// [`crate::pass::PassManagerBuilder::add_paired_passes`] call.
#[derive(Debug, Default, Clone, Copy)]
pub struct ByteSwapPass;

impl Pass for ByteSwapPass {
    fn run(&self, iov: &mut IoVec, _rng: &mut dyn RngCore) -> Result<()> {
        let swapped = byte_swap(&iov.consume());
        iov.take(swapped);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swaps_full_lanes_and_passes_tail() {
        let data = b"01234567ab";
        let swapped = byte_swap(data);
        assert_eq!(&swapped[..8], b"76543210");
        assert_eq!(&swapped[8..], b"ab");
    }

    #[test]
    fn is_self_inverse_for_any_length() {
        for len in 0..20usize {
            let data: Vec<u8> = (0..len as u8).collect();
            let once = byte_swap(&data);
            let twice = byte_swap(&once);
            assert_eq!(twice, data, "length {len} failed round trip");
        }
    }
}
