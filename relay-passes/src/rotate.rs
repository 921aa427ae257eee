//! `RotateLeft`, the one pass whose metadata lands at the FRONT of the
//! buffer rather than the tail (unlike every other pass in this crate).
//! Grounded in `original_source/bytes/passes.go`'s `rotateLeft`/`rotateRight`.

use rand::RngCore;
use relay_core::error::{Error, Result};

use crate::iovec::IoVec;
use crate::pass::Pass;

/// Forward direction: draws a 16-bit `n`, writes it big-endian at the front,
/// then emits `payload[n % len:] ++ payload[:n % len]`. An empty payload is
/// left as just the 2-byte header, matching the upstream behavior of
/// short-circuiting when `len(p) == 0`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RotateLeftEncoder;

impl Pass for RotateLeftEncoder {
    fn run(&self, iov: &mut IoVec, rng: &mut dyn RngCore) -> Result<()> {
        let payload = iov.consume();
        let n = (rng.next_u32() & 0xffff) as u16;
        let mut out = Vec::with_capacity(2 + payload.len());
        out.extend_from_slice(&n.to_be_bytes());
        if !payload.is_empty() {
            let shift = (n as usize) % payload.len();
            out.extend_from_slice(&payload[shift..]);
            out.extend_from_slice(&payload[..shift]);
        }
        iov.take(out);
        Ok(())
    }
}

/// Inverse direction: reads the 2-byte big-endian header off the front, then
/// rotates the remainder right by `n % remaining_len`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RotateLeftDecoder;

impl Pass for RotateLeftDecoder {
    fn run(&self, iov: &mut IoVec, _rng: &mut dyn RngCore) -> Result<()> {
        if iov.len() < 2 {
            return Err(Error::protocol("rotate-left frame shorter than its 2-byte header"));
        }
        let rest = iov.split(2);
        let header = iov.consume();
        let n = u16::from_be_bytes([header[0], header[1]]) as usize;
        let payload = rest.concat();
        if payload.is_empty() {
            iov.take(payload);
            return Ok(());
        }
        let shift = n % payload.len();
        let split_at = payload.len() - shift;
        let mut out = Vec::with_capacity(payload.len());
        out.extend_from_slice(&payload[split_at..]);
        out.extend_from_slice(&payload[..split_at]);
        iov.take(out);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn round_trips_nonempty_payload() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut iov = IoVec::from_slice(b"hello, rotating world");
        RotateLeftEncoder.run(&mut iov, &mut rng).unwrap();
        RotateLeftDecoder.run(&mut iov, &mut rng).unwrap();
        assert_eq!(iov.concat().as_ref(), b"hello, rotating world");
    }

    #[test]
    fn round_trips_empty_payload() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut iov = IoVec::new();
        RotateLeftEncoder.run(&mut iov, &mut rng).unwrap();
        assert_eq!(iov.len(), 2);
        RotateLeftDecoder.run(&mut iov, &mut rng).unwrap();
        assert!(iov.is_empty());
    }
}
