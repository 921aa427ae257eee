//! Tail-tagged obfuscation passes: `SimpleOBFS` (byte-swap plus random
//! padding) and `TailPadding` (padding alone). Both append their metadata at
//! the end of the buffer, per the tail-tag convention spec.md §6 describes
//! for most passes (contrast [`crate::rotate`], which is the exception).
//! Grounded in `original_source/bytes/obfs.go` and `original_source/passes/passes.go`.

use rand::RngCore;
use relay_core::error::{Error, Result};

use crate::byteswap::byte_swap;
use crate::iovec::IoVec;
use crate::pass::Pass;

fn random_bytes(rng: &mut dyn RngCore, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    rng.fill_bytes(&mut buf);
    buf
}

/// Encode: byte-swap the payload, append `n` random padding bytes (`n` drawn
/// mod 64), then a single trailing count byte `n`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OBFSEncoder;

impl Pass for OBFSEncoder {
    fn run(&self, iov: &mut IoVec, rng: &mut dyn RngCore) -> Result<()> {
        let swapped = byte_swap(&iov.consume());
        let n = (rng.next_u32() % 64) as u8;
        let mut out = Vec::with_capacity(swapped.len() + n as usize + 1);
        out.extend_from_slice(&swapped);
        out.extend_from_slice(&random_bytes(rng, n as usize));
        out.push(n);
        iov.take(out);
        Ok(())
    }
}

/// Decode: read the trailing count byte, drop it plus that many padding
/// bytes, then byte-swap the remainder back.
#[derive(Debug, Default, Clone, Copy)]
pub struct OBFSDecoder;

impl Pass for OBFSDecoder {
    fn run(&self, iov: &mut IoVec, _rng: &mut dyn RngCore) -> Result<()> {
        let n = iov
            .last_byte()
            .ok_or_else(|| Error::protocol("OBFS frame is empty, missing count byte"))?;
        iov.drop_tail(1 + n as usize)?;
        let unswapped = byte_swap(&iov.consume());
        iov.take(unswapped);
        Ok(())
    }
}

/// Encode: append `l` random padding bytes (`l` a multiple of 4 in `[0, 60]`,
/// per `(rand % 64) & (63 << 2)`), then a single trailing count byte `l`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TailPaddingEncoder;

impl Pass for TailPaddingEncoder {
    fn run(&self, iov: &mut IoVec, rng: &mut dyn RngCore) -> Result<()> {
        let l = ((rng.next_u32() % 64) as u8) & (63u8 << 2);
        let padding = random_bytes(rng, l as usize);
        iov.take(padding);
        iov.take(vec![l]);
        Ok(())
    }
}

/// Decode: read the trailing count byte and drop it plus that many padding
/// bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct TailPaddingDecoder;

impl Pass for TailPaddingDecoder {
    fn run(&self, iov: &mut IoVec, _rng: &mut dyn RngCore) -> Result<()> {
        let l = iov
            .last_byte()
            .ok_or_else(|| Error::protocol("tail-padding frame is empty, missing count byte"))?;
        iov.drop_tail(1 + l as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn obfs_round_trips() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut iov = IoVec::from_slice(b"obfuscate me, please");
        OBFSEncoder.run(&mut iov, &mut rng).unwrap();
        assert!(iov.len() > 21);
        OBFSDecoder.run(&mut iov, &mut rng).unwrap();
        assert_eq!(iov.concat().as_ref(), b"obfuscate me, please");
    }

    #[test]
    fn tail_padding_round_trips_and_is_multiple_of_four() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut iov = IoVec::from_slice(b"pad me");
        TailPaddingEncoder.run(&mut iov, &mut rng).unwrap();
        let added = iov.len() - 6;
        assert_eq!((added - 1) % 4, 0);
        TailPaddingDecoder.run(&mut iov, &mut rng).unwrap();
        assert_eq!(iov.concat().as_ref(), b"pad me");
    }

    #[test]
    fn obfs_decode_rejects_empty_input() {
        let mut rng = rand::thread_rng();
        let mut iov = IoVec::new();
        assert!(OBFSDecoder.run(&mut iov, &mut rng).is_err());
    }
}
