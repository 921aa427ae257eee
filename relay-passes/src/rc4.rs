//! Hand-rolled RC4, used as an obfuscation (not security) primitive, the
//! same role the upstream fills with a standard-library RC4 implementation
//! rather than a vendored crate.
//!
//! Encode draws a fresh 32-bit key per call, writes it big-endian at the
//! front, then XORs the remainder with the RC4 keystream under that key.
//! Decode reads the key back off the front and repeats the XOR (RC4 keystream
//! XOR is its own inverse given the same key).

use rand::RngCore;
use relay_core::error::{Error, Result};

use crate::iovec::IoVec;
use crate::pass::Pass;

struct Rc4 {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    fn new(key: &[u8]) -> Self {
        let mut s = [0u8; 256];
        for (idx, slot) in s.iter_mut().enumerate() {
            *slot = idx as u8;
        }
        let mut j = 0u8;
        for i in 0..256usize {
            j = j.wrapping_add(s[i]).wrapping_add(key[i % key.len()]);
            s.swap(i, j as usize);
        }
        Self { s, i: 0, j: 0 }
    }

    fn apply_keystream(&mut self, data: &mut [u8]) {
        for byte in data {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.s[self.i as usize]);
            self.s.swap(self.i as usize, self.j as usize);
            let k = self.s[(self.s[self.i as usize].wrapping_add(self.s[self.j as usize])) as usize];
            *byte ^= k;
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Rc4Encoder;

impl Pass for Rc4Encoder {
    fn run(&self, iov: &mut IoVec, rng: &mut dyn RngCore) -> Result<()> {
        let mut key = [0u8; 4];
        rng.fill_bytes(&mut key);
        let mut payload = iov.consume().to_vec();
        Rc4::new(&key).apply_keystream(&mut payload);
        let mut out = Vec::with_capacity(4 + payload.len());
        out.extend_from_slice(&key);
        out.extend_from_slice(&payload);
        iov.take(out);
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Rc4Decoder;

impl Pass for Rc4Decoder {
    fn run(&self, iov: &mut IoVec, _rng: &mut dyn RngCore) -> Result<()> {
        if iov.len() < 4 {
            return Err(Error::protocol("RC4 frame shorter than its 4-byte key header"));
        }
        let rest = iov.split(4);
        let key_bytes = iov.consume();
        let mut payload = rest.concat().to_vec();
        Rc4::new(&key_bytes).apply_keystream(&mut payload);
        iov.take(payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn round_trips() {
        let mut rng = StdRng::seed_from_u64(123);
        let mut iov = IoVec::from_slice(b"the quick brown fox jumps");
        Rc4Encoder.run(&mut iov, &mut rng).unwrap();
        assert_ne!(iov.concat().as_ref(), b"the quick brown fox jumps");
        Rc4Decoder.run(&mut iov, &mut rng).unwrap();
        assert_eq!(iov.concat().as_ref(), b"the quick brown fox jumps");
    }

    #[test]
    fn known_answer_matches_reference_keystream() {
        // RC4 KSA+PRGA test vector: key "Key", plaintext "Plaintext".
        let mut rc4 = Rc4::new(b"Key");
        let mut data = b"Plaintext".to_vec();
        rc4.apply_keystream(&mut data);
        assert_eq!(data, vec![0xBB, 0xF3, 0x16, 0xE8, 0xD9, 0x40, 0xAF, 0x0A, 0xD3]);
    }
}
