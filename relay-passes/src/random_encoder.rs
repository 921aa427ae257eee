//! `RandomEncoder`/`RandomDecoder` hold `k` candidate sub-pipelines and
//! pick one per call, tagging the choice in a trailing byte so the peer can
//! pick the matching inverse. Grounded in
//! `original_source/relayer/comm.go`'s `RandomEncoder`/`RandomDecoder`.
//!
//! The tag byte only carries the low 8 bits of the index draw (`n & 0xff`,
//! matching the upstream wire format exactly), so the decoder's `tag % k`
//! only reproduces the encoder's `n % k` when `k` divides 256. See
//! DESIGN.md for the pipeline-count constraint this implies.

use rand::RngCore;
use relay_core::error::{Error, Result};

use crate::iovec::IoVec;
use crate::pass::{Pass, PassManager};

pub struct RandomEncoder {
    pipelines: Vec<PassManager>,
}

impl RandomEncoder {
    pub fn new(pipelines: Vec<PassManager>) -> Self {
        debug_assert!(
            !pipelines.is_empty() && 256usize % pipelines.len() == 0,
            "RandomEncoder pipeline count should divide 256 so the tag byte round-trips"
        );
        Self { pipelines }
    }
}

impl Pass for RandomEncoder {
    fn run(&self, iov: &mut IoVec, rng: &mut dyn RngCore) -> Result<()> {
        if self.pipelines.is_empty() {
            return Err(Error::protocol("RandomEncoder has no pipelines configured"));
        }
        let n = rng.next_u32();
        let index = (n as usize) % self.pipelines.len();
        self.pipelines[index].run(iov, rng)?;
        iov.take(vec![(n & 0xff) as u8]);
        Ok(())
    }
}

pub struct RandomDecoder {
    pipelines: Vec<PassManager>,
}

impl RandomDecoder {
    pub fn new(pipelines: Vec<PassManager>) -> Self {
        debug_assert!(
            !pipelines.is_empty() && 256usize % pipelines.len() == 0,
            "RandomDecoder pipeline count should divide 256 so the tag byte round-trips"
        );
        Self { pipelines }
    }
}

impl Pass for RandomDecoder {
    fn run(&self, iov: &mut IoVec, rng: &mut dyn RngCore) -> Result<()> {
        if self.pipelines.is_empty() {
            return Err(Error::protocol("RandomDecoder has no pipelines configured"));
        }
        let tag = iov
            .last_byte()
            .ok_or_else(|| Error::protocol("RandomEncoder frame is empty, missing tag byte"))?;
        iov.drop_tail(1)?;
        let index = (tag as usize) % self.pipelines.len();
        self.pipelines[index].run(iov, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byteswap::ByteSwapPass;
    use crate::reverse::ReversePass;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn round_trips_with_power_of_two_pipeline_count() {
        let enc = RandomEncoder::new(vec![
            PassManager::with_passes(vec![Box::new(ByteSwapPass)]),
            PassManager::with_passes(vec![Box::new(ReversePass)]),
        ]);
        let dec = RandomDecoder::new(vec![
            PassManager::with_passes(vec![Box::new(ByteSwapPass)]),
            PassManager::with_passes(vec![Box::new(ReversePass)]),
        ]);
        for seed in 0..16u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut iov = IoVec::from_slice(b"01234567abcdefgh");
            enc.run(&mut iov, &mut rng).unwrap();
            dec.run(&mut iov, &mut rng).unwrap();
            assert_eq!(iov.concat().as_ref(), b"01234567abcdefgh");
        }
    }
}
