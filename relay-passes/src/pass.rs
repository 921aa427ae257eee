//! The `Pass` trait and its linear composition, the `PassManager`.
//!
//! Mirrors `original_source/core/pass_manager.go`'s `Pass`/`PassManager`/
//! `PackUnpackPassManagerBuilder` trio, generalized from `*net.Buffers` to
//! [`IoVec`] and from a bare `error` return to `relay_core::Result`.

use rand::RngCore;
use relay_core::error::Result;

use crate::iovec::IoVec;

/// An invertible byte transform. Every concrete pass implements this once per
/// direction (e.g. `ByteSwap` for both, `OBFSEncoder`/`OBFSDecoder` as a pair).
/// Passes are pure with respect to their own state: any randomness they need
/// is drawn from the injected `rng`, never a hidden global, so pass pipelines
/// are reproducible under test (spec.md §8: "seeded randomness MUST be injected").
pub trait Pass: Send + Sync {
    fn run(&self, iov: &mut IoVec, rng: &mut dyn RngCore) -> Result<()>;
}

/// An ordered list of passes, run left-to-right. Execution stops at the first
/// error and surfaces it to the caller.
#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
}

impl PassManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_passes(passes: Vec<Box<dyn Pass>>) -> Self {
        Self { passes }
    }

    pub fn add_pass(&mut self, p: Box<dyn Pass>) -> &mut Self {
        self.passes.push(p);
        self
    }

    pub fn run(&self, iov: &mut IoVec, rng: &mut dyn RngCore) -> Result<()> {
        for p in &self.passes {
            p.run(iov, rng)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

/// Accumulates `(forward, inverse)` pass pairs and builds matching pack/unpack
/// chains: `build_pack` runs forward passes in insertion order, `build_unpack`
/// runs inverses in REVERSE insertion order, so `unpack(pack(x)) == x`.
#[derive(Default)]
pub struct PassManagerBuilder {
    pack_passes: Vec<Box<dyn Pass>>,
    unpack_passes: Vec<Box<dyn Pass>>,
}

impl PassManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_paired_passes(&mut self, pack: Box<dyn Pass>, unpack: Box<dyn Pass>) -> &mut Self {
        self.pack_passes.push(pack);
        self.unpack_passes.push(unpack);
        self
    }

    pub fn build_pack(self) -> PassManager {
        PassManager::with_passes(self.pack_passes)
    }

    /// Consumes the builder's pack passes too, since `build_unpack` is
    /// normally called after `build_pack` has already taken ownership of the
    /// forward chain; call [`PassManagerBuilder::build_pack_and_unpack`] if
    /// both are needed from the same builder.
    pub fn build_unpack(mut self) -> PassManager {
        self.unpack_passes.reverse();
        PassManager::with_passes(self.unpack_passes)
    }

    /// Builds both chains at once, since `build_pack`/`build_unpack` each
    /// consume `self`.
    pub fn build_pack_and_unpack(mut self) -> (PassManager, PassManager) {
        let pack = PassManager::with_passes(std::mem::take(&mut self.pack_passes));
        self.unpack_passes.reverse();
        let unpack = PassManager::with_passes(self.unpack_passes);
        (pack, unpack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::error::Error;

    struct AppendByte(u8);
    struct DropLastByte;

    impl Pass for AppendByte {
        fn run(&self, iov: &mut IoVec, _rng: &mut dyn RngCore) -> Result<()> {
            let mut buf = iov.consume().to_vec();
            buf.push(self.0);
            *iov = IoVec::from(buf);
            Ok(())
        }
    }

    impl Pass for DropLastByte {
        fn run(&self, iov: &mut IoVec, _rng: &mut dyn RngCore) -> Result<()> {
            if iov.is_empty() {
                return Err(Error::protocol("empty"));
            }
            iov.drop_tail(1)
        }
    }

    #[test]
    fn builder_reverses_unpack_order() {
        let mut b = PassManagerBuilder::new();
        b.add_paired_passes(Box::new(AppendByte(1)), Box::new(DropLastByte));
        b.add_paired_passes(Box::new(AppendByte(2)), Box::new(DropLastByte));
        b.add_paired_passes(Box::new(AppendByte(3)), Box::new(DropLastByte));
        let (pack, unpack) = b.build_pack_and_unpack();

        let mut rng = rand::thread_rng();
        let mut iov = IoVec::from_slice(b"x");
        pack.run(&mut iov, &mut rng).unwrap();
        assert_eq!(iov.concat().as_ref(), b"x\x01\x02\x03");
        unpack.run(&mut iov, &mut rng).unwrap();
        assert_eq!(iov.concat().as_ref(), b"x");
    }
}
