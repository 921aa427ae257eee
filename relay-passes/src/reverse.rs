//! `Reverse` reverses the entire byte sequence. Self-inverse.

use rand::RngCore;
use relay_core::error::Result;

use crate::iovec::IoVec;
use crate::pass::Pass;

#[derive(Debug, Default, Clone, Copy)]
pub struct ReversePass;

impl Pass for ReversePass {
    fn run(&self, iov: &mut IoVec, _rng: &mut dyn RngCore) -> Result<()> {
        let mut buf = iov.consume().to_vec();
        buf.reverse();
        iov.take(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverses_and_is_self_inverse() {
        let mut rng = rand::thread_rng();
        let mut iov = IoVec::from_slice(b"abcdef");
        ReversePass.run(&mut iov, &mut rng).unwrap();
        assert_eq!(iov.concat().as_ref(), b"fedcba");
        ReversePass.run(&mut iov, &mut rng).unwrap();
        assert_eq!(iov.concat().as_ref(), b"abcdef");
    }
}
