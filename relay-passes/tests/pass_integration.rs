//! Exercises a full heterogeneous pass chain through `PassManagerBuilder`,
//! checking that the builder's reverse-ordering on unpack holds across
//! passes with real random draws and a real compressor in the middle.

use rand::{rngs::StdRng, SeedableRng};

use relay_passes::pass::PassManagerBuilder;
use relay_passes::{
    ByteSwapPass, IoVec, Lz4Compressor, Lz4Decompressor, OBFSDecoder, OBFSEncoder, ReversePass,
    RotateLeftDecoder, RotateLeftEncoder,
};

#[test]
fn byteswap_obfs_lz4_reverse_rotate_round_trips() {
    let mut builder = PassManagerBuilder::new();
    builder.add_paired_passes(Box::new(ByteSwapPass), Box::new(ByteSwapPass));
    builder.add_paired_passes(Box::new(OBFSEncoder), Box::new(OBFSDecoder));
    builder.add_paired_passes(Box::new(Lz4Compressor), Box::new(Lz4Decompressor));
    builder.add_paired_passes(Box::new(ReversePass), Box::new(ReversePass));
    builder.add_paired_passes(Box::new(RotateLeftEncoder), Box::new(RotateLeftDecoder));
    let (pack, unpack) = builder.build_pack_and_unpack();

    let plaintext = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut rng = StdRng::seed_from_u64(42);
    let mut iov = IoVec::from_slice(plaintext);

    pack.run(&mut iov, &mut rng).unwrap();
    assert_ne!(iov.concat().as_ref(), plaintext);

    unpack.run(&mut iov, &mut rng).unwrap();
    assert_eq!(iov.concat().as_ref(), plaintext);
}
