#![forbid(unsafe_code)]

//! Non-contiguous byte buffers, invertible byte-transform passes, and the
//! pass manager that chains them into pack/unpack pipelines.

pub mod byteswap;
pub mod compress;
pub mod iovec;
pub mod obfs;
pub mod pass;
pub mod random_encoder;
pub mod rc4;
pub mod reverse;
pub mod rotate;

pub use byteswap::{byte_swap, ByteSwapPass};
pub use compress::{
    GzipCompressor, GzipDecompressor, Lz4Compressor, Lz4Decompressor, RandCompressor,
    RandDecompressor, SnappyCompressor, SnappyDecompressor,
};
pub use iovec::IoVec;
pub use obfs::{OBFSDecoder, OBFSEncoder, TailPaddingDecoder, TailPaddingEncoder};
pub use pass::{Pass, PassManager, PassManagerBuilder};
pub use random_encoder::{RandomDecoder, RandomEncoder};
pub use rc4::{Rc4Decoder, Rc4Encoder};
pub use reverse::ReversePass;
pub use rotate::{RotateLeftDecoder, RotateLeftEncoder};
