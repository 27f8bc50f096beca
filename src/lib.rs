//! Streaming bzip2 compression on top of libbzip2.
//!
//! [`write::Bz2Encoder`] compresses whatever is written to it into an inner
//! writer, and [`read::Bz2Decoder`] decompresses a stream pulled from an inner
//! reader. Both drive the libbzip2 engine through fixed-size scratch buffers.

pub mod config;
pub mod engine;
pub mod errors;
pub mod header;
pub mod read;
pub mod stream;
pub mod write;

pub use config::Config;
pub use read::Bz2Decoder as Reader;
pub use write::Bz2Encoder as Writer;

/// The signature of a bzip2 stream, followed by the block size digit.
pub const MAGIC_NUMBER: &[u8; 3] = b"BZh";
