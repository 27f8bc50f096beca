//! bzip2 compressor and decompressor
//! that do a direct stream-to-stream process

use std::io;
use std::io::{Read, Write};

use crate::config::Config;
use crate::errors::*;
use crate::read::Bz2Decoder;
use crate::write::Bz2Encoder;

/// Compress `reader` to `writer`.
///
/// Returns the number of uncompressed bytes read from `reader`.
pub fn compress<R, W>(reader: &mut R, writer: &mut W, config: &Config) -> Result<u64>
where
    R: Read,
    W: Write,
{
    let mut encoder = Bz2Encoder::with_config(writer, config)?;
    let copied = io::copy(reader, &mut encoder).map_err(unwrap_io)?;
    encoder.close()?;
    Ok(copied)
}

/// Decompress `reader` to `writer`.
///
/// Returns the number of decompressed bytes written to `writer`.
pub fn decompress<R, W>(reader: &mut R, writer: &mut W, config: &Config) -> Result<u64>
where
    R: Read,
    W: Write,
{
    let mut decoder = Bz2Decoder::with_config(reader, config)?;
    let copied = io::copy(&mut decoder, writer).map_err(unwrap_io)?;
    writer.flush()?;
    decoder.close()?;
    Ok(copied)
}

/// Compresses `input` into a new [`Vec`].
pub fn compress_to_vec(input: &[u8], config: &Config) -> Result<Vec<u8>> {
    let mut encoder = Bz2Encoder::with_config(Vec::new(), config)?;
    encoder.write_all(input).map_err(unwrap_io)?;
    encoder.finish()
}

/// Decompresses `input` into a new [`Vec`].
pub fn decompress_to_vec(input: &[u8], config: &Config) -> Result<Vec<u8>> {
    let mut decoder = Bz2Decoder::with_config(input, config)?;
    let mut output = Vec::new();
    decoder.read_to_end(&mut output).map_err(unwrap_io)?;
    Ok(output)
}

/// Takes a crate error back out of an [`io::Error`] produced by the stream traits.
fn unwrap_io(err: io::Error) -> Error {
    if Error::downcast_io(&err).is_none() {
        return Error::Io(err);
    }
    let kind = err.kind();
    match err.into_inner().map(|inner| inner.downcast::<Error>()) {
        Some(Ok(inner)) => *inner,
        Some(Err(other)) => Error::Io(io::Error::new(kind, other)),
        None => Error::Io(kind.into()),
    }
}
