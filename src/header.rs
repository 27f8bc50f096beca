//! Inspection of the fixed bytes at the start of a bzip2 stream.

use std::io::{Cursor, Read};

use byteorder::{ReadBytesExt, BE};

use crate::errors::*;
use crate::MAGIC_NUMBER;

/// Magic that opens every compressed block (BCD of pi).
pub const BLOCK_MAGIC: u64 = 0x3141_5926_5359;
/// Magic of the end-of-stream trailer (BCD of sqrt(pi)).
pub const END_OF_STREAM_MAGIC: u64 = 0x1772_4538_5090;
/// `BZh`, the block size digit and the first 48-bit block magic.
pub const HEADER_LEN: usize = MAGIC_NUMBER.len() + 1 + 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// The stream carries at least one block of data.
    Data,
    /// The stream is empty: the trailer follows the header directly.
    EndOfStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    /// `1..=9`, the block size in units of 100 000 bytes the stream was written with.
    pub block_size_factor: u8,
    pub first_block: BlockKind,
}

fn codec(kind: CodecErrorKind) -> Error {
    CodecError::synthetic(kind).into()
}

impl StreamHeader {
    /// Parses the first [`HEADER_LEN`] bytes of `bytes`.
    ///
    /// # Errors
    ///
    /// [`CodecErrorKind::BadMagic`] for a wrong signature or block size digit,
    /// [`CodecErrorKind::UnexpectedEnd`] if `bytes` is too short, and
    /// [`CodecErrorKind::DataCorrupt`] for an unknown block magic.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let prefix = bytes.len().min(MAGIC_NUMBER.len());
        if bytes[..prefix] != MAGIC_NUMBER[..prefix] {
            return Err(codec(CodecErrorKind::BadMagic));
        }
        if bytes.len() < HEADER_LEN {
            return Err(codec(CodecErrorKind::UnexpectedEnd));
        }

        let mut cursor = Cursor::new(bytes);
        let mut magic = [0_u8; MAGIC_NUMBER.len()];
        cursor.read_exact(&mut magic)?;
        let digit = cursor.read_u8()?;
        if !(b'1'..=b'9').contains(&digit) {
            return Err(codec(CodecErrorKind::BadMagic));
        }
        let first_block = match cursor.read_u48::<BE>()? {
            BLOCK_MAGIC => BlockKind::Data,
            END_OF_STREAM_MAGIC => BlockKind::EndOfStream,
            _ => return Err(codec(CodecErrorKind::DataCorrupt)),
        };
        Ok(Self {
            block_size_factor: digit - b'0',
            first_block,
        })
    }

    pub fn block_size(&self) -> usize {
        usize::from(self.block_size_factor) * 100_000
    }
}
