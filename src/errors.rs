use std::fmt;
use std::io;

use bzip2_sys::{
    BZ_CONFIG_ERROR, BZ_DATA_ERROR, BZ_DATA_ERROR_MAGIC, BZ_MEM_ERROR, BZ_OUTBUFF_FULL,
    BZ_PARAM_ERROR, BZ_SEQUENCE_ERROR, BZ_UNEXPECTED_EOF,
};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Codec(#[from] CodecError),
    #[error("Stream closed")]
    Closed,
    #[error("Invalid {field}: {value}")]
    InvalidConfig { field: &'static str, value: usize },
}

impl Error {
    /// Converts into an [`io::Error`] for the `std::io` trait implementations.
    ///
    /// I/O errors pass through untouched; everything else is wrapped so it can be
    /// recovered with [`Error::downcast_io`].
    pub fn into_io_error(self) -> io::Error {
        let kind = match self {
            Error::Io(e) => return e,
            Error::Codec(e) => e.kind.io_kind(),
            Error::Closed => io::ErrorKind::BrokenPipe,
            Error::InvalidConfig { .. } => io::ErrorKind::InvalidInput,
        };
        io::Error::new(kind, self)
    }

    /// Recovers the crate error carried by an [`io::Error`] built by [`Error::into_io_error`].
    pub fn downcast_io(err: &io::Error) -> Option<&Error> {
        err.get_ref()?.downcast_ref::<Error>()
    }

    /// A step that neither consumed nor produced anything while reporting progress.
    pub(crate) fn stalled() -> Self {
        Error::Codec(CodecError::synthetic(CodecErrorKind::Sequence))
    }

    /// The engine error kind, if this error came from the engine.
    pub fn codec_kind(&self) -> Option<CodecErrorKind> {
        match self {
            Error::Codec(e) => Some(e.kind),
            _ => None,
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        e.into_io_error()
    }
}

/// Engine error kinds, one per negative libbzip2 status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecErrorKind {
    BadParam,
    Sequence,
    OutOfMemory,
    DataCorrupt,
    BadMagic,
    UnexpectedEnd,
    OutputFull,
    Config,
    Unknown,
}

impl CodecErrorKind {
    fn io_kind(self) -> io::ErrorKind {
        match self {
            CodecErrorKind::DataCorrupt | CodecErrorKind::BadMagic => io::ErrorKind::InvalidData,
            CodecErrorKind::UnexpectedEnd => io::ErrorKind::UnexpectedEof,
            CodecErrorKind::OutOfMemory => io::ErrorKind::OutOfMemory,
            CodecErrorKind::BadParam | CodecErrorKind::Config => io::ErrorKind::InvalidInput,
            CodecErrorKind::Sequence | CodecErrorKind::OutputFull | CodecErrorKind::Unknown => {
                io::ErrorKind::Other
            }
        }
    }
}

impl fmt::Display for CodecErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            CodecErrorKind::BadParam => "invalid engine parameter",
            CodecErrorKind::Sequence => "engine called out of sequence",
            CodecErrorKind::OutOfMemory => "engine ran out of memory",
            CodecErrorKind::DataCorrupt => "integrity problem detected in compressed data",
            CodecErrorKind::BadMagic => "compressed stream does not begin with the bzip2 magic",
            CodecErrorKind::UnexpectedEnd => "compressed stream ended unexpectedly",
            CodecErrorKind::OutputFull => "output buffer full",
            CodecErrorKind::Config => "libbzip2 was built with an incompatible configuration",
            CodecErrorKind::Unknown => "unknown engine error",
        };
        f.write_str(msg)
    }
}

/// A failure reported by libbzip2, with the native status code.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{kind} (status {code})")]
pub struct CodecError {
    pub kind: CodecErrorKind,
    pub code: i32,
}

impl CodecError {
    pub fn from_code(code: i32) -> Self {
        let kind = match code {
            BZ_SEQUENCE_ERROR => CodecErrorKind::Sequence,
            BZ_PARAM_ERROR => CodecErrorKind::BadParam,
            BZ_MEM_ERROR => CodecErrorKind::OutOfMemory,
            BZ_DATA_ERROR => CodecErrorKind::DataCorrupt,
            BZ_DATA_ERROR_MAGIC => CodecErrorKind::BadMagic,
            BZ_UNEXPECTED_EOF => CodecErrorKind::UnexpectedEnd,
            BZ_OUTBUFF_FULL => CodecErrorKind::OutputFull,
            BZ_CONFIG_ERROR => CodecErrorKind::Config,
            _ => CodecErrorKind::Unknown,
        };
        Self { kind, code }
    }

    /// An error raised by this crate rather than the engine, tagged with the
    /// status libbzip2 uses for the same condition.
    pub(crate) fn synthetic(kind: CodecErrorKind) -> Self {
        let code = match kind {
            CodecErrorKind::Sequence => BZ_SEQUENCE_ERROR,
            CodecErrorKind::BadParam => BZ_PARAM_ERROR,
            CodecErrorKind::OutOfMemory => BZ_MEM_ERROR,
            CodecErrorKind::DataCorrupt => BZ_DATA_ERROR,
            CodecErrorKind::BadMagic => BZ_DATA_ERROR_MAGIC,
            CodecErrorKind::UnexpectedEnd => BZ_UNEXPECTED_EOF,
            CodecErrorKind::OutputFull => BZ_OUTBUFF_FULL,
            CodecErrorKind::Config => BZ_CONFIG_ERROR,
            CodecErrorKind::Unknown => i32::MIN,
        };
        Self { kind, code }
    }
}

/// Terminal failure recorded by a stream and handed back on every later call.
#[derive(Debug, Clone)]
pub(crate) enum Sticky {
    Codec(CodecError),
    Io { kind: io::ErrorKind, message: String },
    Closed,
}

impl Sticky {
    pub(crate) fn record(err: &Error) -> Self {
        match err {
            Error::Io(e) => Sticky::Io {
                kind: e.kind(),
                message: e.to_string(),
            },
            Error::Codec(e) => Sticky::Codec(*e),
            Error::Closed | Error::InvalidConfig { .. } => Sticky::Closed,
        }
    }

    pub(crate) fn replay(&self) -> Error {
        match self {
            Sticky::Codec(e) => Error::Codec(*e),
            Sticky::Io { kind, message } => Error::Io(io::Error::new(*kind, message.clone())),
            Sticky::Closed => Error::Closed,
        }
    }
}
