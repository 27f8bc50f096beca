//! Stream tuning.

use crate::errors::*;

/// Default scratch buffer size of a stream, 32 KiB.
pub const DEFAULT_BUFFER_CAPACITY: usize = 32 * 1024;

const MAX_VERBOSITY: u8 = 4;
const MAX_WORK_FACTOR: u8 = 250;

/// Parameters for the engine and the stream around it.
///
/// The block size factor is left to libbzip2, which rejects it at init time
/// as [`CodecErrorKind::BadParam`](crate::errors::CodecErrorKind::BadParam).
/// Verbosity and work factor are checked by [`Config::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Block size in units of 100 000 bytes, `1..=9`. Compression only.
    pub block_size_factor: u8,
    /// Engine diagnostics written to stderr, `0..=4`.
    pub verbosity: u8,
    /// Effort spent on repetitive input before falling back to the slower
    /// sorting algorithm, `0..=250`. Zero selects the library default. Compression only.
    pub work_factor: u8,
    /// Use the slower, low-memory decompression algorithm. Decompression only.
    pub small_memory: bool,
    /// Size of the stream's scratch buffer.
    pub buffer_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_size_factor: 9,
            verbosity: 0,
            work_factor: 30,
            small_memory: false,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Smallest blocks: least memory, weakest compression.
    pub fn fast() -> Self {
        Self::default().block_size_factor(1)
    }

    pub fn best() -> Self {
        Self::default().block_size_factor(9)
    }

    pub fn block_size_factor(mut self, factor: u8) -> Self {
        self.block_size_factor = factor;
        self
    }

    pub fn verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn work_factor(mut self, work_factor: u8) -> Self {
        self.work_factor = work_factor;
        self
    }

    pub fn small_memory(mut self, small: bool) -> Self {
        self.small_memory = small;
        self
    }

    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Checks the settings the engine does not check itself.
    ///
    /// The compressor's init accepts any verbosity, so the range is enforced here
    /// for both directions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a zero `buffer_capacity`, a
    /// `verbosity` above 4 or a `work_factor` above 250.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(Error::InvalidConfig {
                field: "buffer capacity",
                value: self.buffer_capacity,
            });
        }
        if self.verbosity > MAX_VERBOSITY {
            return Err(Error::InvalidConfig {
                field: "verbosity",
                value: usize::from(self.verbosity),
            });
        }
        if self.work_factor > MAX_WORK_FACTOR {
            return Err(Error::InvalidConfig {
                field: "work factor",
                value: usize::from(self.work_factor),
            });
        }
        Ok(())
    }

    /// Block size in bytes for the configured factor.
    pub fn block_size(&self) -> usize {
        usize::from(self.block_size_factor) * 100_000
    }
}
