//! Owned handle over a libbzip2 `bz_stream`.
//!
//! The engine is driven one call at a time: each [`Engine::step`] borrows an
//! input and an output slice, lets libbzip2 consume and produce as much as it
//! wants, and reports how far it got. Raw pointers into the slices never outlive
//! the call.

use std::mem;
use std::os::raw::{c_char, c_int, c_uint};
use std::ptr;

use bytesize::ByteSize;
use bzip2_sys::{
    bz_stream, BZ2_bzCompress, BZ2_bzCompressEnd, BZ2_bzCompressInit, BZ2_bzDecompress,
    BZ2_bzDecompressEnd, BZ2_bzDecompressInit, BZ_FINISH, BZ_FINISH_OK, BZ_FLUSH, BZ_FLUSH_OK,
    BZ_OK, BZ_RUN, BZ_RUN_OK, BZ_STREAM_END,
};
use tracing::{debug, trace};

use crate::config::Config;
use crate::errors::{CodecError, CodecErrorKind, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Compress,
    Decompress,
}

/// Compression actions. Ignored by a decompressing engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Consume input, emit output as blocks fill up.
    Run,
    /// Emit everything buffered so far without ending the stream.
    Flush,
    /// Emit the last block and the end-of-stream marker.
    Finish,
}

impl Action {
    fn raw(self) -> c_int {
        match self {
            Action::Run => BZ_RUN,
            Action::Flush => BZ_FLUSH,
            Action::Finish => BZ_FINISH,
        }
    }

    /// Whether `status` means this action has nothing left to emit.
    ///
    /// A flush is complete when the engine drops back into running mode. A
    /// `Run` step is never complete on its own; it ends when the input does.
    pub fn is_complete(self, status: StepStatus) -> bool {
        match self {
            Action::Run => false,
            Action::Flush => status == StepStatus::RunOk,
            Action::Finish => status == StepStatus::StreamEnd,
        }
    }
}

/// Non-error outcome of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Decompression made progress; the stream has not ended.
    Ok,
    /// A `Run` step finished, or a `Flush` completed.
    RunOk,
    /// A `Flush` is still emitting buffered output.
    FlushOk,
    /// A `Finish` is still emitting output.
    FinishOk,
    /// The logical end of the stream was reached.
    StreamEnd,
}

impl StepStatus {
    fn from_code(code: c_int) -> Result<Self, CodecError> {
        match code {
            BZ_OK => Ok(StepStatus::Ok),
            BZ_RUN_OK => Ok(StepStatus::RunOk),
            BZ_FLUSH_OK => Ok(StepStatus::FlushOk),
            BZ_FINISH_OK => Ok(StepStatus::FinishOk),
            BZ_STREAM_END => Ok(StepStatus::StreamEnd),
            code => Err(CodecError::from_code(code)),
        }
    }
}

/// What a single step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub status: StepStatus,
    /// Bytes taken from the front of the input slice.
    pub consumed: usize,
    /// Bytes written to the front of the output slice.
    pub produced: usize,
    /// Output space the call was given: the slice length, clamped to what one
    /// engine call can address.
    pub offered: usize,
}

impl Progress {
    /// Nothing was consumed and nothing was produced.
    pub fn is_stalled(&self) -> bool {
        self.consumed == 0 && self.produced == 0
    }

    /// The call used all the output space it was given, so the engine may be
    /// holding more.
    pub fn output_full(&self) -> bool {
        self.offered > 0 && self.produced == self.offered
    }
}

/// An engine error, with what the failing call still consumed and produced.
///
/// libbzip2 may write output before it detects a problem, e.g. a whole block
/// is decoded before its checksum is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepError {
    pub error: CodecError,
    pub consumed: usize,
    pub produced: usize,
}

impl From<CodecError> for StepError {
    fn from(error: CodecError) -> Self {
        Self {
            error,
            consumed: 0,
            produced: 0,
        }
    }
}

impl From<StepError> for CodecError {
    fn from(e: StepError) -> Self {
        e.error
    }
}

impl From<StepError> for Error {
    fn from(e: StepError) -> Self {
        Error::Codec(e.error)
    }
}

pub struct Engine {
    /// Boxed because libbzip2 keeps a pointer back to the `bz_stream` and
    /// rejects calls made through a moved one.
    raw: Option<Box<bz_stream>>,
    direction: Direction,
}

// The stream state is owned exclusively by this handle and libbzip2 keeps no
// thread-local data, so moving it across threads is fine. It is not `Sync`.
unsafe impl Send for Engine {}

fn new_stream() -> Box<bz_stream> {
    // all-zero is the documented initial state: null pointers, no custom allocator
    unsafe { Box::new(mem::zeroed()) }
}

fn clamp(len: usize) -> c_uint {
    c_uint::try_from(len).unwrap_or(c_uint::MAX)
}

impl Engine {
    /// Initializes a compressing engine.
    ///
    /// # Errors
    ///
    /// Returns the engine's status when it rejects the parameters or fails to allocate.
    pub fn compressor(config: &Config) -> Result<Self, CodecError> {
        let mut raw = new_stream();
        let code = unsafe {
            BZ2_bzCompressInit(
                &mut *raw,
                c_int::from(config.block_size_factor),
                c_int::from(config.verbosity),
                c_int::from(config.work_factor),
            )
        };
        if code != BZ_OK {
            let err = CodecError::from_code(code);
            debug!(%err, block_size_factor = config.block_size_factor, "bzip2 compressor init failed");
            return Err(err);
        }
        debug!(
            block_size = %ByteSize(config.block_size() as u64),
            work_factor = config.work_factor,
            "bzip2 compressor initialized"
        );
        Ok(Self {
            raw: Some(raw),
            direction: Direction::Compress,
        })
    }

    /// Initializes a decompressing engine.
    ///
    /// # Errors
    ///
    /// Returns the engine's status when it rejects the parameters or fails to allocate.
    pub fn decompressor(config: &Config) -> Result<Self, CodecError> {
        let mut raw = new_stream();
        let code = unsafe {
            BZ2_bzDecompressInit(
                &mut *raw,
                c_int::from(config.verbosity),
                c_int::from(config.small_memory),
            )
        };
        if code != BZ_OK {
            let err = CodecError::from_code(code);
            debug!(%err, "bzip2 decompressor init failed");
            return Err(err);
        }
        debug!(small_memory = config.small_memory, "bzip2 decompressor initialized");
        Ok(Self {
            raw: Some(raw),
            direction: Direction::Decompress,
        })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Runs one engine call over `input` and `output`.
    ///
    /// Neither slice is necessarily used up: callers check
    /// [`Progress::consumed`] and [`Progress::produced`] and call again.
    /// An empty `input` means "no input available".
    ///
    /// # Errors
    ///
    /// Negative engine statuses, mapped by [`CodecError::from_code`], together
    /// with the bytes the call moved before failing.
    pub fn step(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        action: Action,
    ) -> Result<Progress, StepError> {
        let direction = self.direction;
        let raw = self
            .raw
            .as_deref_mut()
            .ok_or_else(|| CodecError::synthetic(CodecErrorKind::Sequence))?;

        let avail_in = clamp(input.len());
        let avail_out = clamp(output.len());
        // libbzip2 never writes through next_in
        raw.next_in = input.as_ptr() as *mut c_char;
        raw.avail_in = avail_in;
        raw.next_out = output.as_mut_ptr() as *mut c_char;
        raw.avail_out = avail_out;

        let code = unsafe {
            match direction {
                Direction::Compress => BZ2_bzCompress(&mut *raw, action.raw()),
                Direction::Decompress => BZ2_bzDecompress(&mut *raw),
            }
        };

        let consumed = (avail_in - raw.avail_in) as usize;
        let produced = (avail_out - raw.avail_out) as usize;
        raw.next_in = ptr::null_mut();
        raw.avail_in = 0;
        raw.next_out = ptr::null_mut();
        raw.avail_out = 0;

        match StepStatus::from_code(code) {
            Ok(status) => Ok(Progress {
                status,
                consumed,
                produced,
                offered: avail_out as usize,
            }),
            Err(error) => Err(StepError {
                error,
                consumed,
                produced,
            }),
        }
    }

    /// Total bytes consumed over the engine's lifetime.
    pub fn total_in(&self) -> u64 {
        self.raw
            .as_deref()
            .map_or(0, |raw| join(raw.total_in_hi32, raw.total_in_lo32))
    }

    /// Total bytes produced over the engine's lifetime.
    pub fn total_out(&self) -> u64 {
        self.raw
            .as_deref()
            .map_or(0, |raw| join(raw.total_out_hi32, raw.total_out_lo32))
    }

    /// Releases the engine state. Consuming `self` makes a second call impossible.
    ///
    /// # Errors
    ///
    /// The status libbzip2 returned from its teardown call, if not `BZ_OK`.
    pub fn end(mut self) -> Result<(), CodecError> {
        match self.release() {
            BZ_OK => Ok(()),
            code => Err(CodecError::from_code(code)),
        }
    }

    fn release(&mut self) -> c_int {
        let Some(mut raw) = self.raw.take() else {
            return BZ_OK;
        };
        let code = unsafe {
            match self.direction {
                Direction::Compress => BZ2_bzCompressEnd(&mut *raw),
                Direction::Decompress => BZ2_bzDecompressEnd(&mut *raw),
            }
        };
        trace!(direction = ?self.direction, code, "bzip2 engine ended");
        code
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.raw.is_some() {
            debug!(direction = ?self.direction, "bzip2 engine dropped before end");
            let _ = self.release();
        }
    }
}

fn join(hi: c_uint, lo: c_uint) -> u64 {
    (u64::from(hi) << 32) | u64::from(lo)
}
