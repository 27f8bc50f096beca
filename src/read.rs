//! Read-based bzip2 decompressor.

use std::io;
use std::io::{ErrorKind, Read};

use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::engine::{Action, Engine, Progress, StepStatus};
use crate::errors::*;

/// What the next [`Read::read`] does before stepping the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    /// Pull from the source if the engine has used up its input.
    Refill,
    /// The last step filled the caller's buffer; the engine may still hold
    /// output, so step once more before pulling new input.
    Drain,
}

impl Next {
    fn after(progress: &Progress) -> Next {
        if progress.output_full() {
            Next::Drain
        } else {
            Next::Refill
        }
    }
}

/// The engine had input and still moved nothing: stepping again would spin.
///
/// A drain step with no input may legitimately do nothing.
fn is_stuck(had_input: bool, progress: &Progress) -> bool {
    had_input && progress.is_stalled()
}

enum State {
    Open,
    /// Natural end of the compressed stream, or closed by the caller.
    Finished,
    Failed(Sticky),
}

/// Decompresses a bzip2 stream pulled from `reader`.
pub struct Bz2Decoder<R>
where
    R: Read,
{
    reader: R,
    engine: Option<Engine>,
    /// Compressed input read from `reader`; `buffer[pos..filled]` is still unread by the engine.
    buffer: Vec<u8>,
    pos: usize,
    filled: usize,
    next: Next,
    state: State,
    total_in: u64,
    total_out: u64,
}

impl<R> Bz2Decoder<R>
where
    R: Read,
{
    /// Creates a decoder with the default [`Config`].
    ///
    /// # Errors
    ///
    /// This returns [`Error::Codec`] if libbzip2 fails to initialize.
    pub fn new(reader: R) -> Result<Self> {
        Self::with_config(reader, &Config::default())
    }

    /// Only `verbosity`, `small_memory` and `buffer_capacity` apply to decompression.
    ///
    /// # Errors
    ///
    /// This returns [`Error::InvalidConfig`] for settings [`Config::validate`]
    /// rejects and [`Error::Codec`] if libbzip2 rejects the parameters.
    pub fn with_config(reader: R, config: &Config) -> Result<Self> {
        config.validate()?;
        let engine = Engine::decompressor(config)?;
        Ok(Self {
            reader,
            engine: Some(engine),
            buffer: vec![0; config.buffer_capacity],
            pos: 0,
            filled: 0,
            next: Next::Refill,
            state: State::Open,
            total_in: 0,
            total_out: 0,
        })
    }

    fn available_in(&self) -> usize {
        self.filled - self.pos
    }

    fn end_engine(&mut self) {
        if let Some(engine) = self.engine.take() {
            if let Err(e) = engine.end() {
                debug!(%e, "bzip2 decompressor teardown");
            }
        }
    }

    fn fail(&mut self, err: Error) -> Error {
        debug!(%err, "bzip2 decoder failed");
        self.end_engine();
        self.state = State::Failed(Sticky::record(&err));
        err
    }

    /// Reads the next chunk of compressed input into the scratch buffer.
    /// Returns `false` when the source is exhausted.
    fn refill(&mut self) -> Result<bool> {
        let n = loop {
            match self.reader.read(&mut self.buffer) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        trace!(bytes = n, "refilled compressed input");
        self.pos = 0;
        self.filled = n;
        Ok(n > 0)
    }

    fn decompress(&mut self, buf: &mut [u8]) -> Result<usize> {
        match &self.state {
            State::Open => {}
            State::Finished => return Ok(0),
            State::Failed(sticky) => return Err(sticky.replay()),
        }
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if self.next == Next::Refill && self.available_in() == 0 {
                match self.refill() {
                    Ok(true) => {}
                    Ok(false) if self.total_in == 0 => {
                        // nothing was ever compressed into this source
                        self.end_engine();
                        self.state = State::Finished;
                        return Ok(0);
                    }
                    Ok(false) => {
                        let err = CodecError::synthetic(CodecErrorKind::UnexpectedEnd);
                        return Err(self.fail(err.into()));
                    }
                    Err(e) => return Err(self.fail(e)),
                }
            } else {
                self.next = Next::Refill;
            }

            let had_input = self.available_in() > 0;
            let Some(engine) = self.engine.as_mut() else {
                return Ok(0);
            };
            let step = engine.step(&self.buffer[self.pos..self.filled], buf, Action::Run);
            let progress = match step {
                Ok(progress) => progress,
                Err(e) => {
                    self.pos += e.consumed;
                    self.total_in += e.consumed as u64;
                    self.total_out += e.produced as u64;
                    let err = self.fail(e.into());
                    // hand out what was decoded first; the error is replayed next call
                    if e.produced > 0 {
                        return Ok(e.produced);
                    }
                    return Err(err);
                }
            };
            self.pos += progress.consumed;
            self.total_in += progress.consumed as u64;
            self.total_out += progress.produced as u64;

            match progress.status {
                StepStatus::StreamEnd => {
                    debug!(
                        total_in = self.total_in,
                        total_out = self.total_out,
                        trailing = self.available_in(),
                        "bzip2 stream ended"
                    );
                    self.end_engine();
                    self.state = State::Finished;
                    return Ok(progress.produced);
                }
                StepStatus::Ok => {}
                status => {
                    // compression statuses never come out of a decompressing engine
                    warn!(?status, "unexpected decompression status");
                    return Err(self.fail(Error::stalled()));
                }
            }

            if progress.produced > 0 {
                self.next = Next::after(&progress);
                return Ok(progress.produced);
            }
            if is_stuck(had_input, &progress) {
                warn!(
                    available_in = self.available_in(),
                    "bzip2 decompressor made no progress"
                );
                return Err(self.fail(Error::stalled()));
            }
        }
    }

    /// Ends the engine. The source is left open.
    ///
    /// Later reads return `Ok(0)`. If the decoder already failed, the recorded
    /// error is returned instead, every time.
    ///
    /// # Errors
    ///
    /// The recorded terminal error, if any.
    pub fn close(&mut self) -> Result<()> {
        match &self.state {
            State::Open => {
                self.end_engine();
                self.state = State::Finished;
                Ok(())
            }
            State::Finished => Ok(()),
            State::Failed(sticky) => Err(sticky.replay()),
        }
    }

    /// Whether the end of the compressed stream was reached or the decoder was closed.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Finished)
    }

    /// Compressed bytes consumed by the engine so far.
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// Decompressed bytes returned so far.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Reading from the inner reader directly desynchronizes the decoder.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Returns the source. Compressed bytes already buffered are lost.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R> Read for Bz2Decoder<R>
where
    R: Read,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.decompress(buf).map_err(Error::into_io_error)
    }
}
