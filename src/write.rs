//! Write-based bzip2 compressor.

use std::io;
use std::io::Write;

use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::engine::{Action, Engine, Progress};
use crate::errors::*;

enum State {
    Open,
    Closed,
    Failed(Sticky),
}

/// The step moved nothing and did not complete its action: stepping again would spin.
fn is_stuck(action: Action, progress: &Progress) -> bool {
    !action.is_complete(progress.status) && progress.is_stalled()
}

/// Compresses everything written to it into `writer`.
///
/// The compressed stream is only complete after [`Bz2Encoder::close`] (or
/// [`Bz2Encoder::finish`]). Dropping an encoder that was not closed releases the
/// engine but leaves `writer` holding a truncated stream.
pub struct Bz2Encoder<W>
where
    W: Write,
{
    writer: W,
    engine: Option<Engine>,
    /// Scratch buffer the engine writes into; drained to `writer` after every step.
    buffer: Vec<u8>,
    state: State,
    total_in: u64,
    total_out: u64,
}

impl<W> Bz2Encoder<W>
where
    W: Write,
{
    /// Creates an encoder with the default [`Config`].
    ///
    /// # Errors
    ///
    /// This returns [`Error::Codec`] if libbzip2 fails to initialize.
    pub fn new(writer: W) -> Result<Self> {
        Self::with_config(writer, &Config::default())
    }

    /// # Errors
    ///
    /// This returns [`Error::InvalidConfig`] for settings [`Config::validate`]
    /// rejects and [`Error::Codec`] if libbzip2 rejects the parameters.
    pub fn with_config(writer: W, config: &Config) -> Result<Self> {
        config.validate()?;
        let engine = Engine::compressor(config)?;
        Ok(Self {
            writer,
            engine: Some(engine),
            buffer: vec![0; config.buffer_capacity],
            state: State::Open,
            total_in: 0,
            total_out: 0,
        })
    }

    fn check_open(&self) -> Result<()> {
        match &self.state {
            State::Open => Ok(()),
            State::Closed => Err(Error::Closed),
            State::Failed(sticky) => Err(sticky.replay()),
        }
    }

    /// Runs one engine step into the scratch buffer and hands the output to `writer`.
    ///
    /// A step that neither consumes nor produces anything without completing its
    /// action would repeat forever, so it is reported as a sequence error.
    fn step(&mut self, input: &[u8], action: Action) -> Result<Progress> {
        let Some(engine) = self.engine.as_mut() else {
            return Err(Error::Closed);
        };
        let progress = engine.step(input, &mut self.buffer, action)?;
        if progress.produced > 0 {
            trace!(bytes = progress.produced, ?action, "draining compressed output");
            self.writer.write_all(&self.buffer[..progress.produced])?;
        }
        self.total_in += progress.consumed as u64;
        self.total_out += progress.produced as u64;
        if is_stuck(action, &progress) {
            warn!(?action, status = ?progress.status, "bzip2 compressor made no progress");
            return Err(Error::stalled());
        }
        Ok(progress)
    }

    /// Ends the engine and records `err` so every later call returns it.
    fn fail(&mut self, err: Error) -> Error {
        debug!(%err, "bzip2 encoder failed");
        if let Some(engine) = self.engine.take() {
            if let Err(e) = engine.end() {
                debug!(%e, "engine teardown after failure");
            }
        }
        self.state = State::Failed(Sticky::record(&err));
        err
    }

    fn compress(&mut self, data: &[u8]) -> Result<usize> {
        self.check_open()?;
        if data.is_empty() {
            return Ok(0);
        }
        let mut offset = 0;
        while offset < data.len() {
            match self.step(&data[offset..], Action::Run) {
                Ok(progress) => offset += progress.consumed,
                Err(e) => return Err(self.fail(e)),
            }
        }
        Ok(data.len())
    }

    fn flush_engine(&mut self) -> Result<()> {
        self.check_open()?;
        loop {
            match self.step(&[], Action::Flush) {
                Ok(progress) if Action::Flush.is_complete(progress.status) => break,
                Ok(_) => {}
                Err(e) => return Err(self.fail(e)),
            }
        }
        if let Err(e) = self.writer.flush() {
            return Err(self.fail(e.into()));
        }
        Ok(())
    }

    /// Writes the final block and the end-of-stream marker, then ends the engine.
    ///
    /// Once closed, `write`, `flush` and `close` fail with [`Error::Closed`]
    /// without touching the engine. After a failure they return the recorded error.
    ///
    /// # Errors
    ///
    /// Engine and sink errors. The engine is ended either way.
    pub fn close(&mut self) -> Result<()> {
        match &self.state {
            State::Open => {}
            State::Closed => return Err(Error::Closed),
            State::Failed(sticky) => return Err(sticky.replay()),
        }
        loop {
            match self.step(&[], Action::Finish) {
                Ok(progress) if Action::Finish.is_complete(progress.status) => break,
                Ok(_) => {}
                Err(e) => return Err(self.fail(e)),
            }
        }
        if let Some(engine) = self.engine.take() {
            if let Err(e) = engine.end() {
                return Err(self.fail(e.into()));
            }
        }
        if let Err(e) = self.writer.flush() {
            return Err(self.fail(e.into()));
        }
        debug!(
            total_in = self.total_in,
            total_out = self.total_out,
            "bzip2 stream finished"
        );
        self.state = State::Closed;
        Ok(())
    }

    /// Closes the stream and returns the underlying writer.
    ///
    /// # Errors
    ///
    /// See [`Bz2Encoder::close`].
    pub fn finish(mut self) -> Result<W> {
        self.close()?;
        Ok(self.writer)
    }

    /// Ends the engine without writing the end of the stream.
    ///
    /// The stream in `writer` stays truncated, so every later call, `close`
    /// and `finish` included, fails with [`Error::Closed`].
    pub fn abort(&mut self) {
        if let Some(engine) = self.engine.take() {
            let _ = engine.end();
        }
        if matches!(self.state, State::Open) {
            debug!(total_in = self.total_in, "bzip2 encoder aborted");
            self.state = State::Failed(Sticky::Closed);
        }
    }

    pub fn is_closed(&self) -> bool {
        !matches!(self.state, State::Open)
    }

    /// Uncompressed bytes accepted so far.
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// Compressed bytes handed to the writer so far.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Writing to the inner writer directly corrupts the compressed stream.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Returns the writer as is; an unclosed stream is left truncated.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W> Write for Bz2Encoder<W>
where
    W: Write,
{
    /// Accepts all of `buf` or fails; partial writes are never reported.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.compress(buf).map_err(Error::into_io_error)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_engine().map_err(Error::into_io_error)
    }
}
