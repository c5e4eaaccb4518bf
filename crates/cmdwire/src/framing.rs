//! Line framing over a duplex byte stream.
//!
//! [`FramedStream`] owns the transport and keeps one read buffer and one write
//! buffer in front of it. Line reads and raw reads share the read buffer, so a
//! payload decoder picks up exactly where the command line ended. Writes are
//! staged until [`FramedStream::flush`] pushes them onto the transport.

use std::io::{self, BufRead, BufReader, Read, Write};

use thiserror::Error;

use crate::command::{CommandName, CommandNameError};

/// Size bounds applied by [`FramedStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    /// Longest command line, excluding the newline.
    pub max_command_bytes: usize,
    /// Longest text line, excluding the newline.
    pub max_line_bytes: usize,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_command_bytes: cmdwire_config::DEFAULT_MAX_COMMAND_BYTES,
            max_line_bytes: cmdwire_config::DEFAULT_MAX_LINE_BYTES,
        }
    }
}

impl FrameLimits {
    /// Limits taken from the shared configuration.
    #[must_use]
    pub const fn from_config(config: &cmdwire_config::Config) -> Self {
        Self {
            max_command_bytes: config.max_command_bytes,
            max_line_bytes: config.max_line_bytes,
        }
    }
}

/// Errors raised while reading frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The transport failed.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    /// The peer closed the stream before a newline arrived.
    #[error("peer closed the stream after {partial} bytes of an unterminated line")]
    EndOfStream {
        /// Bytes received for the unfinished line; zero for a clean close.
        partial: usize,
    },
    /// The line grew past the configured bound before a newline arrived.
    #[error("line exceeds the {limit} byte limit")]
    LineTooLong {
        /// Configured bound.
        limit: usize,
    },
    /// The line was not valid UTF-8.
    #[error("line is not valid UTF-8")]
    InvalidUtf8,
    /// The command line did not hold a valid command name.
    #[error("invalid command line: {0}")]
    InvalidCommand(#[from] CommandNameError),
}

impl FrameError {
    /// Returns `true` when the peer closed the stream between lines.
    #[must_use]
    pub const fn is_clean_close(&self) -> bool {
        matches!(self, Self::EndOfStream { partial: 0 })
    }
}

/// Buffered, line-aware wrapper around a duplex stream.
#[derive(Debug)]
pub struct FramedStream<S: Read + Write> {
    inner: BufReader<S>,
    staged: Vec<u8>,
    limits: FrameLimits,
}

impl<S: Read + Write> FramedStream<S> {
    /// Wraps `stream` with the given size bounds.
    pub fn new(stream: S, limits: FrameLimits) -> Self {
        Self {
            inner: BufReader::new(stream),
            staged: Vec::new(),
            limits,
        }
    }

    /// Size bounds in effect.
    pub const fn limits(&self) -> FrameLimits {
        self.limits
    }

    /// Shared access to the transport.
    pub fn get_ref(&self) -> &S {
        self.inner.get_ref()
    }

    /// Reads one text line and strips surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::EndOfStream`] if the stream ends before the
    /// newline, [`FrameError::LineTooLong`] past `max_line_bytes`,
    /// [`FrameError::InvalidUtf8`] for undecodable text and
    /// [`FrameError::Io`] for transport faults.
    pub fn read_line(&mut self) -> Result<String, FrameError> {
        let raw = self.read_delimited(self.limits.max_line_bytes)?;
        let text = String::from_utf8(raw).map_err(|_| FrameError::InvalidUtf8)?;
        Ok(text.trim().to_owned())
    }

    /// Reads a command line and validates the name it carries.
    ///
    /// # Errors
    ///
    /// As [`FramedStream::read_line`], bounded by `max_command_bytes`, plus
    /// [`FrameError::InvalidCommand`] when the token is not a valid name.
    pub fn read_command(&mut self) -> Result<CommandName, FrameError> {
        let raw = self.read_delimited(self.limits.max_command_bytes)?;
        let text = String::from_utf8(raw).map_err(|_| FrameError::InvalidUtf8)?;
        Ok(CommandName::new(text.trim())?)
    }

    /// Stages `line` followed by a newline.
    pub fn write_line(&mut self, line: &str) {
        self.staged.extend_from_slice(line.as_bytes());
        self.staged.push(b'\n');
    }

    /// Number of bytes staged and not yet flushed.
    pub const fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Writes every staged byte to the transport and flushes it.
    ///
    /// # Errors
    ///
    /// Returns the transport error; staged bytes are discarded either way.
    pub fn flush(&mut self) -> io::Result<()> {
        let staged = std::mem::take(&mut self.staged);
        let stream = self.inner.get_mut();
        stream.write_all(&staged)?;
        stream.flush()
    }

    /// Flushes staged bytes and returns the transport.
    ///
    /// Bytes already buffered for reading are dropped.
    ///
    /// # Errors
    ///
    /// Returns the transport error raised by the final flush.
    pub fn into_inner(mut self) -> io::Result<S> {
        self.flush()?;
        Ok(self.inner.into_inner())
    }

    /// Reads up to and including a newline, returning the bytes before it.
    fn read_delimited(&mut self, limit: usize) -> Result<Vec<u8>, FrameError> {
        let mut line = Vec::new();
        loop {
            let available = match self.inner.fill_buf() {
                Ok(bytes) => bytes,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => return Err(FrameError::Io(error)),
            };
            if available.is_empty() {
                return Err(FrameError::EndOfStream {
                    partial: line.len(),
                });
            }

            let newline = available.iter().position(|byte| *byte == b'\n');
            let content = newline.unwrap_or(available.len());
            let consumed = newline.map_or(content, |position| position + 1);
            if line.len() + content > limit {
                self.inner.consume(consumed);
                return Err(FrameError::LineTooLong { limit });
            }
            line.extend_from_slice(available.get(..content).unwrap_or_default());
            self.inner.consume(consumed);
            if newline.is_some() {
                return Ok(line);
            }
        }
    }
}

impl<S: Read + Write> Read for FramedStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<S: Read + Write> BufRead for FramedStream<S> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amount: usize) {
        self.inner.consume(amount);
    }
}

impl<S: Read + Write> Write for FramedStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.staged.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Self::flush(self)
    }
}
