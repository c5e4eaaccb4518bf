//! Per-command view of a connection handed to handlers.

use cmdwire_codec::{CodecLimits, Decoder, Encoder, NodeId, Record, RecordGraph};

use crate::command::CommandName;
use crate::framing::FramedStream;
use crate::transport::ConnectionStream;

use super::errors::HandlerError;

/// Codec state that lives as long as the connection.
///
/// Type definitions are announced and remembered once per stream, so the
/// encoder and decoder outlive individual commands.
#[derive(Debug, Default)]
pub(crate) struct CodecState {
    encoder: Encoder,
    decoder: Decoder,
}

impl CodecState {
    pub(crate) fn new(limits: CodecLimits) -> Self {
        Self {
            encoder: Encoder::new(limits),
            decoder: Decoder::new(limits),
        }
    }
}

/// What a handler sees while it serves one command.
///
/// The exchange borrows the connection's framed stream exclusively, so
/// payload reads pick up right after the command line and staged replies go
/// out on [`Exchange::flush`].
#[derive(Debug)]
pub struct Exchange<'a> {
    stream: &'a mut FramedStream<ConnectionStream>,
    codec: &'a mut CodecState,
    peer: &'a str,
    command: &'a CommandName,
}

impl<'a> Exchange<'a> {
    pub(crate) const fn new(
        stream: &'a mut FramedStream<ConnectionStream>,
        codec: &'a mut CodecState,
        peer: &'a str,
        command: &'a CommandName,
    ) -> Self {
        Self {
            stream,
            codec,
            peer,
            command,
        }
    }

    /// Description of the remote end.
    #[must_use]
    pub const fn peer(&self) -> &str {
        self.peer
    }

    /// Command being served.
    #[must_use]
    pub const fn command(&self) -> &CommandName {
        self.command
    }

    /// Reads one payload line with surrounding whitespace removed.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Frame`] when the line cannot be read.
    pub fn read_line(&mut self) -> Result<String, HandlerError> {
        Ok(self.stream.read_line()?)
    }

    /// Stages a reply line. Nothing reaches the peer before
    /// [`Exchange::flush`].
    pub fn write_line(&mut self, line: &str) {
        self.stream.write_line(line);
    }

    /// Decodes one structured record from the payload.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Decode`] for malformed or truncated input.
    pub fn read_record(&mut self) -> Result<Record, HandlerError> {
        Ok(self.codec.decoder.decode(&mut *self.stream)?)
    }

    /// Stages one structured record as a reply.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Encode`] when the record breaks the codec
    /// limits.
    pub fn write_record(&mut self, record: &Record) -> Result<(), HandlerError> {
        Ok(self.codec.encoder.encode(&mut *self.stream, record)?)
    }

    /// Stages the record chain rooted at `root` as a reply.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Encode`] for cyclic chains or values breaking
    /// the codec limits.
    pub fn write_graph(&mut self, graph: &RecordGraph, root: NodeId) -> Result<(), HandlerError> {
        Ok(self.codec.encoder.encode_graph(&mut *self.stream, graph, root)?)
    }

    /// Sends every staged byte to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Io`] when the transport fails.
    pub fn flush(&mut self) -> Result<(), HandlerError> {
        Ok(self.stream.flush()?)
    }

    /// Direct access to the framed stream for payloads with their own
    /// encoding.
    pub const fn stream(&mut self) -> &mut FramedStream<ConnectionStream> {
        self.stream
    }
}
