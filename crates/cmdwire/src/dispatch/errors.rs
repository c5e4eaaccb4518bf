//! Errors raised by command handlers.

use std::io;

use cmdwire_codec::{DecodeError, EncodeError};
use thiserror::Error;

use crate::framing::FrameError;

/// Failure reported by a [`crate::registry::Handler`].
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A payload line could not be read.
    #[error("failed to read payload line: {0}")]
    Frame(#[from] FrameError),
    /// A structured payload could not be decoded.
    #[error("failed to decode record payload: {0}")]
    Decode(#[from] DecodeError),
    /// A structured reply could not be encoded.
    #[error("failed to encode record reply: {0}")]
    Encode(#[from] EncodeError),
    /// The transport failed while flushing a reply.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    /// The handler returned with reply bytes it never flushed.
    #[error("handler returned with {bytes} unflushed reply bytes")]
    UnflushedReply {
        /// Bytes left in the write buffer.
        bytes: usize,
    },
    /// The handler rejected the request.
    #[error("{message}")]
    Failed {
        /// Description of the failure.
        message: String,
    },
}

impl HandlerError {
    /// Builds a [`HandlerError::Failed`] from a description.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}
