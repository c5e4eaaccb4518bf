//! Error types for the record codec.

use std::io;

use thiserror::Error;

use crate::graph::NodeId;

/// Errors raised while encoding a record or record graph.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The graph revisits a node on the path from the root, so the value has
    /// no finite encoding.
    #[error("record graph contains a pointer cycle through node {node}")]
    Cycle {
        /// First node seen twice while walking from the root.
        node: NodeId,
    },
    /// Nesting exceeds the configured bound.
    #[error("record nesting exceeds the maximum depth of {max_depth}")]
    DepthExceeded {
        /// Configured bound.
        max_depth: usize,
    },
    /// A graph edge refers to a node that is not in the arena.
    #[error("record graph has no node {node}")]
    DanglingNode {
        /// Missing node identifier.
        node: NodeId,
    },
    /// A field is larger than the peer is allowed to accept.
    #[error("field '{field}' holds {len} bytes, above the {max} byte limit")]
    FieldTooLarge {
        /// Field name.
        field: &'static str,
        /// Encoded length.
        len: usize,
        /// Configured limit.
        max: usize,
    },
    /// The value could not be serialised.
    #[error("failed to serialise record: {0}")]
    Serialize(#[from] rmp_serde::encode::Error),
    /// Writing to the underlying stream failed.
    #[error("failed to write record: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised while decoding a record.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The stream ended in the middle of a message.
    #[error("record payload is truncated")]
    Truncated,
    /// A message began with a byte that is neither a type definition nor a
    /// value marker.
    #[error("invalid message tag 0x{0:02x}")]
    InvalidTag(u8),
    /// A value referenced a type identifier that was never defined.
    #[error("value refers to undefined type {0}")]
    UnknownType(u64),
    /// A type identifier was defined twice with different shapes.
    #[error("type {0} was redefined with a different shape")]
    TypeRedefined(u64),
    /// A type definition was structurally invalid.
    #[error("malformed type definition: {reason}")]
    MalformedShape {
        /// Description of the defect.
        reason: String,
    },
    /// The wire shape does not line up with the local record shape.
    #[error("shape '{wire}' does not match local shape '{local}': {reason}")]
    ShapeMismatch {
        /// Name announced by the peer.
        wire: String,
        /// Name of the local shape.
        local: &'static str,
        /// Which field or count differs.
        reason: String,
    },
    /// A decoded field exceeds the configured bound.
    #[error("field '{field}' holds {len} bytes, above the {max} byte limit")]
    FieldTooLarge {
        /// Field name.
        field: &'static str,
        /// Decoded length.
        len: usize,
        /// Configured limit.
        max: usize,
    },
    /// The value ran past the byte budget before it was complete.
    #[error("record value exceeds {max} encoded bytes")]
    ValueTooLarge {
        /// Byte budget for one value.
        max: u64,
    },
    /// Nesting exceeds the configured bound.
    #[error("record nesting exceeds the maximum depth of {max_depth}")]
    DepthExceeded {
        /// Configured bound.
        max_depth: usize,
    },
    /// A string field was not valid UTF-8.
    #[error("record text is not valid UTF-8")]
    InvalidUtf8,
    /// The value body did not deserialise into a record, including maps that
    /// repeat a key.
    #[error("malformed record value: {reason}")]
    Malformed {
        /// Description of the defect.
        reason: String,
    },
    /// Reading from the underlying stream failed.
    #[error("failed to read record: {0}")]
    Io(#[source] io::Error),
}

impl From<io::Error> for DecodeError {
    fn from(error: io::Error) -> Self {
        if error.kind() == io::ErrorKind::UnexpectedEof {
            Self::Truncated
        } else {
            Self::Io(error)
        }
    }
}

impl From<rmp_serde::decode::Error> for DecodeError {
    fn from(error: rmp_serde::decode::Error) -> Self {
        use rmp_serde::decode::Error as Rmp;
        match error {
            Rmp::InvalidMarkerRead(source) | Rmp::InvalidDataRead(source) => Self::from(source),
            Rmp::Utf8Error(_) => Self::InvalidUtf8,
            other => Self::Malformed {
                reason: other.to_string(),
            },
        }
    }
}

impl DecodeError {
    /// Creates a shape mismatch error.
    pub fn shape_mismatch(
        wire: impl Into<String>,
        local: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::ShapeMismatch {
            wire: wire.into(),
            local,
            reason: reason.into(),
        }
    }

    /// Creates a malformed shape error.
    pub fn malformed_shape(reason: impl Into<String>) -> Self {
        Self::MalformedShape {
            reason: reason.into(),
        }
    }

    /// Returns `true` when the error reflects a transport fault rather than a
    /// defect in the payload itself.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
