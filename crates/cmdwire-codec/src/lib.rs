//! Self-describing encoding for the structured records exchanged by cmdwire
//! peers.
//!
//! A stream carries type definitions followed by values. The [`Encoder`]
//! announces a shape the first time it writes a value of that shape; the
//! [`Decoder`] remembers every definition it has read and matches wire fields
//! to the local [`Record`] by name. Both sides are bounded by
//! [`CodecLimits`].
//!
//! Values are plain trees: a nested record is written inline and aliasing is
//! not preserved. Graphs that share or loop back to a node are modelled with
//! [`RecordGraph`]; the encoder refuses any graph whose chain revisits a node.
//!
//! Type definitions and bodies are MessagePack documents with named fields,
//! written with `rmp-serde`:
//!
//! ```text
//! message  := type-def* value
//! type-def := 0x01 {id, shape: {name, fields: [[field-name, kind]*]}}
//! value    := 0x02 type-id {n, s, m, p, c}
//! ```

mod decode;
mod encode;
mod error;
mod graph;
mod limits;
mod record;
mod shape;
mod wire;

pub use decode::Decoder;
pub use encode::Encoder;
pub use error::{DecodeError, EncodeError};
pub use graph::{NodeId, RecordGraph, RecordNode};
pub use limits::{CodecLimits, DEFAULT_MAX_DEPTH, DEFAULT_MAX_FIELD_BYTES};
pub use record::{RECORD_SHAPE, Record};
pub use shape::{FieldDef, Kind, Shape, WireShape};
