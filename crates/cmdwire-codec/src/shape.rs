//! Self-describing type information carried ahead of record values.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Wire kind of a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// Signed 64-bit integer.
    Int,
    /// UTF-8 text.
    Str,
    /// Opaque bytes.
    Bytes,
    /// Map from text keys to integers, keys ascending.
    Map,
    /// Optional nested value of the enclosing shape.
    Ref,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int => "int",
            Self::Str => "str",
            Self::Bytes => "bytes",
            Self::Map => "map",
            Self::Ref => "ref",
        };
        f.write_str(name)
    }
}

/// Field declaration inside a local shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name as announced on the wire.
    pub name: &'static str,
    /// Field kind.
    pub kind: Kind,
}

/// Shape known at compile time, announced by the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    /// Shape name.
    pub name: &'static str,
    /// Fields in declaration order.
    pub fields: &'static [FieldDef],
}

impl Shape {
    /// Position of a field by name.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }
}

/// Shape received from a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireShape {
    /// Shape name announced by the peer.
    pub name: String,
    /// Fields in the order the peer declares them.
    pub fields: Vec<(String, Kind)>,
}

impl WireShape {
    /// Checks that every wire field has a local counterpart of the same kind,
    /// matching by name.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::ShapeMismatch`] when the field counts differ, a
    /// wire field has no local counterpart, a kind differs, or a field is
    /// announced twice.
    pub fn check_against(&self, local: &Shape) -> Result<(), DecodeError> {
        if self.fields.len() != local.fields.len() {
            return Err(DecodeError::shape_mismatch(
                &self.name,
                local.name,
                format!(
                    "peer declares {} fields, expected {}",
                    self.fields.len(),
                    local.fields.len()
                ),
            ));
        }

        let mut seen = Vec::with_capacity(self.fields.len());
        for (name, kind) in &self.fields {
            let Some(index) = local.position(name) else {
                return Err(DecodeError::shape_mismatch(
                    &self.name,
                    local.name,
                    format!("unknown field '{name}'"),
                ));
            };
            let expected = local.fields.get(index).map(|field| field.kind);
            if expected != Some(*kind) {
                return Err(DecodeError::shape_mismatch(
                    &self.name,
                    local.name,
                    format!("field '{name}' is {kind} on the wire"),
                ));
            }
            if seen.contains(&index) {
                return Err(DecodeError::shape_mismatch(
                    &self.name,
                    local.name,
                    format!("field '{name}' declared twice"),
                ));
            }
            seen.push(index);
        }
        Ok(())
    }
}

impl From<&Shape> for WireShape {
    fn from(shape: &Shape) -> Self {
        Self {
            name: shape.name.to_owned(),
            fields: shape
                .fields
                .iter()
                .map(|field| (field.name.to_owned(), field.kind))
                .collect(),
        }
    }
}
