//! Stateful record encoder.

use std::collections::HashMap;
use std::io::Write;

use tracing::trace;

use crate::error::EncodeError;
use crate::graph::{NodeId, RecordGraph};
use crate::limits::CodecLimits;
use crate::record::{RECORD_SHAPE, Record};
use crate::shape::WireShape;
use crate::wire::{TypeDef, write_type_def, write_value_header};

const ENCODE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::encode");

/// Encodes records onto a byte stream.
///
/// One encoder belongs to one stream: a shape's type definition is written
/// the first time a value of that shape is encoded and never again.
#[derive(Debug)]
pub struct Encoder {
    limits: CodecLimits,
    announced: HashMap<&'static str, u64>,
    next_type_id: u64,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new(CodecLimits::default())
    }
}

impl Encoder {
    /// Creates an encoder that has announced no types yet.
    #[must_use]
    pub fn new(limits: CodecLimits) -> Self {
        Self {
            limits,
            announced: HashMap::new(),
            next_type_id: 1,
        }
    }

    /// Limits applied to encoded values.
    #[must_use]
    pub const fn limits(&self) -> CodecLimits {
        self.limits
    }

    /// Number of type definitions already written to the stream.
    #[must_use]
    pub fn announced_types(&self) -> usize {
        self.announced.len()
    }

    /// Writes one record tree.
    ///
    /// # Errors
    ///
    /// Fails with [`EncodeError::DepthExceeded`] or
    /// [`EncodeError::FieldTooLarge`] before anything is written, and with
    /// [`EncodeError::Io`] when the writer fails.
    pub fn encode<W: Write + ?Sized>(
        &mut self,
        writer: &mut W,
        record: &Record,
    ) -> Result<(), EncodeError> {
        let max_depth = self.limits.max_depth;
        if record.depth() > max_depth {
            return Err(EncodeError::DepthExceeded { max_depth });
        }
        self.write_value(writer, record)
    }

    /// Writes the record chain reachable from `root`.
    ///
    /// # Errors
    ///
    /// Fails with [`EncodeError::Cycle`] when the chain loops back to a node
    /// already on the path, plus every error [`Encoder::encode`] reports.
    /// Nothing is written for a value that fails validation.
    pub fn encode_graph<W: Write + ?Sized>(
        &mut self,
        writer: &mut W,
        graph: &RecordGraph,
        root: NodeId,
    ) -> Result<(), EncodeError> {
        let record = graph.to_record(root, self.limits.max_depth)?;
        self.write_value(writer, &record)
    }

    fn write_value<W: Write + ?Sized>(
        &mut self,
        writer: &mut W,
        record: &Record,
    ) -> Result<(), EncodeError> {
        let mut level = Some(record);
        while let Some(current) = level {
            self.check_sizes(current)?;
            level = current.c.as_deref();
        }

        let mut out = Vec::new();
        let announced = self.announced.get(RECORD_SHAPE.name).copied();
        let fresh = announced.is_none();
        let type_id = announced.unwrap_or(self.next_type_id);
        if fresh {
            let def = TypeDef {
                id: type_id,
                shape: WireShape::from(&RECORD_SHAPE),
            };
            write_type_def(&mut out, &def)?;
        }
        write_value_header(&mut out, type_id)?;
        rmp_serde::encode::write_named(&mut out, record)?;

        writer.write_all(&out)?;
        if fresh {
            self.announced.insert(RECORD_SHAPE.name, type_id);
            self.next_type_id += 1;
        }
        trace!(
            target: ENCODE_TARGET,
            type_id,
            depth = record.depth(),
            bytes = out.len(),
            announced = fresh,
            "encoded record"
        );
        Ok(())
    }

    fn check_sizes(&self, record: &Record) -> Result<(), EncodeError> {
        let max = self.limits.max_field_bytes;
        let oversized = |field: &'static str, len: usize| {
            if len > max {
                Err(EncodeError::FieldTooLarge { field, len, max })
            } else {
                Ok(())
            }
        };
        oversized("s", record.s.len())?;
        oversized("p", record.p.len())?;
        oversized("m", record.m.len())?;
        for key in record.m.keys() {
            oversized("m", key.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::RecordNode;
    use crate::wire::{TAG_TYPE_DEF, TAG_VALUE};

    #[test]
    fn first_value_carries_the_type_definition() {
        let mut encoder = Encoder::default();
        let mut out = Vec::new();
        encoder
            .encode(&mut out, &Record::new(1, "a"))
            .expect("encode");
        assert_eq!(out.first(), Some(&TAG_TYPE_DEF));
        assert_eq!(encoder.announced_types(), 1);

        let mut second = Vec::new();
        encoder
            .encode(&mut second, &Record::new(2, "b"))
            .expect("encode again");
        assert_eq!(second.first(), Some(&TAG_VALUE));
        assert_eq!(encoder.announced_types(), 1);
    }

    #[test]
    fn value_body_is_keyed_by_field_name() {
        let mut out = Vec::new();
        Encoder::default()
            .encode(&mut out, &Record::new(1, "a"))
            .expect("encode");
        let body = rmp_serde::to_vec_named(&Record::new(1, "a")).expect("body");
        assert!(out.ends_with(&body));
        assert!(body.windows(2).any(|pair| pair == [0xa1, b'n']));
    }

    #[test]
    fn cycle_writes_nothing() {
        let mut graph = RecordGraph::new();
        let root = graph.insert(RecordNode::new(1, "loop"));
        graph.set_child(root, Some(root)).expect("link");
        let mut encoder = Encoder::default();
        let mut out = Vec::new();

        let error = encoder
            .encode_graph(&mut out, &graph, root)
            .expect_err("cycle");
        assert!(matches!(error, EncodeError::Cycle { .. }));
        assert!(out.is_empty());
        assert_eq!(encoder.announced_types(), 0);
    }

    #[test]
    fn oversized_field_is_refused() {
        let mut encoder = Encoder::new(CodecLimits::new(4, 3));
        let mut out = Vec::new();
        let error = encoder
            .encode(&mut out, &Record::new(1, "long text"))
            .expect_err("too large");
        assert!(matches!(
            error,
            EncodeError::FieldTooLarge { field: "s", len: 9, max: 3 }
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn depth_bound_counts_the_outer_record() {
        let mut encoder = Encoder::new(CodecLimits::new(1, 16));
        let mut out = Vec::new();
        encoder
            .encode(&mut out, &Record::new(1, "flat"))
            .expect("flat record fits");
        let nested = Record::new(1, "outer").with_child(Record::new(2, "inner"));
        let error = encoder.encode(&mut out, &nested).expect_err("too deep");
        assert!(matches!(error, EncodeError::DepthExceeded { max_depth: 1 }));
    }
}
