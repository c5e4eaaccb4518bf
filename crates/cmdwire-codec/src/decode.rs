//! Stateful record decoder.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::io::Read;

use serde::Deserialize;
use tracing::trace;

use crate::error::DecodeError;
use crate::limits::CodecLimits;
use crate::record::{RECORD_SHAPE, Record};
use crate::shape::WireShape;
use crate::wire::{TAG_TYPE_DEF, TAG_VALUE, read_tag, read_type_def, read_type_id};

const DECODE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::decode");

/// Upper bound on distinct type definitions remembered per stream.
const MAX_KNOWN_TYPES: usize = 64;

/// Containers the deserialiser may open per record: the record itself and one
/// of its map or byte fields.
const CONTAINERS_PER_RECORD: usize = 2;

/// Decodes records from a byte stream.
///
/// Type definitions are remembered across calls, so one decoder must read
/// every value of a stream in order.
#[derive(Debug)]
pub struct Decoder {
    limits: CodecLimits,
    known: HashMap<u64, WireShape>,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(CodecLimits::default())
    }
}

impl Decoder {
    /// Creates a decoder that knows no types yet.
    #[must_use]
    pub fn new(limits: CodecLimits) -> Self {
        Self {
            limits,
            known: HashMap::new(),
        }
    }

    /// Limits applied to decoded values.
    #[must_use]
    pub const fn limits(&self) -> CodecLimits {
        self.limits
    }

    /// Reads type definitions until a value arrives, then decodes it.
    ///
    /// Exactly the bytes of that message are consumed; anything after the
    /// value remains unread.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] describing the first defect found. The
    /// stream position is unspecified afterwards.
    pub fn decode<R: Read + ?Sized>(&mut self, reader: &mut R) -> Result<Record, DecodeError> {
        loop {
            match read_tag(reader)? {
                TAG_TYPE_DEF => self.learn_type(reader)?,
                TAG_VALUE => return self.read_value(reader),
                other => return Err(DecodeError::InvalidTag(other)),
            }
        }
    }

    fn learn_type<R: Read + ?Sized>(&mut self, reader: &mut R) -> Result<(), DecodeError> {
        let def = read_type_def(reader)?;
        let known_types = self.known.len();
        match self.known.entry(def.id) {
            Entry::Occupied(existing) if *existing.get() != def.shape => {
                Err(DecodeError::TypeRedefined(def.id))
            }
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(_) if known_types >= MAX_KNOWN_TYPES => Err(
                DecodeError::malformed_shape("too many type definitions on one stream"),
            ),
            Entry::Vacant(slot) => {
                trace!(
                    target: DECODE_TARGET,
                    type_id = def.id,
                    shape = %def.shape.name,
                    "learned type definition"
                );
                slot.insert(def.shape);
                Ok(())
            }
        }
    }

    fn read_value<R: Read + ?Sized>(&self, reader: &mut R) -> Result<Record, DecodeError> {
        let type_id = read_type_id(reader)?;
        let shape = self
            .known
            .get(&type_id)
            .ok_or(DecodeError::UnknownType(type_id))?;
        shape.check_against(&RECORD_SHAPE)?;

        let max_depth = self.limits.max_depth;
        if max_depth == 0 {
            return Err(DecodeError::DepthExceeded { max_depth });
        }
        let budget = self.limits.value_budget();
        let mut bounded = Read::take(&mut *reader, budget);
        let mut deserializer = rmp_serde::Deserializer::new(&mut bounded);
        // Guards the stack while reading; the exact bound is checked afterwards.
        deserializer.set_max_depth(
            max_depth
                .saturating_mul(CONTAINERS_PER_RECORD)
                .saturating_add(1),
        );
        let decoded = Record::deserialize(&mut deserializer);
        let exhausted = bounded.limit() == 0;

        let record = match decoded {
            Ok(record) => record,
            Err(rmp_serde::decode::Error::DepthLimitExceeded) => {
                return Err(DecodeError::DepthExceeded { max_depth });
            }
            Err(_) if exhausted => return Err(DecodeError::ValueTooLarge { max: budget }),
            Err(error) => return Err(error.into()),
        };
        self.check_record(&record)?;
        trace!(
            target: DECODE_TARGET,
            type_id,
            depth = record.depth(),
            "decoded record"
        );
        Ok(record)
    }

    fn check_record(&self, record: &Record) -> Result<(), DecodeError> {
        let max_depth = self.limits.max_depth;
        if record.depth() > max_depth {
            return Err(DecodeError::DepthExceeded { max_depth });
        }
        let max = self.limits.max_field_bytes;
        let oversized = |field: &'static str, len: usize| {
            if len > max {
                Err(DecodeError::FieldTooLarge { field, len, max })
            } else {
                Ok(())
            }
        };
        let mut level = Some(record);
        while let Some(current) = level {
            oversized("s", current.s.len())?;
            oversized("p", current.p.len())?;
            oversized("m", current.m.len())?;
            for key in current.m.keys() {
                oversized("m", key.len())?;
            }
            level = current.c.as_deref();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::Encoder;
    use std::io::Cursor;

    fn encoded(record: &Record) -> Vec<u8> {
        let mut out = Vec::new();
        Encoder::default()
            .encode(&mut out, record)
            .expect("encode");
        out
    }

    #[test]
    fn value_without_definition_is_unknown() {
        let bytes = [TAG_VALUE, 0x07];
        let error = Decoder::default()
            .decode(&mut Cursor::new(bytes))
            .expect_err("unknown type");
        assert!(matches!(error, DecodeError::UnknownType(7)));
    }

    #[test]
    fn unexpected_tag_is_rejected() {
        let error = Decoder::default()
            .decode(&mut Cursor::new([0x7f_u8]))
            .expect_err("bad tag");
        assert!(matches!(error, DecodeError::InvalidTag(0x7f)));
    }

    #[test]
    fn empty_stream_is_truncated() {
        let error = Decoder::default()
            .decode(&mut Cursor::new(Vec::<u8>::new()))
            .expect_err("empty");
        assert!(matches!(error, DecodeError::Truncated));
    }

    #[test]
    fn body_of_the_wrong_type_is_malformed() {
        let mut bytes = encoded(&Record::new(1, "a"));
        let body = rmp_serde::to_vec_named(&Record::new(1, "a")).expect("body");
        bytes.truncate(bytes.len() - body.len());
        bytes.extend(rmp_serde::to_vec(&"not a record").expect("text"));
        let error = Decoder::default()
            .decode(&mut Cursor::new(bytes))
            .expect_err("wrong body");
        assert!(matches!(error, DecodeError::Malformed { .. }));
    }

    #[test]
    fn redefinition_with_another_shape_is_rejected() {
        let first = encoded(&Record::new(1, "a"));
        let mut decoder = Decoder::default();
        decoder
            .decode(&mut Cursor::new(first.clone()))
            .expect("first decode");

        let mut altered = first;
        // Rename the shape from "Record" to "Rekord".
        if let Some(byte) = altered.iter_mut().find(|byte| **byte == b'c') {
            *byte = b'k';
        }
        let error = decoder
            .decode(&mut Cursor::new(altered))
            .expect_err("redefined");
        assert!(matches!(error, DecodeError::TypeRedefined(1)));
    }

    #[test]
    fn nesting_beyond_limit_is_rejected() {
        let record = Record::new(1, "a").with_child(Record::new(2, "b"));
        let bytes = encoded(&record);
        let error = Decoder::new(CodecLimits::new(1, 1024))
            .decode(&mut Cursor::new(bytes))
            .expect_err("too deep");
        assert!(matches!(error, DecodeError::DepthExceeded { max_depth: 1 }));
    }

    #[test]
    fn value_past_the_byte_budget_is_refused() {
        let record = Record::new(1, "x").with_bytes(vec![0x41_u8; 40]);
        let bytes = encoded(&record);
        let error = Decoder::new(CodecLimits::new(1, 4))
            .decode(&mut Cursor::new(bytes))
            .expect_err("over budget");
        assert!(matches!(error, DecodeError::ValueTooLarge { max: 16 }));
    }
}
