//! Message framing shared by the encoder and decoder.
//!
//! Each message starts with a one-byte tag. Type definitions and values are
//! MessagePack documents written with named fields, so the decoder reads
//! exactly one document per call and never buffers past it.

use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, EncodeError};
use crate::shape::WireShape;

/// Marker preceding a type definition.
pub(crate) const TAG_TYPE_DEF: u8 = 0x01;
/// Marker preceding a value.
pub(crate) const TAG_VALUE: u8 = 0x02;
/// Upper bound on the number of fields a shape may declare.
pub(crate) const MAX_SHAPE_FIELDS: usize = 64;
/// Upper bound on the encoded size of one type definition.
pub(crate) const MAX_TYPE_DEF_BYTES: u64 = 4096;
/// Upper bound on the encoded size of a type identifier.
const MAX_TYPE_ID_BYTES: u64 = 9;

/// Announcement binding a type identifier to a shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct TypeDef {
    pub(crate) id: u64,
    pub(crate) shape: WireShape,
}

pub(crate) fn write_type_def(out: &mut Vec<u8>, def: &TypeDef) -> Result<(), EncodeError> {
    out.push(TAG_TYPE_DEF);
    rmp_serde::encode::write_named(out, def)?;
    Ok(())
}

pub(crate) fn write_value_header(out: &mut Vec<u8>, type_id: u64) -> Result<(), EncodeError> {
    out.push(TAG_VALUE);
    rmp_serde::encode::write(out, &type_id)?;
    Ok(())
}

/// Reads the tag of the next message.
pub(crate) fn read_tag<R: Read + ?Sized>(reader: &mut R) -> Result<u8, DecodeError> {
    let mut buf = [0_u8; 1];
    reader.read_exact(&mut buf)?;
    let [tag] = buf;
    Ok(tag)
}

pub(crate) fn read_type_def<R: Read + ?Sized>(reader: &mut R) -> Result<TypeDef, DecodeError> {
    let bounded = Read::take(&mut *reader, MAX_TYPE_DEF_BYTES);
    let def: TypeDef = rmp_serde::from_read(bounded).map_err(DecodeError::from)?;
    if def.id == 0 {
        return Err(DecodeError::malformed_shape("type id 0 is reserved"));
    }
    if def.shape.fields.len() > MAX_SHAPE_FIELDS {
        return Err(DecodeError::malformed_shape(format!(
            "shape '{}' declares {} fields",
            def.shape.name,
            def.shape.fields.len()
        )));
    }
    Ok(def)
}

pub(crate) fn read_type_id<R: Read + ?Sized>(reader: &mut R) -> Result<u64, DecodeError> {
    let bounded = Read::take(&mut *reader, MAX_TYPE_ID_BYTES);
    rmp_serde::from_read(bounded).map_err(DecodeError::from)
}
