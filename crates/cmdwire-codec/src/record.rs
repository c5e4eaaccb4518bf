//! The structured record carried by record-oriented commands.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::shape::{FieldDef, Kind, Shape};

/// Local shape of [`Record`], announced once per stream by the encoder.
pub const RECORD_SHAPE: Shape = Shape {
    name: "Record",
    fields: &[
        FieldDef {
            name: "n",
            kind: Kind::Int,
        },
        FieldDef {
            name: "s",
            kind: Kind::Str,
        },
        FieldDef {
            name: "m",
            kind: Kind::Map,
        },
        FieldDef {
            name: "p",
            kind: Kind::Bytes,
        },
        FieldDef {
            name: "c",
            kind: Kind::Ref,
        },
    ],
};

/// A record tree.
///
/// Ownership makes a `Record` acyclic by construction; graphs that alias or
/// loop back to an ancestor are expressed with [`crate::RecordGraph`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Integer field.
    pub n: i64,
    /// Text field.
    pub s: String,
    /// Map field; encoded in ascending key order.
    #[serde(deserialize_with = "unique_keys")]
    pub m: BTreeMap<String, i64>,
    /// Byte sequence field.
    pub p: Vec<u8>,
    /// Nested record of the same shape.
    pub c: Option<Box<Record>>,
}

impl Record {
    /// Creates a record with the scalar fields set and everything else empty.
    #[must_use]
    pub fn new(n: i64, s: impl Into<String>) -> Self {
        Self {
            n,
            s: s.into(),
            m: BTreeMap::new(),
            p: Vec::new(),
            c: None,
        }
    }

    /// Replaces the map field.
    #[must_use]
    pub fn with_entries<K, I>(mut self, entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, i64)>,
    {
        self.m = entries
            .into_iter()
            .map(|(key, value)| (key.into(), value))
            .collect();
        self
    }

    /// Replaces the byte field.
    #[must_use]
    pub fn with_bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.p = bytes.into();
        self
    }

    /// Attaches a nested record.
    #[must_use]
    pub fn with_child(mut self, child: Self) -> Self {
        self.c = Some(Box::new(child));
        self
    }

    /// Number of records in the chain starting at `self`.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut current = self.c.as_deref();
        while let Some(record) = current {
            depth += 1;
            current = record.c.as_deref();
        }
        depth
    }
}

/// Builds the map field, refusing a key the peer sent twice.
fn unique_keys<'de, D>(deserializer: D) -> Result<BTreeMap<String, i64>, D::Error>
where
    D: Deserializer<'de>,
{
    struct UniqueKeys;

    impl<'de> Visitor<'de> for UniqueKeys {
        type Value = BTreeMap<String, i64>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map from text keys to integers")
        }

        fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = BTreeMap::new();
            while let Some((key, value)) = access.next_entry::<String, i64>()? {
                if entries.contains_key(&key) {
                    return Err(de::Error::custom(format!("map field repeats key '{key}'")));
                }
                entries.insert(key, value);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(UniqueKeys)
}

impl Drop for Record {
    // Unlinks the chain iteratively so dropping a deep record cannot exhaust
    // the stack.
    fn drop(&mut self) {
        let mut next = self.c.take();
        while let Some(mut record) = next {
            next = record.c.take();
        }
    }
}
