use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::TypeError;

/// Name of an immutable block or blob: the 32-byte BLAKE3 digest of its
/// content.
///
/// Binary encodings (DAG-CBOR blocks, the proof bundle) carry the raw bytes;
/// human-readable encodings such as JSON API output carry lowercase hex,
/// which is also what `Display` prints.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 32]);

impl ObjectId {
    pub const LEN: usize = 32;

    /// Plain BLAKE3 of `data`, outside any hashing context.
    ///
    /// Stored content is named with `ContentHasher` instead; this is for
    /// ids that only need to be distinct, such as tree values in tests.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(blake3::hash(data).into())
    }

    pub const fn from_hash(digest: [u8; Self::LEN]) -> Self {
        Self(digest)
    }

    /// An id read back from storage or a wire frame.
    pub fn from_slice(raw: &[u8]) -> Result<Self, TypeError> {
        raw.try_into().map(Self).map_err(|_| TypeError::InvalidLength {
            expected: Self::LEN,
            actual: raw.len(),
        })
    }

    pub fn from_hex(text: &str) -> Result<Self, TypeError> {
        let raw = hex::decode(text).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&raw)
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    /// First four bytes in hex, for log lines.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short_hex())
    }
}

impl FromStr for ObjectId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.collect_str(self)
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

struct ObjectIdVisitor;

impl Visitor<'_> for ObjectIdVisitor {
    type Value = ObjectId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a 32-byte object id as bytes or hex")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<ObjectId, E> {
        ObjectId::from_hex(v).map_err(E::custom)
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<ObjectId, E> {
        ObjectId::from_slice(v).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_str(ObjectIdVisitor)
        } else {
            deserializer.deserialize_bytes(ObjectIdVisitor)
        }
    }
}
