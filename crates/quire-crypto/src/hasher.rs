//! Content identifiers.
//!
//! Blocks and blobs are hashed in separate BLAKE3 key-derivation contexts, so
//! a blob whose bytes happen to equal an encoded block still gets a
//! different identifier.

use quire_types::ObjectId;

/// A BLAKE3 hashing context for one kind of content.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContentHasher {
    context: &'static str,
}

impl ContentHasher {
    /// DAG-CBOR blocks: tree nodes, record values and commits.
    pub const BLOCK: Self = Self {
        context: "quire 2024 block v1",
    };
    /// Raw blob payloads.
    pub const BLOB: Self = Self {
        context: "quire 2024 blob v1",
    };

    /// Identifier of `data` in this context.
    pub fn hash(&self, data: &[u8]) -> ObjectId {
        let digest = blake3::Hasher::new_derive_key(self.context)
            .update(data)
            .finalize();
        ObjectId::from_hash(*digest.as_bytes())
    }

    /// Whether `data` hashes to `expected`.
    pub fn verify(&self, data: &[u8], expected: &ObjectId) -> bool {
        self.hash(data) == *expected
    }

    /// Plain BLAKE3, outside any context. Used for tree key layering.
    pub fn raw_hash(data: &[u8]) -> [u8; 32] {
        blake3::hash(data).into()
    }
}
