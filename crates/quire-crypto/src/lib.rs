//! Cryptographic primitives for Quire.
//!
//! BLAKE3 content identifiers, hashed per content kind, and the Ed25519 keys
//! that sign repository commits.

pub mod hasher;
pub mod signer;

pub use hasher::ContentHasher;
pub use signer::{Signature, SignatureError, SigningKey, VerifyingKey, KEY_LEN, SIGNATURE_LEN};
