//! Ed25519 keys for signing repository commits.
//!
//! A repository owns one [`SigningKey`]. Every commit carries a signature
//! over its unsigned encoding; anyone holding the matching [`VerifyingKey`]
//! can check it.

use std::fmt;

use ed25519_dalek::{Signer, Verifier};

/// Length of a secret or public key.
pub const KEY_LEN: usize = 32;
/// Length of a raw signature.
pub const SIGNATURE_LEN: usize = 64;

/// Failures when loading keys or checking signatures.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature does not match the message")]
    Mismatch,
    #[error("malformed key: {0}")]
    MalformedKey(String),
    #[error("malformed signature: expected {SIGNATURE_LEN} bytes, got {0}")]
    MalformedSignature(usize),
}

/// Private half of a repository key. Deliberately not `Clone`.
pub struct SigningKey(ed25519_dalek::SigningKey);

impl SigningKey {
    /// A fresh key from the thread-local CSPRNG.
    pub fn generate() -> Self {
        Self(ed25519_dalek::SigningKey::generate(&mut rand::thread_rng()))
    }

    pub fn from_bytes(secret: [u8; KEY_LEN]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(&secret))
    }

    /// Load a secret read back from storage.
    pub fn from_slice(secret: &[u8]) -> Result<Self, SignatureError> {
        let secret: [u8; KEY_LEN] = secret.try_into().map_err(|_| {
            SignatureError::MalformedKey(format!("secret is {} bytes", secret.len()))
        })?;
        Ok(Self::from_bytes(secret))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        self.0.as_bytes()
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.0.verifying_key())
    }

    /// Sign `message`. Ed25519 signatures are deterministic.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.0.sign(message))
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

/// Public half of a repository key.
#[derive(Clone, PartialEq, Eq)]
pub struct VerifyingKey(ed25519_dalek::VerifyingKey);

impl VerifyingKey {
    pub fn from_bytes(public: [u8; KEY_LEN]) -> Result<Self, SignatureError> {
        ed25519_dalek::VerifyingKey::from_bytes(&public)
            .map(Self)
            .map_err(|e| SignatureError::MalformedKey(e.to_string()))
    }

    pub fn to_bytes(&self) -> [u8; KEY_LEN] {
        self.0.to_bytes()
    }

    /// Check `signature` over `message`.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), SignatureError> {
        self.0
            .verify(message, &signature.0)
            .map_err(|_| SignatureError::Mismatch)
    }
}

impl fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerifyingKey({})", hex::encode(self.to_bytes()))
    }
}

/// A detached commit signature.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(ed25519_dalek::Signature);

impl Signature {
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        self.0.to_bytes()
    }

    /// Parse the raw bytes carried in a commit's `sig` field.
    pub fn from_slice(raw: &[u8]) -> Result<Self, SignatureError> {
        let raw: [u8; SIGNATURE_LEN] = raw
            .try_into()
            .map_err(|_| SignatureError::MalformedSignature(raw.len()))?;
        Ok(Self(ed25519_dalek::Signature::from_bytes(&raw)))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}..)", hex::encode(&self.to_bytes()[..6]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMMIT: &[u8] = b"unsigned commit bytes";

    #[test]
    fn commit_signature_verifies_under_owner_key() {
        let owner = SigningKey::from_bytes([1u8; KEY_LEN]);
        let sig = owner.sign(COMMIT);
        assert_eq!(owner.verifying_key().verify(COMMIT, &sig), Ok(()));
    }

    #[test]
    fn altered_commit_or_foreign_key_is_rejected() {
        let owner = SigningKey::generate();
        let sig = owner.sign(COMMIT);
        assert_eq!(
            owner.verifying_key().verify(b"unsigned commit bytez", &sig),
            Err(SignatureError::Mismatch)
        );
        let stranger = SigningKey::generate().verifying_key();
        assert_eq!(stranger.verify(COMMIT, &sig), Err(SignatureError::Mismatch));
    }

    #[test]
    fn same_key_same_message_same_signature() {
        let owner = SigningKey::from_bytes([7u8; KEY_LEN]);
        assert_eq!(owner.sign(COMMIT), owner.sign(COMMIT));
    }

    #[test]
    fn stored_secret_reloads_to_the_same_identity() {
        let owner = SigningKey::generate();
        let reloaded = SigningKey::from_slice(owner.as_bytes()).unwrap();
        assert_eq!(owner.verifying_key(), reloaded.verifying_key());
        assert!(matches!(
            SigningKey::from_slice(&[0u8; 31]),
            Err(SignatureError::MalformedKey(_))
        ));
    }

    #[test]
    fn signature_parses_from_commit_field() {
        let sig = SigningKey::generate().sign(COMMIT);
        assert_eq!(Signature::from_slice(&sig.to_bytes()).unwrap(), sig);
        assert_eq!(
            Signature::from_slice(&[0u8; 12]),
            Err(SignatureError::MalformedSignature(12))
        );
    }

    #[test]
    fn public_key_bytes_reload() {
        let public = SigningKey::generate().verifying_key();
        assert_eq!(VerifyingKey::from_bytes(public.to_bytes()).unwrap(), public);
    }

    #[test]
    fn secret_never_appears_in_debug_output() {
        let owner = SigningKey::from_bytes([0xab; KEY_LEN]);
        let shown = format!("{owner:?}");
        assert!(shown.contains("redacted"));
        assert!(!shown.contains("abab"));
    }
}
