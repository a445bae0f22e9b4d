//! Signed commit objects.

use serde::{Deserialize, Serialize};

use quire_crypto::{ContentHasher, Signature, SigningKey, VerifyingKey};
use quire_store::codec;
use quire_types::{ObjectId, Tid};

use crate::config::COMMIT_VERSION;
use crate::error::RepoResult;

/// A commit before signing. The signature covers exactly this encoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedCommit {
    pub version: u64,
    pub did: String,
    /// Tree root.
    pub data: ObjectId,
    pub rev: Tid,
    /// Always null: repositories form a single chain with no merges.
    pub prev: Option<ObjectId>,
}

/// A signed commit as stored and replicated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub version: u64,
    pub did: String,
    pub data: ObjectId,
    pub rev: Tid,
    pub prev: Option<ObjectId>,
    #[serde(with = "serde_bytes")]
    pub sig: Vec<u8>,
}

impl UnsignedCommit {
    pub fn new(did: &str, data: ObjectId, rev: Tid) -> Self {
        Self {
            version: COMMIT_VERSION,
            did: did.to_string(),
            data,
            rev,
            prev: None,
        }
    }

    pub fn encode(&self) -> RepoResult<Vec<u8>> {
        Ok(codec::encode(self)?)
    }

    pub fn sign(self, key: &SigningKey) -> RepoResult<Commit> {
        let sig = key.sign(&self.encode()?);
        Ok(Commit {
            version: self.version,
            did: self.did,
            data: self.data,
            rev: self.rev,
            prev: self.prev,
            sig: sig.to_bytes().to_vec(),
        })
    }
}

impl Commit {
    pub fn encode(&self) -> RepoResult<Vec<u8>> {
        Ok(codec::encode(self)?)
    }

    pub fn decode(bytes: &[u8]) -> RepoResult<Self> {
        Ok(codec::decode(bytes)?)
    }

    /// Content id of the encoded commit.
    pub fn id(&self) -> RepoResult<ObjectId> {
        Ok(ContentHasher::BLOCK.hash(&self.encode()?))
    }

    /// The signed fields.
    pub fn unsigned(&self) -> UnsignedCommit {
        UnsignedCommit {
            version: self.version,
            did: self.did.clone(),
            data: self.data,
            rev: self.rev,
            prev: self.prev,
        }
    }

    /// Check the signature against `key`.
    pub fn verify(&self, key: &VerifyingKey) -> RepoResult<()> {
        let sig = Signature::from_slice(&self.sig)?;
        key.verify(&self.unsigned().encode()?, &sig)?;
        Ok(())
    }
}
