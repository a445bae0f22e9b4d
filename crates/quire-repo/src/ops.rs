//! Write batch input and result types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use quire_types::{ObjectId, Tid};

use crate::error::{RepoError, RepoResult};

/// One operation of a write batch.
///
/// The `$type` tag takes the full `com.atproto.repo.applyWrites#...` name or
/// the short `create` / `update` / `delete` form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum WriteOp {
    #[serde(rename = "com.atproto.repo.applyWrites#create", alias = "create")]
    Create {
        collection: String,
        /// Defaults to a fresh revision token.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rkey: Option<String>,
        /// Accepted and ignored; no schema validation is performed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        validate: Option<bool>,
        value: Value,
    },
    #[serde(rename = "com.atproto.repo.applyWrites#update", alias = "update")]
    Update {
        collection: String,
        rkey: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        validate: Option<bool>,
        /// Accepted and ignored; writes are not compare-and-swap.
        #[serde(rename = "swapRecord", default, skip_serializing_if = "Option::is_none")]
        swap_record: Option<String>,
        value: Value,
    },
    #[serde(rename = "com.atproto.repo.applyWrites#delete", alias = "delete")]
    Delete { collection: String, rkey: String },
}

impl WriteOp {
    pub fn create(collection: &str, rkey: Option<&str>, value: Value) -> Self {
        Self::Create {
            collection: collection.to_string(),
            rkey: rkey.map(str::to_string),
            validate: None,
            value,
        }
    }

    pub fn update(collection: &str, rkey: &str, value: Value) -> Self {
        Self::Update {
            collection: collection.to_string(),
            rkey: rkey.to_string(),
            validate: None,
            swap_record: None,
            value,
        }
    }

    pub fn delete(collection: &str, rkey: &str) -> Self {
        Self::Delete {
            collection: collection.to_string(),
            rkey: rkey.to_string(),
        }
    }

    /// Parse a JSON array of operations.
    ///
    /// Any malformed entry, including an unknown `$type`, rejects the whole
    /// batch with [`RepoError::InvalidOperation`].
    pub fn parse_batch(json: &Value) -> RepoResult<Vec<Self>> {
        Vec::<Self>::deserialize(json).map_err(|e| RepoError::InvalidOperation(e.to_string()))
    }
}

/// Always `unknown`: records are not checked against a schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Unknown,
}

/// Per-operation entry of an apply result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum WriteResult {
    #[serde(rename = "com.atproto.repo.applyWrites#createResult")]
    Create {
        uri: String,
        cid: ObjectId,
        #[serde(rename = "validationStatus")]
        validation_status: ValidationStatus,
    },
    #[serde(rename = "com.atproto.repo.applyWrites#updateResult")]
    Update {
        uri: String,
        cid: ObjectId,
        #[serde(rename = "validationStatus")]
        validation_status: ValidationStatus,
    },
    #[serde(rename = "com.atproto.repo.applyWrites#deleteResult")]
    Delete,
}

impl WriteResult {
    pub fn created(did: &str, path: &str, cid: ObjectId) -> Self {
        Self::Create {
            uri: record_uri(did, path),
            cid,
            validation_status: ValidationStatus::Unknown,
        }
    }

    pub fn updated(did: &str, path: &str, cid: ObjectId) -> Self {
        Self::Update {
            uri: record_uri(did, path),
            cid,
            validation_status: ValidationStatus::Unknown,
        }
    }
}

/// `at://` URI of a record.
pub fn record_uri(did: &str, path: &str) -> String {
    format!("at://{did}/{path}")
}

/// Commit reference returned by an apply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    pub cid: ObjectId,
    pub rev: Tid,
}

/// Result of applying a write batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyWritesOutput {
    pub commit: CommitRef,
    pub results: Vec<WriteResult>,
}
