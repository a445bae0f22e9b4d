//! Error types for the tree engine.

use quire_types::ObjectId;

/// Errors that can occur during tree operations.
#[derive(Debug, thiserror::Error)]
pub enum MstError {
    /// A node referenced by the tree was not found in the store.
    #[error("tree node not found: {0:?}")]
    NodeNotFound(ObjectId),

    /// A node decoded but violates the node invariants.
    #[error("corrupt tree node {id:?}: {reason}")]
    CorruptNode { id: ObjectId, reason: String },

    /// The key is not a valid `collection/rkey` path.
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] quire_store::StoreError),
}

/// Convenience alias for tree results.
pub type MstResult<T> = Result<T, MstError>;
