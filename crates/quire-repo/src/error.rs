use quire_car::CarError;
use quire_crypto::SignatureError;
use quire_mst::MstError;
use quire_store::StoreError;
use quire_types::{ObjectId, TypeError};
use thiserror::Error;

/// Errors produced by repository operations.
///
/// The first four variants are the expected outcomes of a bad write batch;
/// the rest wrap lower layers. None of them leave partial state behind.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    #[error("no such record: {0}")]
    NotFound(String),

    #[error("invalid write operation: {0}")]
    InvalidOperation(String),

    #[error("record references blob {0} which was never uploaded")]
    DanglingBlobReference(ObjectId),

    #[error("repository not found: {0}")]
    RepoNotFound(String),

    #[error("repository already exists: {0}")]
    RepoExists(String),

    #[error("corrupt stored data: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("tree error: {0}")]
    Mst(#[from] MstError),

    #[error("container error: {0}")]
    Car(#[from] CarError),

    #[error("signature error: {0}")]
    Signature(#[from] SignatureError),

    #[error("type error: {0}")]
    Type(#[from] TypeError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database lock poisoned")]
    LockPoisoned,
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Abort on a broken storage invariant.
///
/// These are never returned as errors: the state they describe cannot be
/// produced by any sequence of valid operations.
#[track_caller]
pub(crate) fn integrity_fault(detail: std::fmt::Arguments<'_>) -> ! {
    tracing::error!(%detail, "integrity fault");
    panic!("integrity fault: {detail}")
}
