use thiserror::Error;
use quire_store::StoreError;
use quire_types::ObjectId;

#[derive(Debug, Error)]
pub enum CarError {
    #[error("unsupported container version: {0}")]
    UnsupportedVersion(u64),

    #[error("corrupt container at offset {offset}: {reason}")]
    CorruptEntry { offset: usize, reason: String },

    #[error("block {id} does not match its content")]
    BlockHashMismatch { id: ObjectId },

    #[error("container header has no root")]
    MissingRoot,

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type CarResult<T> = Result<T, CarError>;
