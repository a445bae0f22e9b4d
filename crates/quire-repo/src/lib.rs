//! Repository commit engine for Quire.
//!
//! Each repository is a signed chain of commits over a Merkle Search Tree of
//! records. A write batch is applied in one SQLite transaction that edits the
//! tree, persists the node and record changes, adjusts blob reference counts,
//! signs a new commit and appends a replication event carrying a
//! self-contained proof of the change. Either all of that becomes visible or
//! none of it does.
//!
//! # Key Types
//!
//! - [`RepoEngine`] -- repository lifecycle, write batches, reads, firehose
//! - [`WriteOp`] / [`ApplyWritesOutput`] -- batch input and result
//! - [`Commit`] -- signed commit object
//! - [`CommitEvent`] -- replication event body
//! - [`BlobTracker`] -- per-repository blob reference counts
//! - [`RepoConfig`] -- engine configuration

pub mod blob;
pub mod block_store;
pub mod commit;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod event;
pub mod firehose;
pub mod ops;
pub mod pipeline;
pub mod record;
pub mod user;

pub use blob::{blob_refs, BlobTracker};
pub use block_store::DbBlockStore;
pub use commit::{Commit, UnsignedCommit};
pub use config::{RepoConfig, COMMIT_VERSION, DB_VERSION};
pub use db::Database;
pub use engine::RepoEngine;
pub use error::{RepoError, RepoResult};
pub use event::{decode_commit_event, encode_commit_event, CommitEvent, EventHeader, RepoAction, RepoOp};
pub use firehose::{EventStream, Firehose, FirehoseEvent};
pub use ops::{ApplyWritesOutput, CommitRef, ValidationStatus, WriteOp, WriteResult};
pub use record::RecordEntry;
pub use user::RepoHead;
