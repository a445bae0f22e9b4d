//! Merkle Search Tree engine for Quire.
//!
//! A repository's records live in an MST: a search tree whose nodes are
//! immutable, content-addressed blocks. The position of every key is a pure
//! function of the key itself, so the same key/value set always produces the
//! same root regardless of insertion order, and an edit only changes the
//! nodes on the path to the root.
//!
//! # Key Types
//!
//! - [`Mst`] -- put / delete / get / walk against a [`quire_store::BlockStore`]
//! - [`MstDiff`] -- node-level difference between two roots
//! - [`RecordDelta`] -- per-key difference derived from an [`MstDiff`]

pub mod diff;
pub mod error;
pub mod key;
pub mod node;
pub mod tree;

pub use diff::{mst_diff, record_diff, MstDiff, RecordDelta};
pub use error::{MstError, MstResult};
pub use key::{key_height, validate_key};
pub use node::{Leaf, Node};
pub use tree::Mst;
