//! Foundation types for Quire.
//!
//! Every other Quire crate depends on `quire-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`] -- Content identifier (BLAKE3 hash) naming an immutable block
//! - [`Tid`] -- Sortable revision token used for commit revisions and record keys
//! - [`TidClock`] -- Monotonic generator of [`Tid`] values

pub mod error;
pub mod object;
pub mod tid;

pub use error::TypeError;
pub use object::ObjectId;
pub use tid::{Tid, TidClock};
