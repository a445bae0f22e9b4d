//! Content-addressed block storage for Quire.
//!
//! Every tree node, record value and commit is an immutable block identified
//! by the BLAKE3 hash of its bytes. This crate provides the storage contract
//! and the layering used by the commit pipeline.
//!
//! # Storage Backends
//!
//! All backends implement the [`BlockStore`] trait:
//!
//! - [`MemoryBlockStore`] -- `HashMap`-based store, also the transient overlay
//! - [`OverlayBlockStore`] -- reads fall through an upper store to a lower
//!   one; writes only ever land in the upper store
//!
//! # Design Rules
//!
//! 1. Blocks are immutable once written (content-addressing guarantees this).
//! 2. Nothing written through an overlay reaches the lower store; persisting
//!    the net result is the caller's job.
//! 3. The store never interprets block contents.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod codec;
pub mod error;
pub mod memory;
pub mod overlay;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryBlockStore;
pub use overlay::OverlayBlockStore;
pub use traits::BlockStore;
