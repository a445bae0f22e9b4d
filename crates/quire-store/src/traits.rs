use quire_crypto::ContentHasher;
use quire_types::ObjectId;

use crate::error::{StoreError, StoreResult};

/// Content-addressed block store.
///
/// All implementations must satisfy these invariants:
/// - Blocks are immutable once written: the same bytes always map to the
///   same ID, so re-writing a block is a no-op.
/// - The store never interprets block contents.
/// - All I/O errors are propagated, never silently ignored.
///
/// Methods take `&self`; implementations use interior mutability so a store
/// can be shared by reference between the tree engine and the pipeline.
pub trait BlockStore {
    /// Read a block by ID.
    ///
    /// Returns `Ok(None)` if the block does not exist.
    fn get(&self, id: &ObjectId) -> StoreResult<Option<Vec<u8>>>;

    /// Write a block under an already computed ID.
    fn put(&self, id: ObjectId, bytes: Vec<u8>) -> StoreResult<()>;

    /// Check whether a block exists.
    fn contains(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.get(id)?.is_some())
    }

    /// Read a block that must exist.
    fn get_required(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        self.get(id)?.ok_or(StoreError::NotFound(*id))
    }

    /// Hash an encoded block, write it, and return its ID.
    fn put_block(&self, bytes: Vec<u8>) -> StoreResult<ObjectId> {
        let id = ContentHasher::BLOCK.hash(&bytes);
        self.put(id, bytes)?;
        Ok(id)
    }
}

impl<S: BlockStore + ?Sized> BlockStore for &S {
    fn get(&self, id: &ObjectId) -> StoreResult<Option<Vec<u8>>> {
        (**self).get(id)
    }

    fn put(&self, id: ObjectId, bytes: Vec<u8>) -> StoreResult<()> {
        (**self).put(id, bytes)
    }
}
