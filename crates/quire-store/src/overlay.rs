use quire_types::ObjectId;

use crate::error::StoreResult;
use crate::traits::BlockStore;

/// Two-layer block store: a transient upper layer over a backing lower layer.
///
/// Reads check the upper layer first and fall through to the lower one.
/// Writes only ever land in the upper layer, so every intermediate block a
/// write batch produces stays out of the backing store. Dropping the overlay
/// discards them.
pub struct OverlayBlockStore<U, L> {
    upper: U,
    lower: L,
}

impl<U: BlockStore, L: BlockStore> OverlayBlockStore<U, L> {
    /// Layer `upper` over `lower`.
    pub fn new(upper: U, lower: L) -> Self {
        Self { upper, lower }
    }

    /// The transient layer.
    pub fn upper(&self) -> &U {
        &self.upper
    }

    /// The backing layer.
    pub fn lower(&self) -> &L {
        &self.lower
    }
}

impl<U: BlockStore, L: BlockStore> BlockStore for OverlayBlockStore<U, L> {
    fn get(&self, id: &ObjectId) -> StoreResult<Option<Vec<u8>>> {
        match self.upper.get(id)? {
            Some(bytes) => Ok(Some(bytes)),
            None => self.lower.get(id),
        }
    }

    fn put(&self, id: ObjectId, bytes: Vec<u8>) -> StoreResult<()> {
        self.upper.put(id, bytes)
    }
}

impl<U, L> std::fmt::Debug for OverlayBlockStore<U, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayBlockStore").finish_non_exhaustive()
    }
}
