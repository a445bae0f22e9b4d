use std::collections::HashMap;
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard};

use quire_types::ObjectId;

use crate::error::StoreResult;
use crate::traits::BlockStore;

/// Blocks held in process memory.
///
/// This is the scratch layer of a write batch: tree nodes produced while
/// the batch runs land here and are discarded with it.
#[derive(Default)]
pub struct MemoryBlockStore {
    blocks: RwLock<HashMap<ObjectId, Vec<u8>>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    // Blocks never change once written, so a poisoned lock still guards
    // consistent data.
    fn snapshot(&self) -> RwLockReadGuard<'_, HashMap<ObjectId, Vec<u8>>> {
        self.blocks.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl BlockStore for MemoryBlockStore {
    fn get(&self, id: &ObjectId) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.snapshot().get(id).cloned())
    }

    fn put(&self, id: ObjectId, bytes: Vec<u8>) -> StoreResult<()> {
        self.blocks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(id)
            .or_insert(bytes);
        Ok(())
    }
}

impl fmt::Debug for MemoryBlockStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBlockStore")
            .field("blocks", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use quire_crypto::ContentHasher;

    #[test]
    fn blocks_are_named_by_their_content() {
        let store = MemoryBlockStore::new();
        let id = store.put_block(b"\xa0".to_vec()).unwrap();
        assert_eq!(id, ContentHasher::BLOCK.hash(b"\xa0"));
        assert_eq!(store.get(&id).unwrap().as_deref(), Some(&b"\xa0"[..]));
    }

    #[test]
    fn rewriting_a_block_keeps_one_copy() {
        let store = MemoryBlockStore::new();
        let a = store.put_block(b"node".to_vec()).unwrap();
        let b = store.put_block(b"node".to_vec()).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn absent_blocks() {
        let store = MemoryBlockStore::new();
        let id = ObjectId::from_bytes(b"never written");
        assert!(store.is_empty());
        assert_eq!(store.get(&id).unwrap(), None);
        assert!(!store.contains(&id).unwrap());
        assert!(matches!(
            store.get_required(&id),
            Err(StoreError::NotFound(missing)) if missing == id
        ));
    }

    #[test]
    fn usable_as_a_trait_object_reference() {
        let store = MemoryBlockStore::new();
        let shared: &dyn BlockStore = &store;
        let id = (&shared).put_block(b"shared".to_vec()).unwrap();
        assert!(store.contains(&id).unwrap());
        assert!(format!("{store:?}").contains("blocks: 1"));
    }
}
