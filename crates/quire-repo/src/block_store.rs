use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use quire_mst::MstDiff;
use quire_store::{BlockStore, StoreError, StoreResult};
use quire_types::{ObjectId, Tid};

use crate::error::RepoResult;

/// Read-only view of one repository's persisted tree nodes.
///
/// This is the backing layer under a write batch's overlay. Tree writes
/// never reach it through [`BlockStore::put`]; the net node set is persisted
/// once per batch by [`persist_diff`](Self::persist_diff).
pub struct DbBlockStore<'a> {
    conn: &'a Connection,
    repo: i64,
}

impl<'a> DbBlockStore<'a> {
    pub fn new(conn: &'a Connection, repo: i64) -> Self {
        Self { conn, repo }
    }

    /// Store one node row.
    pub fn insert_node(&self, id: &ObjectId, bytes: &[u8], since: &Tid) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO mst (repo, cid, since, value) VALUES (?1, ?2, ?3, ?4)",
            params![self.repo, &id.as_bytes()[..], since.to_string(), bytes],
        )?;
        Ok(())
    }

    /// Apply a node diff: drop dead nodes, then insert created ones read from `source`.
    pub fn persist_diff(
        &self,
        source: &dyn BlockStore,
        diff: &MstDiff,
        since: &Tid,
    ) -> RepoResult<()> {
        let mut delete = self
            .conn
            .prepare_cached("DELETE FROM mst WHERE repo = ?1 AND cid = ?2")?;
        for id in &diff.deleted {
            delete.execute(params![self.repo, &id.as_bytes()[..]])?;
        }
        for id in &diff.created {
            let bytes = source.get_required(id)?;
            self.insert_node(id, &bytes, since)?;
        }
        debug!(
            repo = self.repo,
            created = diff.created.len(),
            deleted = diff.deleted.len(),
            "tree nodes persisted"
        );
        Ok(())
    }

    /// Number of node rows held for this repository.
    pub fn node_count(&self) -> RepoResult<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM mst WHERE repo = ?1",
            [self.repo],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

impl BlockStore for DbBlockStore<'_> {
    fn get(&self, id: &ObjectId) -> StoreResult<Option<Vec<u8>>> {
        self.conn
            .query_row(
                "SELECT value FROM mst WHERE repo = ?1 AND cid = ?2",
                params![self.repo, &id.as_bytes()[..]],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn put(&self, _id: ObjectId, _bytes: Vec<u8>) -> StoreResult<()> {
        Err(StoreError::ReadOnly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_mst::{mst_diff, Mst};
    use quire_store::{MemoryBlockStore, OverlayBlockStore};

    use crate::testutil;

    #[test]
    fn reads_persisted_nodes_and_refuses_writes() {
        let (db, _engine_repo) = testutil::db_with_repo("did:example:alice");
        db.read(|conn| {
            let store = DbBlockStore::new(conn, 1);
            assert_eq!(store.node_count()?, 1);
            let empty = Mst::new(&MemoryBlockStore::new()).create_empty()?;
            assert!(store.contains(&empty)?);
            assert!(matches!(
                store.put_block(b"x".to_vec()),
                Err(StoreError::ReadOnly)
            ));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn other_repositories_are_invisible() {
        let (db, _) = testutil::db_with_repo("did:example:alice");
        db.read(|conn| {
            let store = DbBlockStore::new(conn, 42);
            assert_eq!(store.node_count()?, 0);
            let empty = Mst::new(&MemoryBlockStore::new()).create_empty()?;
            assert!(!store.contains(&empty)?);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn persist_diff_replaces_the_node_set() {
        let (db, _) = testutil::db_with_repo("did:example:alice");
        db.transaction(|tx| {
            let lower = DbBlockStore::new(tx, 1);
            let overlay = OverlayBlockStore::new(MemoryBlockStore::new(), DbBlockStore::new(tx, 1));
            let mst = Mst::new(&overlay);
            let old = mst.create_empty()?;
            let mut root = old;
            for i in 0u8..40 {
                root = mst.put(&root, &format!("app.test/{i}"), ObjectId::from_bytes(&[i]))?;
            }
            let diff = mst_diff(&overlay, &old, &root)?;
            lower.persist_diff(&overlay, &diff, &Tid::from_parts(1, 0))?;

            assert_eq!(lower.node_count()?, diff.created.len());
            assert!(!lower.contains(&old)?);
            // the tree is now readable without the overlay
            let persisted = Mst::new(&lower).entries(&root)?;
            assert_eq!(persisted.len(), 40);
            Ok(())
        })
        .unwrap();
    }
}
