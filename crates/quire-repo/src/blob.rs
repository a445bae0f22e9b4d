//! Blob reference counting.
//!
//! A blob row is created by upload with a count of zero. Records that embed
//! a blob link raise its count; when the last referencing record goes away
//! the count returns to zero and the row and its stored chunks are purged in
//! the same transaction.

use std::collections::BTreeSet;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::debug;

use quire_crypto::ContentHasher;
use quire_store::codec;
use quire_types::{ObjectId, Tid};

use crate::error::{integrity_fault, RepoError, RepoResult};

/// Blob ids linked from a record value, each listed once.
///
/// A link is any object of the form
/// `{"$type": "blob", "ref": {"$link": "<hex id>"}, ...}` at any depth.
pub fn blob_refs(value: &Value) -> RepoResult<BTreeSet<ObjectId>> {
    let mut refs = BTreeSet::new();
    collect_refs(value, &mut refs)?;
    Ok(refs)
}

fn collect_refs(value: &Value, refs: &mut BTreeSet<ObjectId>) -> RepoResult<()> {
    match value {
        Value::Object(map) => {
            if map.get("$type").and_then(Value::as_str) == Some("blob") {
                let link = map
                    .get("ref")
                    .and_then(|r| r.get("$link"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| RepoError::InvalidOperation("blob without a ref link".into()))?;
                let id = ObjectId::from_hex(link).map_err(|e| {
                    RepoError::InvalidOperation(format!("bad blob link {link:?}: {e}"))
                })?;
                refs.insert(id);
                return Ok(());
            }
            for item in map.values() {
                collect_refs(item, refs)?;
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_refs(item, refs)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Reference counts for one repository's blobs.
pub struct BlobTracker<'a> {
    conn: &'a Connection,
    repo: i64,
}

impl<'a> BlobTracker<'a> {
    pub fn new(conn: &'a Connection, repo: i64) -> Self {
        Self { conn, repo }
    }

    /// Add one reference, stamping `rev` as the first-referenced revision if unset.
    pub fn increment(&self, id: &ObjectId, rev: &Tid) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE blob SET refcount = refcount + 1, since = IFNULL(since, ?1) \
             WHERE repo = ?2 AND cid = ?3",
            params![rev.to_string(), self.repo, &id.as_bytes()[..]],
        )?;
        match changed {
            1 => {
                debug!(repo = self.repo, blob = %id.short_hex(), "blob incref");
                Ok(())
            }
            0 => Err(RepoError::DanglingBlobReference(*id)),
            n => integrity_fault(format_args!("incref of blob {id} matched {n} rows")),
        }
    }

    /// Drop one reference, purging the blob when none remain.
    pub fn decrement(&self, id: &ObjectId) -> RepoResult<()> {
        let rows = {
            let mut stmt = self.conn.prepare_cached(
                "UPDATE blob SET refcount = refcount - 1 WHERE repo = ?1 AND cid = ?2 \
                 RETURNING id, refcount",
            )?;
            let rows = stmt
                .query_map(params![self.repo, &id.as_bytes()[..]], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let (blob_row, refcount) = match rows.as_slice() {
            [one] => *one,
            [] => integrity_fault(format_args!("decref of unknown blob {id}")),
            many => integrity_fault(format_args!("decref of blob {id} matched {} rows", many.len())),
        };
        if refcount < 0 {
            integrity_fault(format_args!("blob {id} refcount fell to {refcount}"));
        }
        debug!(repo = self.repo, blob = %id.short_hex(), refcount, "blob decref");

        if refcount == 0 {
            self.conn
                .execute("DELETE FROM blob_part WHERE blob = ?1", [blob_row])?;
            self.conn.execute("DELETE FROM blob WHERE id = ?1", [blob_row])?;
            debug!(repo = self.repo, blob = %id.short_hex(), "blob purged");
        }
        Ok(())
    }

    /// Increment every blob linked from an encoded record value.
    pub fn increment_all(&self, record: &[u8], rev: &Tid) -> RepoResult<()> {
        for id in blob_refs(&codec::decode(record)?)? {
            self.increment(&id, rev)?;
        }
        Ok(())
    }

    /// Decrement every blob linked from an encoded record value.
    pub fn decrement_all(&self, record: &[u8]) -> RepoResult<()> {
        for id in blob_refs(&codec::decode(record)?)? {
            self.decrement(&id)?;
        }
        Ok(())
    }

    /// Store blob content split into `part_size` chunks, with no references.
    ///
    /// Uploading content that is already stored is a no-op.
    pub fn insert(&self, bytes: &[u8], part_size: usize) -> RepoResult<ObjectId> {
        let id = ContentHasher::BLOB.hash(bytes);
        let inserted = self.conn.execute(
            "INSERT INTO blob (repo, cid, refcount, since) VALUES (?1, ?2, 0, NULL) \
             ON CONFLICT (repo, cid) DO NOTHING",
            params![self.repo, &id.as_bytes()[..]],
        )?;
        if inserted == 0 {
            return Ok(id);
        }
        let blob_row = self.conn.last_insert_rowid();
        let mut stmt = self
            .conn
            .prepare_cached("INSERT INTO blob_part (blob, idx, data) VALUES (?1, ?2, ?3)")?;
        for (idx, chunk) in bytes.chunks(part_size).enumerate() {
            stmt.execute(params![blob_row, idx as i64, chunk])?;
        }
        debug!(repo = self.repo, blob = %id.short_hex(), size = bytes.len(), "blob stored");
        Ok(id)
    }

    /// Current reference count, or `None` if no such blob is stored.
    pub fn refcount(&self, id: &ObjectId) -> RepoResult<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT refcount FROM blob WHERE repo = ?1 AND cid = ?2",
                params![self.repo, &id.as_bytes()[..]],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Reassemble stored blob content.
    pub fn read(&self, id: &ObjectId) -> RepoResult<Option<Vec<u8>>> {
        let blob_row: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM blob WHERE repo = ?1 AND cid = ?2",
                params![self.repo, &id.as_bytes()[..]],
                |row| row.get(0),
            )
            .optional()?;
        let Some(blob_row) = blob_row else {
            return Ok(None);
        };
        let mut stmt = self
            .conn
            .prepare_cached("SELECT data FROM blob_part WHERE blob = ?1 ORDER BY idx")?;
        let mut content = Vec::new();
        for part in stmt.query_map([blob_row], |row| row.get::<_, Vec<u8>>(0))? {
            content.extend_from_slice(&part?);
        }
        Ok(Some(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::db::Database;
    use crate::testutil;

    fn link(id: &ObjectId) -> Value {
        json!({"$type": "blob", "ref": {"$link": id.to_string()}, "mimeType": "image/png", "size": 3})
    }

    fn parts(db: &Database) -> i64 {
        db.read(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM blob_part", [], |r| r.get(0))?))
            .unwrap()
    }

    // ---------------------------------------------------------------
    // Reference extraction
    // ---------------------------------------------------------------

    #[test]
    fn refs_found_at_any_depth() {
        let a = ObjectId::from_bytes(b"a");
        let b = ObjectId::from_bytes(b"b");
        let value = json!({
            "text": "hi",
            "embed": {"images": [{"alt": "", "image": link(&a)}, {"image": link(&b)}]},
            "avatar": link(&a),
        });
        assert_eq!(blob_refs(&value).unwrap(), BTreeSet::from([a, b]));
    }

    #[test]
    fn plain_values_have_no_refs() {
        assert!(blob_refs(&json!({"x": 1, "list": [1, "two", null]})).unwrap().is_empty());
    }

    #[test]
    fn malformed_link_is_invalid() {
        let value = json!({"$type": "blob", "ref": {"$link": "zz"}});
        assert!(matches!(blob_refs(&value), Err(RepoError::InvalidOperation(_))));
        let value = json!({"$type": "blob"});
        assert!(matches!(blob_refs(&value), Err(RepoError::InvalidOperation(_))));
    }

    // ---------------------------------------------------------------
    // Counting
    // ---------------------------------------------------------------

    #[test]
    fn upload_then_count() {
        let (db, _) = testutil::db_with_repo("did:example:alice");
        db.transaction(|tx| {
            let blobs = BlobTracker::new(tx, 1);
            let id = blobs.insert(b"pixels", 4)?;
            assert_eq!(id, ContentHasher::BLOB.hash(b"pixels"));
            assert_eq!(blobs.refcount(&id)?, Some(0));
            assert_eq!(blobs.read(&id)?.unwrap(), b"pixels");

            blobs.increment(&id, &Tid::from_parts(5, 0))?;
            blobs.increment(&id, &Tid::from_parts(9, 0))?;
            assert_eq!(blobs.refcount(&id)?, Some(2));
            let since: String = tx.query_row("SELECT since FROM blob", [], |r| r.get(0))?;
            assert_eq!(since, Tid::from_parts(5, 0).to_string());
            Ok(())
        })
        .unwrap();
        assert_eq!(parts(&db), 2);
    }

    #[test]
    fn upload_is_idempotent() {
        let (db, _) = testutil::db_with_repo("did:example:alice");
        db.transaction(|tx| {
            let blobs = BlobTracker::new(tx, 1);
            let a = blobs.insert(b"same", 2)?;
            let b = blobs.insert(b"same", 2)?;
            assert_eq!(a, b);
            Ok(())
        })
        .unwrap();
        assert_eq!(parts(&db), 2);
    }

    #[test]
    fn increment_unknown_blob_is_dangling() {
        let (db, _) = testutil::db_with_repo("did:example:alice");
        let missing = ObjectId::from_bytes(b"never uploaded");
        let result = db.transaction(|tx| BlobTracker::new(tx, 1).increment(&missing, &Tid::from_parts(1, 0)));
        assert!(matches!(result, Err(RepoError::DanglingBlobReference(id)) if id == missing));
    }

    #[test]
    fn last_decrement_purges_blob_and_parts() {
        let (db, _) = testutil::db_with_repo("did:example:alice");
        db.transaction(|tx| {
            let blobs = BlobTracker::new(tx, 1);
            let id = blobs.insert(b"0123456789", 3)?;
            blobs.increment(&id, &Tid::from_parts(1, 0))?;
            blobs.increment(&id, &Tid::from_parts(2, 0))?;
            blobs.decrement(&id)?;
            assert_eq!(blobs.refcount(&id)?, Some(1));
            blobs.decrement(&id)?;
            assert_eq!(blobs.refcount(&id)?, None);
            assert_eq!(blobs.read(&id)?, None);
            Ok(())
        })
        .unwrap();
        assert_eq!(parts(&db), 0);
    }

    #[test]
    fn record_level_counting_is_once_per_blob() {
        let (db, _) = testutil::db_with_repo("did:example:alice");
        db.transaction(|tx| {
            let blobs = BlobTracker::new(tx, 1);
            let id = blobs.insert(b"img", 64)?;
            let record = codec::encode(&json!({"a": link(&id), "b": [link(&id)]}))?;
            blobs.increment_all(&record, &Tid::from_parts(1, 0))?;
            assert_eq!(blobs.refcount(&id)?, Some(1));
            blobs.decrement_all(&record)?;
            assert_eq!(blobs.refcount(&id)?, None);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    #[should_panic(expected = "integrity fault")]
    fn decrement_of_unknown_blob_panics() {
        let (db, _) = testutil::db_with_repo("did:example:alice");
        let _ = db.transaction(|tx| BlobTracker::new(tx, 1).decrement(&ObjectId::from_bytes(b"ghost")));
    }

    #[test]
    #[should_panic(expected = "integrity fault")]
    fn decrement_below_zero_panics() {
        let (db, _) = testutil::db_with_repo("did:example:alice");
        let _ = db.transaction(|tx| {
            let blobs = BlobTracker::new(tx, 1);
            let id = blobs.insert(b"unreferenced", 64)?;
            blobs.decrement(&id)
        });
    }
}
