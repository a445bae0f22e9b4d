//! The write pipeline.
//!
//! [`apply_writes`] turns a batch of operations into one signed commit and
//! one replication event. Tree edits run against an overlay on top of the
//! persisted node table, so intermediate nodes never reach the database;
//! only the net node diff between the old and new roots is written. The
//! caller supplies the transaction, and every step below either completes
//! inside it or returns an error that rolls it back.

use std::collections::BTreeMap;

use rusqlite::Connection;
use tracing::{debug, info};

use quire_crypto::{ContentHasher, SigningKey};
use quire_mst::{mst_diff, record_diff, Mst, RecordDelta};
use quire_store::{codec, BlockStore, MemoryBlockStore, OverlayBlockStore};
use quire_types::{ObjectId, TidClock};

use crate::blob::BlobTracker;
use crate::block_store::DbBlockStore;
use crate::commit::UnsignedCommit;
use crate::error::{integrity_fault, RepoError, RepoResult};
use crate::event::{self, CommitEvent, RepoAction, RepoOp};
use crate::firehose::{self, FirehoseEvent};
use crate::ops::{ApplyWritesOutput, CommitRef, WriteOp, WriteResult};
use crate::record;
use crate::user::{self, RepoHead};

/// Create a repository with an empty tree and a signed genesis commit.
///
/// Genesis is not replicated, so the first batch applied to any repository
/// is the first event that mentions it.
pub fn create_repo(
    conn: &Connection,
    clock: &TidClock,
    did: &str,
    key: &SigningKey,
) -> RepoResult<RepoHead> {
    if user::exists(conn, did)? {
        return Err(RepoError::RepoExists(did.to_string()));
    }
    let nodes = MemoryBlockStore::new();
    let root = Mst::new(&nodes).create_empty()?;
    let rev = clock.next();
    let commit = UnsignedCommit::new(did, root, rev).sign(key)?;
    let commit_bytes = commit.encode()?;
    let commit_id = ContentHasher::BLOCK.hash(&commit_bytes);

    let repo = user::insert(conn, did, &commit_bytes, &commit_id, &rev, key)?;
    DbBlockStore::new(conn, repo).insert_node(&root, &nodes.get_required(&root)?, &rev)?;

    info!(did, rev = %rev, commit = %commit_id.short_hex(), "repository created");
    Ok(RepoHead {
        did: did.to_string(),
        commit: commit_id,
        rev,
        root,
    })
}

/// Apply a write batch to `did` within the caller's transaction.
///
/// Returns the API result and the persisted replication event.
pub fn apply_writes(
    conn: &Connection,
    clock: &TidClock,
    did: &str,
    writes: &[WriteOp],
) -> RepoResult<(ApplyWritesOutput, FirehoseEvent)> {
    let repo = user::load(conn, did)?;
    let store = OverlayBlockStore::new(MemoryBlockStore::new(), DbBlockStore::new(conn, repo.id));
    let mst = Mst::new(&store);
    let rev = clock.next_after(&repo.commit.rev);

    // Tree edits, one running root per op.
    let prior_root = repo.commit.data;
    let mut root = prior_root;
    let mut staged: BTreeMap<ObjectId, Vec<u8>> = BTreeMap::new();
    let mut results = Vec::with_capacity(writes.len());
    for op in writes {
        root = match op {
            WriteOp::Create {
                collection,
                rkey,
                value,
                ..
            } => {
                let rkey = rkey.clone().unwrap_or_else(|| clock.next().to_string());
                let path = format!("{collection}/{rkey}");
                if mst.get(&root, &path)?.is_some() {
                    return Err(RepoError::AlreadyExists(path));
                }
                let (cid, next) = stage_value(&mst, &mut staged, &root, &path, value)?;
                results.push(WriteResult::created(did, &path, cid));
                next
            }
            WriteOp::Update {
                collection,
                rkey,
                value,
                ..
            } => {
                let path = format!("{collection}/{rkey}");
                let (cid, next) = stage_value(&mst, &mut staged, &root, &path, value)?;
                results.push(WriteResult::updated(did, &path, cid));
                next
            }
            WriteOp::Delete { collection, rkey } => {
                let path = format!("{collection}/{rkey}");
                let next = mst.delete(&root, &path)?;
                if next == root {
                    return Err(RepoError::NotFound(path));
                }
                debug!(did, path = %path, "record deleted");
                results.push(WriteResult::Delete);
                next
            }
        };
    }
    info!(did, from = %prior_root.short_hex(), to = %root.short_hex(), "mst root transition");

    // Node diff and the record changes it implies. Both read nodes that the
    // persist step below removes, so they run first.
    let diff = mst_diff(&store, &prior_root, &root)?;
    let deltas = record_diff(&store, &diff)?;

    let blobs = BlobTracker::new(conn, repo.id);
    let mut ops = Vec::with_capacity(deltas.len());
    let mut new_values = Vec::new();
    let mut released = Vec::new();
    for delta in &deltas {
        match delta {
            RecordDelta::Created { key, value } => {
                let bytes = staged_value(&staged, value);
                blobs.increment_all(bytes, &rev)?;
                record::insert(conn, repo.id, key, value, &rev, bytes)?;
                ops.push(RepoOp {
                    action: RepoAction::Create,
                    path: key.clone(),
                    cid: Some(*value),
                });
                new_values.push(*value);
            }
            RecordDelta::Updated { key, later, .. } => {
                let bytes = staged_value(&staged, later);
                blobs.increment_all(bytes, &rev)?;
                released.push(stored_value(conn, repo.id, key)?);
                record::update(conn, repo.id, key, later, &rev, bytes)?;
                ops.push(RepoOp {
                    action: RepoAction::Update,
                    path: key.clone(),
                    cid: Some(*later),
                });
                new_values.push(*later);
            }
            RecordDelta::Deleted { key, .. } => {
                released.push(stored_value(conn, repo.id, key)?);
                record::delete(conn, repo.id, key)?;
                ops.push(RepoOp {
                    action: RepoAction::Delete,
                    path: key.clone(),
                    cid: None,
                });
            }
        }
    }
    // Decrements run after every increment, so a blob that stays referenced
    // (by the same record or a different one) never passes through zero.
    for prior in &released {
        blobs.decrement_all(prior)?;
    }

    store.lower().persist_diff(&store, &diff, &rev)?;

    // Sign and install the new commit.
    let commit = UnsignedCommit::new(did, root, rev).sign(&repo.signing_key)?;
    let commit_bytes = commit.encode()?;
    let commit_id = ContentHasher::BLOCK.hash(&commit_bytes);
    user::update_head(conn, repo.id, &commit_bytes, &commit_id, &rev)?;

    // Proof bundle and replication event.
    let node_blocks = diff
        .created
        .iter()
        .map(|id| -> RepoResult<(ObjectId, Vec<u8>)> { Ok((*id, store.get_required(id)?)) })
        .collect::<RepoResult<Vec<_>>>()?;
    let blocks = event::build_proof(
        (commit_id, commit_bytes.as_slice()),
        node_blocks.iter().map(|(id, bytes)| (*id, bytes.as_slice())),
        new_values
            .iter()
            .map(|id| (*id, staged_value(&staged, id))),
    )?;

    let seq = firehose::next_seq(conn)?;
    let body = CommitEvent {
        ops,
        seq,
        rev,
        since: repo.commit.rev,
        prev: None,
        repo: did.to_string(),
        time: event::event_time(chrono::Utc::now()),
        blobs: Vec::new(),
        blocks,
        commit: commit_id,
        rebase: false,
        too_big: false,
    };
    let stored = firehose::append(conn, seq, event::encode_commit_event(&body)?)?;

    info!(
        did,
        seq,
        rev = %rev,
        commit = %commit_id.short_hex(),
        ops = body.ops.len(),
        "commit applied"
    );
    let output = ApplyWritesOutput {
        commit: CommitRef {
            cid: commit_id,
            rev,
        },
        results,
    };
    Ok((output, stored))
}

/// Encode a record value, keep its bytes, and point `path` at it.
fn stage_value(
    mst: &Mst<'_>,
    staged: &mut BTreeMap<ObjectId, Vec<u8>>,
    root: &ObjectId,
    path: &str,
    value: &serde_json::Value,
) -> RepoResult<(ObjectId, ObjectId)> {
    let bytes = codec::encode(value)?;
    let cid = ContentHasher::BLOCK.hash(&bytes);
    let next = mst.put(root, path, cid)?;
    staged.insert(cid, bytes);
    debug!(path, cid = %cid.short_hex(), "record staged");
    Ok((cid, next))
}

/// Bytes of a value written in this batch.
fn staged_value<'a>(staged: &'a BTreeMap<ObjectId, Vec<u8>>, cid: &ObjectId) -> &'a [u8] {
    match staged.get(cid) {
        Some(bytes) => bytes.as_slice(),
        None => integrity_fault(format_args!("new tree value {cid} was not staged")),
    }
}

/// Bytes of a record as stored before this batch.
fn stored_value(conn: &Connection, repo: i64, path: &str) -> RepoResult<Vec<u8>> {
    match record::value_bytes(conn, repo, path)? {
        Some(bytes) => Ok(bytes),
        None => integrity_fault(format_args!("tree entry {path} has no record row")),
    }
}
