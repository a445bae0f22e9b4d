//! Replication event assembly.
//!
//! A commit event on the wire is two DAG-CBOR maps back to back: the fixed
//! header `{t: "#commit", op: 1}` and the body. The body carries a proof
//! bundle holding the new commit, every created tree node and every new
//! record value, so a subscriber can check the transition on its own.

use serde::{Deserialize, Serialize};

use quire_car::CarWriter;
use quire_store::codec;
use quire_types::{ObjectId, Tid};

use crate::error::{RepoError, RepoResult};

/// Message header preceding every event body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHeader {
    pub t: String,
    pub op: i64,
}

impl EventHeader {
    pub fn commit() -> Self {
        Self {
            t: "#commit".to_string(),
            op: 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoAction {
    Create,
    Update,
    Delete,
}

/// One record-level change carried by an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoOp {
    pub action: RepoAction,
    pub path: String,
    /// New value id; null for deletes.
    pub cid: Option<ObjectId>,
}

/// Body of a `#commit` event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitEvent {
    pub ops: Vec<RepoOp>,
    pub seq: i64,
    pub rev: Tid,
    /// Revision of the previous commit.
    pub since: Tid,
    pub prev: Option<ObjectId>,
    pub repo: String,
    pub time: String,
    /// Always empty; blobs are not replicated through events.
    pub blobs: Vec<ObjectId>,
    #[serde(with = "serde_bytes")]
    pub blocks: Vec<u8>,
    pub commit: ObjectId,
    pub rebase: bool,
    pub too_big: bool,
}

/// Proof bundle rooted at the commit.
///
/// Blocks go in as commit, then tree nodes, then record values.
pub fn build_proof<'a>(
    commit: (ObjectId, &[u8]),
    nodes: impl IntoIterator<Item = (ObjectId, &'a [u8])>,
    records: impl IntoIterator<Item = (ObjectId, &'a [u8])>,
) -> RepoResult<Vec<u8>> {
    let (commit_id, commit_bytes) = commit;
    let mut car = CarWriter::new(commit_id);
    car.write_block(commit_id, commit_bytes);
    for (id, bytes) in nodes.into_iter().chain(records) {
        car.write_block(id, bytes);
    }
    Ok(car.finish()?)
}

/// Encode header and body into a wire message.
pub fn encode_commit_event(event: &CommitEvent) -> RepoResult<Vec<u8>> {
    let mut msg = codec::encode(&EventHeader::commit())?;
    msg.extend_from_slice(&codec::encode(event)?);
    Ok(msg)
}

/// Split a wire message and decode its commit body.
pub fn decode_commit_event(msg: &[u8]) -> RepoResult<CommitEvent> {
    let header = codec::encode(&EventHeader::commit())?;
    let body = msg
        .strip_prefix(header.as_slice())
        .ok_or_else(|| RepoError::Corrupt("message does not start with a #commit header".into()))?;
    Ok(codec::decode(body)?)
}

/// Event timestamp: RFC 3339, UTC, millisecond precision.
pub fn event_time(now: chrono::DateTime<chrono::Utc>) -> String {
    now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
