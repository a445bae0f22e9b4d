//! The `record` table: current value of every path in a repository.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::Value;

use quire_store::codec;
use quire_types::{ObjectId, Tid};

use crate::db;
use crate::error::RepoResult;

/// A stored record, decoded for reading.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecordEntry {
    pub path: String,
    pub cid: ObjectId,
    /// Revision at which the record last changed.
    pub since: Tid,
    pub value: Value,
}

pub(crate) fn insert(
    conn: &Connection,
    repo: i64,
    path: &str,
    cid: &ObjectId,
    since: &Tid,
    value: &[u8],
) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO record (repo, path, cid, since, value) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![repo, path, &cid.as_bytes()[..], since.to_string(), value],
    )?;
    Ok(())
}

pub(crate) fn update(
    conn: &Connection,
    repo: i64,
    path: &str,
    cid: &ObjectId,
    since: &Tid,
    value: &[u8],
) -> RepoResult<()> {
    conn.execute(
        "UPDATE record SET cid = ?1, since = ?2, value = ?3 WHERE repo = ?4 AND path = ?5",
        params![&cid.as_bytes()[..], since.to_string(), value, repo, path],
    )?;
    Ok(())
}

pub(crate) fn delete(conn: &Connection, repo: i64, path: &str) -> RepoResult<()> {
    conn.execute(
        "DELETE FROM record WHERE repo = ?1 AND path = ?2",
        params![repo, path],
    )?;
    Ok(())
}

/// Encoded value bytes stored at `path`.
pub(crate) fn value_bytes(conn: &Connection, repo: i64, path: &str) -> RepoResult<Option<Vec<u8>>> {
    Ok(conn
        .query_row(
            "SELECT value FROM record WHERE repo = ?1 AND path = ?2",
            params![repo, path],
            |row| row.get(0),
        )
        .optional()?)
}

pub(crate) fn get(conn: &Connection, repo: i64, path: &str) -> RepoResult<Option<RecordEntry>> {
    let row = conn
        .query_row(
            "SELECT path, cid, since, value FROM record WHERE repo = ?1 AND path = ?2",
            params![repo, path],
            raw_row,
        )
        .optional()?;
    row.map(decode_row).transpose()
}

/// Records of one collection, ordered by path.
pub(crate) fn list(conn: &Connection, repo: i64, collection: &str) -> RepoResult<Vec<RecordEntry>> {
    // paths are `collection/rkey`; '0' is the character after '/'
    let lo = format!("{collection}/");
    let hi = format!("{collection}0");
    let mut stmt = conn.prepare_cached(
        "SELECT path, cid, since, value FROM record \
         WHERE repo = ?1 AND path >= ?2 AND path < ?3 ORDER BY path",
    )?;
    let rows = stmt
        .query_map(params![repo, lo, hi], raw_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(decode_row).collect()
}

type RawRow = (String, Vec<u8>, String, Vec<u8>);

fn raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode_row((path, cid, since, value): RawRow) -> RepoResult<RecordEntry> {
    Ok(RecordEntry {
        path,
        cid: db::object_id(&cid)?,
        since: db::tid(&since)?,
        value: codec::decode(&value)?,
    })
}
