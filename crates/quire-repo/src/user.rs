//! The per-repository `user` row: identity, current commit and signing key.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use quire_crypto::SigningKey;
use quire_types::{ObjectId, Tid};

use crate::commit::Commit;
use crate::db;
use crate::error::{RepoError, RepoResult};

/// Current state of a repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RepoHead {
    pub did: String,
    /// Id of the current commit.
    pub commit: ObjectId,
    pub rev: Tid,
    /// Tree root named by the current commit.
    pub root: ObjectId,
}

pub(crate) struct UserRow {
    pub id: i64,
    pub commit: Commit,
    pub head: ObjectId,
    pub signing_key: SigningKey,
}

impl UserRow {
    pub fn repo_head(&self) -> RepoHead {
        RepoHead {
            did: self.commit.did.clone(),
            commit: self.head,
            rev: self.commit.rev,
            root: self.commit.data,
        }
    }
}

pub(crate) fn load(conn: &Connection, did: &str) -> RepoResult<UserRow> {
    let row = conn
        .query_row(
            "SELECT id, commit_bytes, head, signing_key FROM user WHERE did = ?1",
            [did],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                ))
            },
        )
        .optional()?;
    let Some((id, commit_bytes, head, key)) = row else {
        return Err(RepoError::RepoNotFound(did.to_string()));
    };
    Ok(UserRow {
        id,
        commit: Commit::decode(&commit_bytes)?,
        head: db::object_id(&head)?,
        signing_key: SigningKey::from_slice(&key)?,
    })
}

/// Row id of a repository.
pub(crate) fn repo_id(conn: &Connection, did: &str) -> RepoResult<i64> {
    conn.query_row("SELECT id FROM user WHERE did = ?1", [did], |row| row.get(0))
        .optional()?
        .ok_or_else(|| RepoError::RepoNotFound(did.to_string()))
}

pub(crate) fn exists(conn: &Connection, did: &str) -> RepoResult<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM user WHERE did = ?1", [did], |_| Ok(()))
        .optional()?
        .is_some())
}

pub(crate) fn insert(
    conn: &Connection,
    did: &str,
    commit_bytes: &[u8],
    head: &ObjectId,
    rev: &Tid,
    key: &SigningKey,
) -> RepoResult<i64> {
    conn.execute(
        "INSERT INTO user (did, commit_bytes, head, rev, signing_key) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![did, commit_bytes, &head.as_bytes()[..], rev.to_string(), &key.as_bytes()[..]],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn update_head(
    conn: &Connection,
    id: i64,
    commit_bytes: &[u8],
    head: &ObjectId,
    rev: &Tid,
) -> RepoResult<()> {
    conn.execute(
        "UPDATE user SET commit_bytes = ?1, head = ?2, rev = ?3 WHERE id = ?4",
        params![commit_bytes, &head.as_bytes()[..], rev.to_string(), id],
    )?;
    Ok(())
}
