//! SQLite persistence.
//!
//! One connection behind a mutex. Every mutation runs inside
//! [`Database::transaction`], which holds the write lock from the first
//! statement and rolls back unless the closure returns `Ok`.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use tracing::{debug, info};

use quire_types::{ObjectId, Tid};

use crate::config::{RepoConfig, DB_VERSION};
use crate::error::{RepoError, RepoResult};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS config (
    db_version INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS user (
    id INTEGER PRIMARY KEY,
    did TEXT NOT NULL UNIQUE,
    commit_bytes BLOB NOT NULL,
    head BLOB NOT NULL,
    rev TEXT NOT NULL,
    signing_key BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS record (
    repo INTEGER NOT NULL REFERENCES user(id),
    path TEXT NOT NULL,
    cid BLOB NOT NULL,
    since TEXT NOT NULL,
    value BLOB NOT NULL,
    PRIMARY KEY (repo, path)
);
CREATE TABLE IF NOT EXISTS mst (
    repo INTEGER NOT NULL REFERENCES user(id),
    cid BLOB NOT NULL,
    since TEXT NOT NULL,
    value BLOB NOT NULL,
    PRIMARY KEY (repo, cid)
);
CREATE TABLE IF NOT EXISTS blob (
    id INTEGER PRIMARY KEY,
    repo INTEGER NOT NULL REFERENCES user(id),
    cid BLOB NOT NULL,
    refcount INTEGER NOT NULL,
    since TEXT,
    UNIQUE (repo, cid)
);
CREATE TABLE IF NOT EXISTS blob_part (
    blob INTEGER NOT NULL REFERENCES blob(id),
    idx INTEGER NOT NULL,
    data BLOB NOT NULL,
    PRIMARY KEY (blob, idx)
);
CREATE TABLE IF NOT EXISTS firehose (
    seq INTEGER PRIMARY KEY,
    timestamp INTEGER NOT NULL,
    msg BLOB NOT NULL
);
";

/// Handle to the repository database.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a file-backed database in WAL mode.
    pub fn open(path: &Path) -> RepoResult<Self> {
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        info!(path = %path.display(), journal_mode = %mode, "database opened");
        Self::init(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> RepoResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Create the data directory and open the configured database file.
    pub fn from_config(config: &RepoConfig) -> RepoResult<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .map_err(|e| RepoError::Config(format!("{}: {e}", config.data_dir.display())))?;
        Self::open(&config.db_path)
    }

    fn init(conn: Connection) -> RepoResult<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        let version: Option<i64> = conn
            .query_row("SELECT db_version FROM config", [], |row| row.get(0))
            .optional()?;
        match version {
            None => {
                conn.execute("INSERT INTO config (db_version) VALUES (?1)", [DB_VERSION])?;
                debug!(version = DB_VERSION, "schema initialised");
            }
            Some(v) if v == DB_VERSION => {}
            Some(v) => {
                return Err(RepoError::Config(format!(
                    "database schema version {v} is not supported (expected {DB_VERSION})"
                )))
            }
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` inside an IMMEDIATE transaction.
    ///
    /// Commits when `f` returns `Ok`. On an error return, or a panic inside
    /// `f`, the transaction handle is dropped and everything rolls back.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> RepoResult<T>,
    ) -> RepoResult<T> {
        let mut conn = self.conn.lock().map_err(|_| RepoError::LockPoisoned)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Run read-only queries outside a transaction.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> RepoResult<T>) -> RepoResult<T> {
        let conn = self.conn.lock().map_err(|_| RepoError::LockPoisoned)?;
        f(&conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

/// Decode an object id column.
pub(crate) fn object_id(bytes: &[u8]) -> RepoResult<ObjectId> {
    ObjectId::from_slice(bytes).map_err(|e| RepoError::Corrupt(format!("stored object id: {e}")))
}

/// Decode a revision column.
pub(crate) fn tid(text: &str) -> RepoResult<Tid> {
    text.parse()
        .map_err(|e| RepoError::Corrupt(format!("stored revision {text:?}: {e}")))
}
