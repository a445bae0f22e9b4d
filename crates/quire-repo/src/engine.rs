use serde_json::Value;
use tracing::info;

use quire_crypto::{SigningKey, VerifyingKey};
use quire_types::{ObjectId, TidClock};

use crate::blob::BlobTracker;
use crate::config::RepoConfig;
use crate::db::Database;
use crate::error::RepoResult;
use crate::firehose::{self, EventStream, Firehose, FirehoseEvent};
use crate::ops::{ApplyWritesOutput, WriteOp};
use crate::pipeline;
use crate::record::{self, RecordEntry};
use crate::user::{self, RepoHead};

/// Repository engine: the database, the revision clock and the live
/// replication fan-out.
///
/// Every mutating call is one database transaction. Events are published to
/// subscribers only after their transaction has committed.
pub struct RepoEngine {
    db: Database,
    config: RepoConfig,
    clock: TidClock,
    firehose: Firehose,
}

impl RepoEngine {
    /// Open the database named by `config`, creating it if needed.
    pub fn open(config: RepoConfig) -> RepoResult<Self> {
        config.validate()?;
        let db = Database::from_config(&config)?;
        Self::with_database(db, config)
    }

    /// An engine over a private in-memory database.
    pub fn in_memory(config: RepoConfig) -> RepoResult<Self> {
        Self::with_database(Database::open_in_memory()?, config)
    }

    pub fn with_database(db: Database, config: RepoConfig) -> RepoResult<Self> {
        config.validate()?;
        Ok(Self {
            db,
            firehose: Firehose::new(config.firehose_queue_size),
            clock: TidClock::default(),
            config,
        })
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    /// Create an empty repository owned by `key`.
    pub fn create_repo(&self, did: &str, key: &SigningKey) -> RepoResult<RepoHead> {
        self.db
            .transaction(|tx| pipeline::create_repo(tx, &self.clock, did, key))
    }

    /// Apply a write batch. Returns the API result and the event message.
    pub fn apply_writes(
        &self,
        did: &str,
        writes: &[WriteOp],
    ) -> RepoResult<(ApplyWritesOutput, Vec<u8>)> {
        let (output, event) = self
            .db
            .transaction(|tx| pipeline::apply_writes(tx, &self.clock, did, writes))?;
        let msg = event.msg.clone();
        self.firehose.publish(event);
        Ok((output, msg))
    }

    /// Parse a JSON operation list and apply it.
    pub fn apply_writes_json(
        &self,
        did: &str,
        writes: &Value,
    ) -> RepoResult<(ApplyWritesOutput, Vec<u8>)> {
        let ops = WriteOp::parse_batch(writes)?;
        self.apply_writes(did, &ops)
    }

    pub fn head(&self, did: &str) -> RepoResult<RepoHead> {
        self.db.read(|conn| Ok(user::load(conn, did)?.repo_head()))
    }

    /// Public key that verifies the repository's commits.
    pub fn verifying_key(&self, did: &str) -> RepoResult<VerifyingKey> {
        self.db
            .read(|conn| Ok(user::load(conn, did)?.signing_key.verifying_key()))
    }

    pub fn get_record(&self, did: &str, path: &str) -> RepoResult<Option<RecordEntry>> {
        self.db.read(|conn| {
            let repo = user::repo_id(conn, did)?;
            record::get(conn, repo, path)
        })
    }

    /// Records of one collection, ordered by path.
    pub fn list_records(&self, did: &str, collection: &str) -> RepoResult<Vec<RecordEntry>> {
        self.db.read(|conn| {
            let repo = user::repo_id(conn, did)?;
            record::list(conn, repo, collection)
        })
    }

    /// Store blob content so records can reference it.
    pub fn upload_blob(&self, did: &str, bytes: &[u8]) -> RepoResult<ObjectId> {
        let id = self.db.transaction(|tx| {
            let repo = user::repo_id(tx, did)?;
            BlobTracker::new(tx, repo).insert(bytes, self.config.blob_part_size)
        })?;
        info!(did, blob = %id.short_hex(), size = bytes.len(), "blob uploaded");
        Ok(id)
    }

    pub fn get_blob(&self, did: &str, id: &ObjectId) -> RepoResult<Option<Vec<u8>>> {
        self.db.read(|conn| {
            let repo = user::repo_id(conn, did)?;
            BlobTracker::new(conn, repo).read(id)
        })
    }

    /// Reference count of a blob, `None` once it has been purged.
    pub fn blob_refcount(&self, did: &str, id: &ObjectId) -> RepoResult<Option<i64>> {
        self.db.read(|conn| {
            let repo = user::repo_id(conn, did)?;
            BlobTracker::new(conn, repo).refcount(id)
        })
    }

    /// Persisted events after `cursor`, oldest first.
    pub fn events_since(&self, cursor: i64, limit: usize) -> RepoResult<Vec<FirehoseEvent>> {
        self.db.read(|conn| firehose::events_since(conn, cursor, limit))
    }

    /// Receive events committed from now on.
    pub fn subscribe(&self) -> EventStream {
        self.firehose.subscribe()
    }
}

impl std::fmt::Debug for RepoEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoEngine")
            .field("config", &self.config)
            .field("firehose", &self.firehose)
            .finish_non_exhaustive()
    }
}
