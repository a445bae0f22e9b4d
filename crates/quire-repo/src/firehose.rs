//! The replication log and its in-process fan-out.
//!
//! Sequence numbers are allocated as `MAX(seq) + 1` inside the committing
//! transaction, which holds the database write lock, so they are gapless and
//! never reused. Broadcast happens only after that transaction commits.

use rusqlite::{params, Connection};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::RepoResult;

/// A persisted replication event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FirehoseEvent {
    pub seq: i64,
    /// Milliseconds since the UNIX epoch.
    pub timestamp: i64,
    /// Wire message: header then body.
    pub msg: Vec<u8>,
}

/// A broadcast receiver for replication events.
pub type EventStream = broadcast::Receiver<FirehoseEvent>;

/// Next sequence number. Must be called inside the writing transaction.
pub(crate) fn next_seq(conn: &Connection) -> RepoResult<i64> {
    Ok(conn.query_row("SELECT IFNULL(MAX(seq), 0) + 1 FROM firehose", [], |row| {
        row.get(0)
    })?)
}

/// Persist an event under `seq`.
pub(crate) fn append(conn: &Connection, seq: i64, msg: Vec<u8>) -> RepoResult<FirehoseEvent> {
    let timestamp = chrono::Utc::now().timestamp_millis();
    conn.execute(
        "INSERT INTO firehose (seq, timestamp, msg) VALUES (?1, ?2, ?3)",
        params![seq, timestamp, &msg],
    )?;
    Ok(FirehoseEvent {
        seq,
        timestamp,
        msg,
    })
}

/// Up to `limit` events with `seq > cursor`, in sequence order.
pub(crate) fn events_since(
    conn: &Connection,
    cursor: i64,
    limit: usize,
) -> RepoResult<Vec<FirehoseEvent>> {
    let mut stmt = conn.prepare_cached(
        "SELECT seq, timestamp, msg FROM firehose WHERE seq > ?1 ORDER BY seq LIMIT ?2",
    )?;
    let events = stmt
        .query_map(params![cursor, limit as i64], |row| {
            Ok(FirehoseEvent {
                seq: row.get(0)?,
                timestamp: row.get(1)?,
                msg: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(events)
}

/// Fan-out of committed events to live subscribers.
pub struct Firehose {
    sender: broadcast::Sender<FirehoseEvent>,
}

impl Firehose {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventStream {
        self.sender.subscribe()
    }

    /// Deliver an event. Having no subscribers is not an error.
    pub fn publish(&self, event: FirehoseEvent) {
        let seq = event.seq;
        match self.sender.send(event) {
            Ok(receivers) => debug!(seq, receivers, "event published"),
            Err(_) => debug!(seq, "event not published: no subscribers"),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl std::fmt::Debug for Firehose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Firehose")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Drain whatever is currently buffered for a subscriber.
///
/// A subscriber that fell behind by more than the channel capacity loses the
/// oldest events; it should catch up from the log with `events_since`.
pub fn drain(stream: &mut EventStream) -> Vec<FirehoseEvent> {
    let mut out = Vec::new();
    loop {
        match stream.try_recv() {
            Ok(event) => out.push(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "firehose subscriber lagged");
            }
            Err(_) => break,
        }
    }
    out
}
