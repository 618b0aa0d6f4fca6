//! Event store adapter over SQLite FTS5.
//!
//! The search capability consumed here is SQLite's FTS5 + JSON1; this module
//! only adapts it: normalized event records go in, indexed immutable
//! documents and query results come out. Raw events live *only* in this
//! database, never in the metadata store.

pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use strata_core::model::Event;
use tracing::{debug, warn};

/// Busy timeout for event index connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A normalized event record handed to the adapter by an ingestion
/// producer.
///
/// Producers (Plaso/CSV/JSON parsers) are out of scope; anything that can
/// yield these records can be imported. A record is well-formed when it has
/// a timestamp and a non-blank message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Microseconds since the Unix epoch. `None` marks a malformed record.
    pub ts_us: Option<i64>,
    pub message: String,
    #[serde(default)]
    pub source_type: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl EventRecord {
    /// Why this record cannot be indexed, if anything.
    #[must_use]
    pub fn malformed_reason(&self) -> Option<&'static str> {
        if self.ts_us.is_none() {
            Some("missing or unparseable timestamp")
        } else if self.message.trim().is_empty() {
            Some("empty message")
        } else {
            None
        }
    }
}

/// Result of one ingest batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexOutcome {
    /// Events written to the index.
    pub indexed: u64,
    /// Malformed events skipped, per partial-failure semantics.
    pub malformed: u64,
}

/// Handle to the event index database.
#[derive(Debug)]
pub struct EventStore {
    conn: Connection,
    path: PathBuf,
}

impl EventStore {
    /// Open (or create) the event index database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if opening/configuring/migrating fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create event db directory {}", parent.display()))?;
        }

        let mut conn = Connection::open(path)
            .with_context(|| format!("open event database {}", path.display()))?;

        conn.pragma_update(None, "synchronous", "NORMAL")
            .context("set synchronous pragma")?;
        let _journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .context("enable WAL")?;
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)
            .context("set busy timeout")?;
        migrations::migrate(&mut conn).context("apply event store migrations")?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// The underlying connection, for query composition.
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Path this store was opened from, for re-opening on worker threads.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ingest a lazy, finite sequence of records into `index_id`.
    ///
    /// Writes happen in transactions of `batch_size`. Malformed records are
    /// counted and skipped — one bad event never aborts the import. Every
    /// indexed document gets a content-derived id unique within the index.
    ///
    /// # Errors
    ///
    /// Returns an error only when the store itself fails (ingestion cannot
    /// proceed at all), not for malformed records.
    pub fn index_events(
        &mut self,
        index_id: &str,
        records: impl Iterator<Item = EventRecord>,
        batch_size: usize,
    ) -> Result<IndexOutcome> {
        let batch_size = batch_size.max(1);
        let mut outcome = IndexOutcome::default();
        let mut seq: u64 = 0;
        let mut records = records.peekable();

        while records.peek().is_some() {
            let tx = self.conn.transaction().context("begin ingest batch")?;
            {
                let mut insert = tx
                    .prepare(
                        "INSERT OR IGNORE INTO events
                             (index_id, doc_id, ts_us, message, source_type, attrs)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    )
                    .context("prepare event insert")?;

                for record in records.by_ref().take(batch_size) {
                    seq += 1;
                    if let Some(reason) = record.malformed_reason() {
                        outcome.malformed += 1;
                        warn!(index_id, seq, reason, "skipping malformed event");
                        continue;
                    }

                    let ts_us = record.ts_us.unwrap_or_default();
                    let attrs = serde_json::to_string(&record.attributes)
                        .context("serialize event attributes")?;
                    let doc_id = doc_id(index_id, seq, ts_us, &record.message, &attrs);

                    insert
                        .execute(params![
                            index_id,
                            doc_id,
                            ts_us,
                            record.message,
                            record.source_type,
                            attrs
                        ])
                        .context("insert event")?;
                    outcome.indexed += 1;
                }
            }
            tx.commit().context("commit ingest batch")?;
        }

        debug!(
            index_id,
            indexed = outcome.indexed,
            malformed = outcome.malformed,
            "ingest finished"
        );
        Ok(outcome)
    }

    /// Number of documents in an index.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    pub fn count(&self, index_id: &str) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM events WHERE index_id = ?1",
                params![index_id],
                |row| row.get(0),
            )
            .context("count index documents")?;
        Ok(count.unsigned_abs())
    }

    /// Fetch a single document by reference.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure; `Ok(None)` for a missing doc.
    pub fn get_event(&self, index_id: &str, doc_id: &str) -> Result<Option<Event>> {
        use rusqlite::OptionalExtension;

        self.conn
            .query_row(
                "SELECT index_id, doc_id, ts_us, message, source_type, attrs
                 FROM events
                 WHERE index_id = ?1 AND doc_id = ?2",
                params![index_id, doc_id],
                event_from_row,
            )
            .optional()
            .context("query single event")?
            .map(finish_event)
            .transpose()
    }

    /// Delete every document of an index. Used when a timeline is deleted.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    pub fn drop_index(&mut self, index_id: &str) -> Result<u64> {
        let deleted = self
            .conn
            .execute("DELETE FROM events WHERE index_id = ?1", params![index_id])
            .context("drop index documents")?;
        debug!(index_id, deleted, "index dropped");
        Ok(u64::try_from(deleted).unwrap_or(u64::MAX))
    }
}

/// Raw row → (Event, attrs JSON) pending attribute parsing.
pub(crate) fn event_from_row(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<(Event, String)> {
    let attrs_raw: String = row.get(5)?;
    let event = Event {
        index_id: row.get(0)?,
        doc_id: row.get(1)?,
        ts_us: row.get(2)?,
        message: row.get(3)?,
        source_type: row.get(4)?,
        attributes: BTreeMap::new(),
    };
    Ok((event, attrs_raw))
}

/// Parse the stored attribute JSON into the event.
pub(crate) fn finish_event(pair: (Event, String)) -> Result<Event> {
    let (mut event, attrs_raw) = pair;
    event.attributes =
        serde_json::from_str(&attrs_raw).context("parse stored event attributes")?;
    Ok(event)
}

/// Content-derived document id, unique within its index.
///
/// The ingest sequence number is part of the hash input so identical
/// payloads (duplicate log lines are common in forensic data) still get
/// distinct documents.
fn doc_id(index_id: &str, seq: u64, ts_us: i64, message: &str, attrs: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(index_id.as_bytes());
    hasher.update(&seq.to_le_bytes());
    hasher.update(&ts_us.to_le_bytes());
    hasher.update(message.as_bytes());
    hasher.update(attrs.as_bytes());
    let hex = hasher.finalize().to_hex();
    format!("ev-{}", &hex.as_str()[..16])
}
