//! Timeline imports: registry bookkeeping plus ingestion.
//!
//! An import creates a Timeline row in `importing`, streams records through
//! the event store adapter, and finalizes the row to `ready` or `failed`.
//! Historical imports are immutable — re-importing a source always creates a
//! new timeline bound to a new index.

use anyhow::Context;
use chrono::DateTime;
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use strata_core::db::{open_metadata, timelines};
use strata_core::error::{Result, StrataError};
use strata_core::model::Timeline;
use strata_core::time::now_us;
use tracing::{error, info};

use crate::store::{EventRecord, EventStore};

/// Generate a fresh index id for a new import.
///
/// Derived from the timeline name, the wall clock, and the registering
/// user, so re-imports of the same source land in distinct indices.
#[must_use]
pub fn new_index_id(name: &str, created_by: &str, now_us: i64) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(name.as_bytes());
    hasher.update(created_by.as_bytes());
    hasher.update(&now_us.to_le_bytes());
    let hex = hasher.finalize().to_hex();
    format!("idx-{}", &hex.as_str()[..12])
}

/// Drive one import to completion on the current thread.
///
/// Partial-failure semantics: malformed records are skipped and counted; the
/// timeline only fails when nothing could be indexed out of a non-empty
/// batch, or when the store itself errors.
///
/// # Errors
///
/// Returns the registry errors of the create/finalize steps; ingest errors
/// are captured into the timeline's `failed` state instead of propagating.
pub fn run_import(
    meta: &Connection,
    store: &mut EventStore,
    name: &str,
    created_by: &str,
    records: impl Iterator<Item = EventRecord>,
    batch_size: usize,
) -> Result<Timeline> {
    let started = now_us();
    let index_id = new_index_id(name, created_by, started);
    let timeline = timelines::create_importing(meta, name, &index_id, created_by, started)?;

    finish_import(meta, store, &timeline, records, batch_size)
}

/// Ingest into an already-registered `importing` timeline and finalize it.
fn finish_import(
    meta: &Connection,
    store: &mut EventStore,
    timeline: &Timeline,
    records: impl Iterator<Item = EventRecord>,
    batch_size: usize,
) -> Result<Timeline> {
    match store.index_events(&timeline.index_id, records, batch_size) {
        Ok(outcome) => {
            if outcome.indexed == 0 && outcome.malformed > 0 {
                let detail = format!(
                    "all {} events in the batch were malformed",
                    outcome.malformed
                );
                timelines::mark_failed(
                    meta,
                    timeline.timeline_id,
                    &detail,
                    outcome.malformed,
                    now_us(),
                )
            } else {
                timelines::mark_ready(
                    meta,
                    timeline.timeline_id,
                    outcome.indexed,
                    outcome.malformed,
                    now_us(),
                )
            }
        }
        Err(err) => {
            error!(timeline_id = timeline.timeline_id, %err, "ingestion failed");
            timelines::mark_failed(
                meta,
                timeline.timeline_id,
                &format!("{err:#}"),
                0,
                now_us(),
            )
        }
    }
}

/// Handle to an import running on its own thread.
#[derive(Debug)]
pub struct ImportHandle {
    timeline_id: i64,
    handle: JoinHandle<Result<Timeline>>,
}

impl ImportHandle {
    /// Id of the timeline being imported, available immediately.
    #[must_use]
    pub const fn timeline_id(&self) -> i64 {
        self.timeline_id
    }

    /// Block until the import finishes and return the final timeline.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the import thread panicked, otherwise the
    /// import's own result.
    pub fn join(self) -> Result<Timeline> {
        self.handle
            .join()
            .map_err(|_| StrataError::Internal(anyhow::anyhow!("import thread panicked")))?
    }
}

/// Source format of an import file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Jsonl,
    Csv,
}

impl ImportFormat {
    /// Infer the format from the file extension; anything but `.csv` is
    /// treated as JSONL.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv { Self::Csv } else { Self::Jsonl }
    }
}

/// Begin an asynchronous import from a JSONL or CSV file.
///
/// The timeline row is created in `importing` before this returns, so
/// callers can observe the in-flight import; ingestion and finalization
/// happen on a dedicated thread with its own connections.
///
/// # Errors
///
/// Returns registry errors from creating the timeline row.
pub fn start_import(
    meta_path: &Path,
    events_path: &Path,
    name: &str,
    created_by: &str,
    source: PathBuf,
    format: ImportFormat,
    batch_size: usize,
) -> Result<(Timeline, ImportHandle)> {
    let meta = open_metadata(meta_path)?;
    let started = now_us();
    let index_id = new_index_id(name, created_by, started);
    let timeline = timelines::create_importing(&meta, name, &index_id, created_by, started)?;
    drop(meta);

    let meta_path = meta_path.to_path_buf();
    let events_path = events_path.to_path_buf();
    let pending = timeline.clone();
    let handle = thread::spawn(move || -> Result<Timeline> {
        let meta = open_metadata(&meta_path)?;
        let mut store = EventStore::open(&events_path)?;
        let file = std::fs::File::open(&source)
            .with_context(|| format!("open import source {}", source.display()));

        match file {
            Ok(file) => {
                let reader = std::io::BufReader::new(file);
                match format {
                    ImportFormat::Jsonl => finish_import(
                        &meta,
                        &mut store,
                        &pending,
                        jsonl_records(reader),
                        batch_size,
                    ),
                    ImportFormat::Csv => finish_import(
                        &meta,
                        &mut store,
                        &pending,
                        csv_records(reader),
                        batch_size,
                    ),
                }
            }
            Err(err) => timelines::mark_failed(
                &meta,
                pending.timeline_id,
                &format!("{err:#}"),
                0,
                now_us(),
            ),
        }
    });

    info!(timeline_id = timeline.timeline_id, name, "import started");
    Ok((
        timeline.clone(),
        ImportHandle {
            timeline_id: timeline.timeline_id,
            handle,
        },
    ))
}

/// Delete a timeline and drop its index documents.
///
/// # Errors
///
/// `Validation` while any sketch still references the timeline; `NotFound`
/// for an unknown id.
pub fn delete_timeline(
    meta: &Connection,
    store: &mut EventStore,
    timeline_id: i64,
) -> Result<u64> {
    let timeline = timelines::get(meta, timeline_id)?;
    timelines::delete(meta, timeline_id)?;
    let dropped = store
        .drop_index(&timeline.index_id)
        .map_err(StrataError::Internal)?;
    info!(timeline_id, dropped, "timeline and index documents removed");
    Ok(dropped)
}

/// Lazily parse JSONL into normalized records.
///
/// Mapping per line (one JSON object each):
/// - `timestamp` (integer, microseconds) or `datetime` (RFC 3339) → `ts_us`
/// - `message` (string) → `message`
/// - `source_type` or `data_type` (string) → `source_type`
/// - every other key → `attributes`
///
/// Unparseable lines become malformed records (counted by the adapter, not
/// fatal). Blank lines are skipped entirely.
pub fn jsonl_records(reader: impl BufRead) -> impl Iterator<Item = EventRecord> {
    reader.lines().filter_map(|line| {
        let line = match line {
            Ok(line) => line,
            Err(_) => return Some(EventRecord::default()),
        };
        if line.trim().is_empty() {
            return None;
        }
        Some(parse_jsonl_line(&line))
    })
}

/// Lazily parse CSV (with a header row) into normalized records.
///
/// Column mapping mirrors [`jsonl_records`]: `timestamp` (integer
/// microseconds) or `datetime` (RFC 3339), `message`, `source_type` /
/// `data_type`, everything else into string attributes. Rows that fail to
/// parse become malformed records.
pub fn csv_records(reader: impl std::io::Read) -> impl Iterator<Item = EventRecord> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers().cloned().unwrap_or_default();
    rdr.into_records().map(move |row| match row {
        Ok(row) => parse_csv_row(&headers, &row),
        Err(_) => EventRecord::default(),
    })
}

fn parse_csv_row(headers: &csv::StringRecord, row: &csv::StringRecord) -> EventRecord {
    let mut record = EventRecord::default();
    let mut attributes = BTreeMap::new();

    for (key, value) in headers.iter().zip(row.iter()) {
        match key {
            "timestamp" => record.ts_us = value.trim().parse().ok(),
            "datetime" => {
                if record.ts_us.is_none() {
                    record.ts_us = DateTime::parse_from_rfc3339(value.trim())
                        .ok()
                        .map(|dt| dt.timestamp_micros());
                }
            }
            "message" => record.message = value.to_string(),
            "source_type" | "data_type" => {
                if record.source_type.is_empty() {
                    record.source_type = value.to_string();
                }
            }
            _ => {
                if !value.is_empty() {
                    attributes.insert(
                        key.to_string(),
                        serde_json::Value::String(value.to_string()),
                    );
                }
            }
        }
    }

    record.attributes = attributes;
    record
}

fn parse_jsonl_line(line: &str) -> EventRecord {
    let Ok(serde_json::Value::Object(map)) = serde_json::from_str(line) else {
        return EventRecord::default();
    };

    let mut record = EventRecord::default();
    let mut attributes = BTreeMap::new();

    for (key, value) in map {
        match key.as_str() {
            "timestamp" => record.ts_us = value.as_i64(),
            "datetime" => {
                if record.ts_us.is_none() {
                    record.ts_us = value
                        .as_str()
                        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                        .map(|dt| dt.timestamp_micros());
                }
            }
            "message" => {
                record.message = value.as_str().unwrap_or_default().to_string();
            }
            "source_type" | "data_type" => {
                if record.source_type.is_empty() {
                    record.source_type = value.as_str().unwrap_or_default().to_string();
                }
            }
            _ => {
                attributes.insert(key, value);
            }
        }
    }

    record.attributes = attributes;
    record
}
