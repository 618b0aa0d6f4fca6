//! Timeline rows: import bookkeeping for the timeline registry.
//!
//! Rows are created in `importing` and move to exactly one terminal status.
//! Historical imports are immutable: nothing here updates a `ready` or
//! `failed` row, and re-imports insert fresh rows.

use crate::error::{Result, StrataError};
use crate::model::{ImportStatus, Timeline};
use anyhow::{Context, anyhow};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;

fn timeline_from_row(row: &Row<'_>) -> rusqlite::Result<(Timeline, String)> {
    let status_raw: String = row.get("status")?;
    let timeline = Timeline {
        timeline_id: row.get("timeline_id")?,
        name: row.get("name")?,
        index_id: row.get("index_id")?,
        // Patched by the caller after parsing status_raw.
        status: ImportStatus::Importing,
        error_detail: row.get("error_detail")?,
        malformed_count: row.get::<_, i64>("malformed_count")?.unsigned_abs(),
        event_count: row.get::<_, i64>("event_count")?.unsigned_abs(),
        created_by: row.get("created_by")?,
        created_at_us: row.get("created_at_us")?,
        finished_at_us: row.get("finished_at_us")?,
    };
    Ok((timeline, status_raw))
}

fn finish_row(pair: (Timeline, String)) -> Result<Timeline> {
    let (mut timeline, status_raw) = pair;
    timeline.status = status_raw
        .parse()
        .map_err(|err| StrataError::Internal(anyhow!("{err}")))?;
    Ok(timeline)
}

/// Insert a new timeline row in `importing` state.
///
/// # Errors
///
/// Returns `Validation` for a blank name and `Internal` on storage failure.
pub fn create_importing(
    conn: &Connection,
    name: &str,
    index_id: &str,
    created_by: &str,
    now_us: i64,
) -> Result<Timeline> {
    if name.trim().is_empty() {
        return Err(StrataError::Validation("timeline name is empty".into()));
    }

    conn.execute(
        "INSERT INTO timelines (name, index_id, status, created_by, created_at_us)
         VALUES (?1, ?2, 'importing', ?3, ?4)",
        params![name, index_id, created_by, now_us],
    )
    .context("insert timeline row")?;

    let timeline_id = conn.last_insert_rowid();
    info!(timeline_id, index_id, "timeline import registered");
    get(conn, timeline_id)
}

/// Transition an `importing` timeline to `ready`.
///
/// # Errors
///
/// Returns `NotFound` for an unknown id and `Internal` when the row is not
/// in `importing` (terminal rows are immutable).
pub fn mark_ready(
    conn: &Connection,
    timeline_id: i64,
    event_count: u64,
    malformed_count: u64,
    finished_at_us: i64,
) -> Result<Timeline> {
    let changed = conn
        .execute(
            "UPDATE timelines
             SET status = 'ready',
                 event_count = ?2,
                 malformed_count = ?3,
                 finished_at_us = ?4
             WHERE timeline_id = ?1 AND status = 'importing'",
            params![
                timeline_id,
                i64::try_from(event_count).unwrap_or(i64::MAX),
                i64::try_from(malformed_count).unwrap_or(i64::MAX),
                finished_at_us
            ],
        )
        .context("mark timeline ready")?;

    if changed == 0 {
        return Err(stuck_transition(conn, timeline_id, ImportStatus::Ready));
    }
    info!(timeline_id, event_count, malformed_count, "timeline ready");
    get(conn, timeline_id)
}

/// Transition an `importing` timeline to `failed`, storing the error detail.
///
/// # Errors
///
/// Same contract as [`mark_ready`].
pub fn mark_failed(
    conn: &Connection,
    timeline_id: i64,
    error_detail: &str,
    malformed_count: u64,
    finished_at_us: i64,
) -> Result<Timeline> {
    let changed = conn
        .execute(
            "UPDATE timelines
             SET status = 'failed',
                 error_detail = ?2,
                 malformed_count = ?3,
                 finished_at_us = ?4
             WHERE timeline_id = ?1 AND status = 'importing'",
            params![
                timeline_id,
                error_detail,
                i64::try_from(malformed_count).unwrap_or(i64::MAX),
                finished_at_us
            ],
        )
        .context("mark timeline failed")?;

    if changed == 0 {
        return Err(stuck_transition(conn, timeline_id, ImportStatus::Failed));
    }
    info!(timeline_id, error_detail, "timeline import failed");
    get(conn, timeline_id)
}

/// Explain why a guarded terminal update matched no row.
fn stuck_transition(conn: &Connection, timeline_id: i64, target: ImportStatus) -> StrataError {
    match get(conn, timeline_id) {
        Ok(existing) => match existing.status.can_transition_to(target) {
            // The guard and the row disagree; surface the raw state.
            Ok(()) => StrataError::Internal(anyhow!(
                "timeline {timeline_id} update raced another writer"
            )),
            Err(err) => StrataError::Internal(anyhow!("{err}")),
        },
        Err(err) => err,
    }
}

/// Fetch one timeline by id.
///
/// # Errors
///
/// Returns `NotFound` for an unknown id.
pub fn get(conn: &Connection, timeline_id: i64) -> Result<Timeline> {
    let row = conn
        .query_row(
            "SELECT timeline_id, name, index_id, status, error_detail,
                    malformed_count, event_count, created_by, created_at_us,
                    finished_at_us
             FROM timelines
             WHERE timeline_id = ?1",
            params![timeline_id],
            timeline_from_row,
        )
        .optional()
        .context("query timeline by id")?;

    row.map_or_else(
        || Err(StrataError::not_found("timeline", timeline_id)),
        finish_row,
    )
}

/// List all timelines, newest first.
///
/// # Errors
///
/// Returns `Internal` on storage failure.
pub fn list(conn: &Connection) -> Result<Vec<Timeline>> {
    let mut stmt = conn
        .prepare(
            "SELECT timeline_id, name, index_id, status, error_detail,
                    malformed_count, event_count, created_by, created_at_us,
                    finished_at_us
             FROM timelines
             ORDER BY created_at_us DESC, timeline_id DESC",
        )
        .context("prepare timeline list")?;

    let rows = stmt
        .query_map([], timeline_from_row)
        .context("query timeline list")?;

    let mut timelines = Vec::new();
    for row in rows {
        timelines.push(finish_row(row.context("read timeline row")?)?);
    }
    Ok(timelines)
}

/// True when any sketch references the timeline.
///
/// # Errors
///
/// Returns `Internal` on storage failure.
pub fn is_referenced(conn: &Connection, timeline_id: i64) -> Result<bool> {
    let referenced: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sketch_timelines WHERE timeline_id = ?1)",
            params![timeline_id],
            |row| row.get(0),
        )
        .context("check timeline references")?;
    Ok(referenced)
}

/// Delete a timeline row.
///
/// The caller is responsible for dropping the timeline's index documents.
///
/// # Errors
///
/// Returns `Validation` while any sketch still references the timeline and
/// `NotFound` for an unknown id.
pub fn delete(conn: &Connection, timeline_id: i64) -> Result<()> {
    if is_referenced(conn, timeline_id)? {
        return Err(StrataError::Validation(format!(
            "timeline {timeline_id} is still referenced by a sketch"
        )));
    }

    let deleted = conn
        .execute(
            "DELETE FROM timelines WHERE timeline_id = ?1",
            params![timeline_id],
        )
        .context("delete timeline row")?;

    if deleted == 0 {
        return Err(StrataError::not_found("timeline", timeline_id));
    }
    info!(timeline_id, "timeline deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations;
    use crate::model::ImportStatus;

    fn conn() -> Connection {
        let mut conn = Connection::open_in_memory().expect("open in-memory db");
        conn.pragma_update(None, "foreign_keys", "ON")
            .expect("enable fk");
        migrations::migrate(&mut conn).expect("migrate");
        conn
    }

    #[test]
    fn create_then_mark_ready() {
        let conn = conn();
        let timeline =
            create_importing(&conn, "laptop", "idx-0001", "alice", 100).expect("create");
        assert_eq!(timeline.status, ImportStatus::Importing);
        assert_eq!(timeline.event_count, 0);

        let ready = mark_ready(&conn, timeline.timeline_id, 90, 10, 200).expect("ready");
        assert_eq!(ready.status, ImportStatus::Ready);
        assert_eq!(ready.event_count, 90);
        assert_eq!(ready.malformed_count, 10);
        assert_eq!(ready.finished_at_us, Some(200));
    }

    #[test]
    fn mark_failed_stores_detail() {
        let conn = conn();
        let timeline =
            create_importing(&conn, "server", "idx-0002", "alice", 100).expect("create");
        let failed = mark_failed(&conn, timeline.timeline_id, "source unreadable", 3, 150)
            .expect("failed");
        assert_eq!(failed.status, ImportStatus::Failed);
        assert_eq!(failed.error_detail.as_deref(), Some("source unreadable"));
    }

    #[test]
    fn terminal_timeline_rejects_second_transition() {
        let conn = conn();
        let timeline =
            create_importing(&conn, "laptop", "idx-0003", "alice", 100).expect("create");
        mark_ready(&conn, timeline.timeline_id, 5, 0, 200).expect("ready");

        let again = mark_ready(&conn, timeline.timeline_id, 5, 0, 300);
        assert!(again.is_err(), "ready timeline must stay immutable");

        let failed = mark_failed(&conn, timeline.timeline_id, "late failure", 0, 300);
        assert!(failed.is_err());
    }

    #[test]
    fn blank_name_is_validation_error() {
        let conn = conn();
        let result = create_importing(&conn, "   ", "idx-0004", "alice", 100);
        assert!(matches!(result, Err(StrataError::Validation(_))));
    }

    #[test]
    fn get_unknown_is_not_found() {
        let conn = conn();
        assert!(matches!(
            get(&conn, 999),
            Err(StrataError::NotFound { .. })
        ));
    }

    #[test]
    fn delete_refuses_while_referenced() {
        let conn = conn();
        let timeline =
            create_importing(&conn, "laptop", "idx-0005", "alice", 100).expect("create");
        mark_ready(&conn, timeline.timeline_id, 1, 0, 200).expect("ready");

        conn.execute(
            "INSERT INTO sketches (name, owner, created_at_us) VALUES ('case', 'alice', 1)",
            [],
        )
        .expect("insert sketch");
        conn.execute(
            "INSERT INTO sketch_timelines (sketch_id, timeline_id, position, added_at_us)
             VALUES (1, ?1, 0, 1)",
            params![timeline.timeline_id],
        )
        .expect("attach");

        let result = delete(&conn, timeline.timeline_id);
        assert!(matches!(result, Err(StrataError::Validation(_))));

        conn.execute("DELETE FROM sketch_timelines", [])
            .expect("detach");
        delete(&conn, timeline.timeline_id).expect("delete after detach");
    }
}
