//! Analyzer run rows and their guarded state transitions.
//!
//! The state machine (`pending -> started -> done | error`) is enforced
//! twice: [`crate::model::RunState::can_transition_to`] at the type layer,
//! and `WHERE state = ...` guards on every UPDATE so concurrent writers
//! cannot revive a terminal run.

use crate::acl::{self, Access};
use crate::error::{Result, StrataError};
use crate::model::{AnalyzerRun, RunState};
use anyhow::{Context, anyhow};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<(AnalyzerRun, String)> {
    let state_raw: String = row.get("state")?;
    let scope_raw: Option<String> = row.get("timeline_scope")?;
    let timeline_scope = scope_raw
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .unwrap_or(None);

    let run = AnalyzerRun {
        run_id: row.get("run_id")?,
        sketch_id: row.get("sketch_id")?,
        analyzer: row.get("analyzer")?,
        timeline_scope,
        // Patched by the caller after parsing state_raw.
        state: RunState::Pending,
        result_summary: row.get("result_summary")?,
        finding_count: row.get::<_, i64>("finding_count")?.unsigned_abs(),
        error_detail: row.get("error_detail")?,
        created_at_us: row.get("created_at_us")?,
        started_at_us: row.get("started_at_us")?,
        finished_at_us: row.get("finished_at_us")?,
    };
    Ok((run, state_raw))
}

fn finish_row(pair: (AnalyzerRun, String)) -> Result<AnalyzerRun> {
    let (mut run, state_raw) = pair;
    run.state = state_raw
        .parse()
        .map_err(|err| StrataError::Internal(anyhow!("{err}")))?;
    Ok(run)
}

const RUN_COLUMNS: &str = "run_id, sketch_id, analyzer, timeline_scope, state, result_summary,
                           finding_count, error_detail, created_at_us, started_at_us,
                           finished_at_us";

/// Insert a new run in `pending` state.
///
/// The scheduling user must hold write access on the sketch; the analyzer
/// name is validated against the registry by the engine before this call.
///
/// # Errors
///
/// `Permission` when the scheduling user lacks write access.
pub fn create_pending(
    conn: &Connection,
    sketch_id: i64,
    analyzer: &str,
    timeline_scope: Option<&[i64]>,
    acting_user: &str,
    now_us: i64,
) -> Result<AnalyzerRun> {
    let sketch = super::sketches::get(conn, sketch_id)?;
    acl::require(&sketch, acting_user, Access::Write)?;

    let scope_json = timeline_scope
        .map(serde_json::to_string)
        .transpose()
        .context("serialize timeline scope")?;

    conn.execute(
        "INSERT INTO analyzer_runs (sketch_id, analyzer, timeline_scope, created_at_us)
         VALUES (?1, ?2, ?3, ?4)",
        params![sketch_id, analyzer, scope_json, now_us],
    )
    .context("insert analyzer run")?;

    let run_id = conn.last_insert_rowid();
    info!(sketch_id, run_id, analyzer, "analyzer run scheduled");
    get(conn, run_id)
}

/// Fetch one run by id.
///
/// # Errors
///
/// `NotFound` for an unknown id.
pub fn get(conn: &Connection, run_id: i64) -> Result<AnalyzerRun> {
    let row = conn
        .query_row(
            &format!("SELECT {RUN_COLUMNS} FROM analyzer_runs WHERE run_id = ?1"),
            params![run_id],
            run_from_row,
        )
        .optional()
        .context("query analyzer run")?;

    row.map_or_else(|| Err(StrataError::not_found("analyzer run", run_id)), finish_row)
}

/// List a sketch's runs, newest first.
///
/// # Errors
///
/// `Permission` when `acting_user` cannot read the sketch.
pub fn list(conn: &Connection, sketch_id: i64, acting_user: &str) -> Result<Vec<AnalyzerRun>> {
    let sketch = super::sketches::get(conn, sketch_id)?;
    acl::require(&sketch, acting_user, Access::Read)?;

    let mut stmt = conn
        .prepare(&format!(
            "SELECT {RUN_COLUMNS}
             FROM analyzer_runs
             WHERE sketch_id = ?1
             ORDER BY created_at_us DESC, run_id DESC"
        ))
        .context("prepare run list")?;

    let rows = stmt
        .query_map(params![sketch_id], run_from_row)
        .context("query run list")?;

    let mut runs = Vec::new();
    for row in rows {
        runs.push(finish_row(row.context("read run row")?)?);
    }
    Ok(runs)
}

/// `pending -> started`.
///
/// # Errors
///
/// `RunFinished` when the run is already terminal; `Internal` when it was
/// never pending.
pub fn mark_started(conn: &Connection, run_id: i64, now_us: i64) -> Result<AnalyzerRun> {
    let changed = conn
        .execute(
            "UPDATE analyzer_runs
             SET state = 'started', started_at_us = ?2
             WHERE run_id = ?1 AND state = 'pending'",
            params![run_id, now_us],
        )
        .context("mark run started")?;

    if changed == 0 {
        return Err(stuck_transition(conn, run_id, RunState::Started));
    }
    get(conn, run_id)
}

/// `started -> done` with the final summary.
///
/// # Errors
///
/// `RunFinished` when the run is already terminal.
pub fn mark_done(
    conn: &Connection,
    run_id: i64,
    summary: &str,
    finding_count: u64,
    now_us: i64,
) -> Result<AnalyzerRun> {
    let changed = conn
        .execute(
            "UPDATE analyzer_runs
             SET state = 'done',
                 result_summary = ?2,
                 finding_count = ?3,
                 finished_at_us = ?4
             WHERE run_id = ?1 AND state = 'started'",
            params![
                run_id,
                summary,
                i64::try_from(finding_count).unwrap_or(i64::MAX),
                now_us
            ],
        )
        .context("mark run done")?;

    if changed == 0 {
        return Err(stuck_transition(conn, run_id, RunState::Done));
    }
    info!(run_id, finding_count, "analyzer run done");
    get(conn, run_id)
}

/// `pending|started -> error` with captured detail.
///
/// Cancellation uses this with [`crate::model::run::CANCELLED_DETAIL`].
///
/// # Errors
///
/// `RunFinished` when the run is already terminal.
pub fn mark_error(
    conn: &Connection,
    run_id: i64,
    detail: &str,
    now_us: i64,
) -> Result<AnalyzerRun> {
    let changed = conn
        .execute(
            "UPDATE analyzer_runs
             SET state = 'error', error_detail = ?2, finished_at_us = ?3
             WHERE run_id = ?1 AND state IN ('pending', 'started')",
            params![run_id, detail, now_us],
        )
        .context("mark run error")?;

    if changed == 0 {
        return Err(stuck_transition(conn, run_id, RunState::Error));
    }
    info!(run_id, detail, "analyzer run errored");
    get(conn, run_id)
}

/// Append a line to a started run's result summary.
///
/// # Errors
///
/// `RunFinished` when the run is already terminal.
pub fn append_result(conn: &Connection, run_id: i64, line: &str) -> Result<()> {
    let changed = conn
        .execute(
            "UPDATE analyzer_runs
             SET result_summary = CASE
                 WHEN result_summary = '' THEN ?2
                 ELSE result_summary || char(10) || ?2
             END
             WHERE run_id = ?1 AND state = 'started'",
            params![run_id, line],
        )
        .context("append run result")?;

    if changed == 0 {
        let run = get(conn, run_id)?;
        return Err(StrataError::RunFinished {
            run_id,
            state: run.state.to_string(),
        });
    }
    Ok(())
}

/// Explain why a guarded transition matched no row.
fn stuck_transition(conn: &Connection, run_id: i64, target: RunState) -> StrataError {
    match get(conn, run_id) {
        Ok(existing) if existing.state.is_terminal() => StrataError::RunFinished {
            run_id,
            state: existing.state.to_string(),
        },
        Ok(existing) => match existing.state.can_transition_to(target) {
            Ok(()) => {
                StrataError::Internal(anyhow!("run {run_id} update raced another writer"))
            }
            Err(err) => StrataError::Internal(anyhow!("{err}")),
        },
        Err(err) => err,
    }
}
