//! Saved search rows.

use crate::acl::{self, Access, Actor};
use crate::error::{Result, StrataError};
use crate::model::SavedSearch;
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;

fn search_from_row(row: &Row<'_>) -> rusqlite::Result<SavedSearch> {
    Ok(SavedSearch {
        search_id: row.get("search_id")?,
        sketch_id: row.get("sketch_id")?,
        name: row.get("name")?,
        query_text: row.get("query_text")?,
        filter_json: row.get("filter_json")?,
        created_by: row.get("created_by")?,
        created_at_us: row.get("created_at_us")?,
    })
}

/// Persist a named search under a sketch.
///
/// # Errors
///
/// `Validation` for a blank name; `Permission` when a user actor lacks
/// write access.
pub fn create(
    conn: &Connection,
    sketch_id: i64,
    name: &str,
    query_text: &str,
    filter_json: Option<&str>,
    actor: Actor<'_>,
    now_us: i64,
) -> Result<SavedSearch> {
    if name.trim().is_empty() {
        return Err(StrataError::Validation("saved search name is empty".into()));
    }

    let sketch = super::sketches::get(conn, sketch_id)?;
    acl::require_actor(&sketch, actor, Access::Write)?;

    conn.execute(
        "INSERT INTO saved_searches (sketch_id, name, query_text, filter_json, created_by, created_at_us)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![sketch_id, name, query_text, filter_json, actor.author(), now_us],
    )
    .context("insert saved search")?;

    let search_id = conn.last_insert_rowid();
    info!(sketch_id, search_id, name, "saved search created");
    get(conn, search_id)
}

/// Fetch one saved search by id.
///
/// # Errors
///
/// `NotFound` for an unknown id.
pub fn get(conn: &Connection, search_id: i64) -> Result<SavedSearch> {
    conn.query_row(
        "SELECT search_id, sketch_id, name, query_text, filter_json, created_by, created_at_us
         FROM saved_searches
         WHERE search_id = ?1",
        params![search_id],
        search_from_row,
    )
    .optional()
    .context("query saved search")?
    .ok_or_else(|| StrataError::not_found("saved search", search_id))
}

/// List a sketch's saved searches, newest first.
///
/// # Errors
///
/// `Permission` when `acting_user` cannot read the sketch.
pub fn list(conn: &Connection, sketch_id: i64, acting_user: &str) -> Result<Vec<SavedSearch>> {
    let sketch = super::sketches::get(conn, sketch_id)?;
    acl::require(&sketch, acting_user, Access::Read)?;

    let mut stmt = conn
        .prepare(
            "SELECT search_id, sketch_id, name, query_text, filter_json, created_by, created_at_us
             FROM saved_searches
             WHERE sketch_id = ?1
             ORDER BY created_at_us DESC, search_id DESC",
        )
        .context("prepare saved search list")?;

    let rows = stmt
        .query_map(params![sketch_id], search_from_row)
        .context("query saved searches")?
        .collect::<rusqlite::Result<_>>()
        .context("read saved search rows")?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{migrations, sketches};

    fn conn() -> Connection {
        let mut conn = Connection::open_in_memory().expect("open in-memory db");
        conn.pragma_update(None, "foreign_keys", "ON")
            .expect("enable fk");
        migrations::migrate(&mut conn).expect("migrate");
        conn
    }

    #[test]
    fn user_and_run_actors_both_create() {
        let conn = conn();
        let sketch = sketches::create(&conn, "case", "", "alice", 1).expect("create sketch");

        let by_user = create(
            &conn,
            sketch.sketch_id,
            "failed logons",
            "logon failed",
            None,
            Actor::User("alice"),
            10,
        )
        .expect("user create");
        assert_eq!(by_user.created_by, "alice");

        let by_run = create(
            &conn,
            sketch.sketch_id,
            "signature: psexec",
            "psexec",
            Some(r#"{"kind":"contains","field":"message","value":"psexec"}"#),
            Actor::Run {
                analyzer: "signature",
                run_id: 7,
            },
            11,
        )
        .expect("run create");
        assert_eq!(by_run.created_by, "analyzer:signature:7");

        let listed = list(&conn, sketch.sketch_id, "alice").expect("list");
        assert_eq!(listed.len(), 2);
    }

    #[test]
    fn stranger_cannot_create_or_list() {
        let conn = conn();
        let sketch = sketches::create(&conn, "case", "", "alice", 1).expect("create sketch");

        let result = create(
            &conn,
            sketch.sketch_id,
            "sneaky",
            "x",
            None,
            Actor::User("mallory"),
            10,
        );
        assert!(matches!(result, Err(StrataError::Permission { .. })));

        let result = list(&conn, sketch.sketch_id, "mallory");
        assert!(matches!(result, Err(StrataError::Permission { .. })));
    }

    #[test]
    fn blank_name_is_rejected() {
        let conn = conn();
        let sketch = sketches::create(&conn, "case", "", "alice", 1).expect("create sketch");
        let result = create(
            &conn,
            sketch.sketch_id,
            "  ",
            "q",
            None,
            Actor::User("alice"),
            10,
        );
        assert!(matches!(result, Err(StrataError::Validation(_))));
    }
}
