//! Sketch rows: workspace CRUD, sharing, and timeline attachment.
//!
//! All mutating operations take the acting user and enforce the sketch role
//! model before touching rows.

use crate::acl::{self, Access};
use crate::error::{Result, StrataError};
use crate::model::{ImportStatus, Sketch, Visibility};
use anyhow::{Context, anyhow};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;

/// Create a new sketch owned by `owner`.
///
/// # Errors
///
/// Returns `Validation` for a blank name or owner.
pub fn create(
    conn: &Connection,
    name: &str,
    description: &str,
    owner: &str,
    now_us: i64,
) -> Result<Sketch> {
    if name.trim().is_empty() {
        return Err(StrataError::Validation("sketch name is empty".into()));
    }
    if owner.trim().is_empty() {
        return Err(StrataError::Validation("sketch owner is empty".into()));
    }

    conn.execute(
        "INSERT INTO sketches (name, description, owner, created_at_us)
         VALUES (?1, ?2, ?3, ?4)",
        params![name, description, owner, now_us],
    )
    .context("insert sketch row")?;

    let sketch_id = conn.last_insert_rowid();
    info!(sketch_id, owner, "sketch created");
    get(conn, sketch_id)
}

/// Fetch one sketch with collaborators and attached timelines.
///
/// # Errors
///
/// Returns `NotFound` for an unknown id.
pub fn get(conn: &Connection, sketch_id: i64) -> Result<Sketch> {
    let base = conn
        .query_row(
            "SELECT sketch_id, name, description, owner, visibility, created_at_us
             FROM sketches
             WHERE sketch_id = ?1",
            params![sketch_id],
            |row| {
                Ok((
                    row.get::<_, i64>("sketch_id")?,
                    row.get::<_, String>("name")?,
                    row.get::<_, String>("description")?,
                    row.get::<_, String>("owner")?,
                    row.get::<_, String>("visibility")?,
                    row.get::<_, i64>("created_at_us")?,
                ))
            },
        )
        .optional()
        .context("query sketch by id")?;

    let Some((sketch_id, name, description, owner, visibility_raw, created_at_us)) = base else {
        return Err(StrataError::not_found("sketch", sketch_id));
    };

    let visibility: Visibility = visibility_raw
        .parse()
        .map_err(|err| StrataError::Internal(anyhow!("{err}")))?;

    let mut stmt = conn
        .prepare("SELECT user FROM sketch_collaborators WHERE sketch_id = ?1")
        .context("prepare collaborator list")?;
    let collaborators = stmt
        .query_map(params![sketch_id], |row| row.get::<_, String>(0))
        .context("query collaborators")?
        .collect::<rusqlite::Result<_>>()
        .context("read collaborator rows")?;

    let mut stmt = conn
        .prepare(
            "SELECT timeline_id
             FROM sketch_timelines
             WHERE sketch_id = ?1
             ORDER BY position ASC",
        )
        .context("prepare attached timeline list")?;
    let timeline_ids = stmt
        .query_map(params![sketch_id], |row| row.get::<_, i64>(0))
        .context("query attached timelines")?
        .collect::<rusqlite::Result<_>>()
        .context("read attached timeline rows")?;

    Ok(Sketch {
        sketch_id,
        name,
        description,
        owner,
        visibility,
        collaborators,
        timeline_ids,
        created_at_us,
    })
}

/// List sketches visible to `user`: owned, shared with them, or public.
///
/// # Errors
///
/// Returns `Internal` on storage failure.
pub fn list_visible(conn: &Connection, user: &str) -> Result<Vec<Sketch>> {
    let mut stmt = conn
        .prepare(
            "SELECT s.sketch_id
             FROM sketches s
             WHERE s.owner = ?1
                OR s.visibility = 'public'
                OR EXISTS(
                    SELECT 1 FROM sketch_collaborators c
                    WHERE c.sketch_id = s.sketch_id AND c.user = ?1
                )
             ORDER BY s.created_at_us DESC, s.sketch_id DESC",
        )
        .context("prepare visible sketch list")?;

    let ids: Vec<i64> = stmt
        .query_map(params![user], |row| row.get(0))
        .context("query visible sketches")?
        .collect::<rusqlite::Result<_>>()
        .context("read visible sketch ids")?;

    ids.into_iter().map(|id| get(conn, id)).collect()
}

/// Attach a `ready` timeline to a sketch. Attaching an already-attached
/// timeline is a no-op.
///
/// # Errors
///
/// - `Permission` unless `acting_user` is owner or collaborator
/// - `NotReady` when the timeline has not finished importing
/// - `NotFound` for unknown sketch or timeline ids
pub fn attach_timeline(
    conn: &Connection,
    sketch_id: i64,
    timeline_id: i64,
    acting_user: &str,
    now_us: i64,
) -> Result<()> {
    let sketch = get(conn, sketch_id)?;
    acl::require(&sketch, acting_user, Access::Write)?;

    let timeline = super::timelines::get(conn, timeline_id)?;
    if timeline.status != ImportStatus::Ready {
        return Err(StrataError::NotReady {
            timeline_id,
            status: timeline.status.to_string(),
        });
    }

    let next_position: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(position) + 1, 0)
             FROM sketch_timelines
             WHERE sketch_id = ?1",
            params![sketch_id],
            |row| row.get(0),
        )
        .context("compute attach position")?;

    conn.execute(
        "INSERT OR IGNORE INTO sketch_timelines (sketch_id, timeline_id, position, added_at_us)
         VALUES (?1, ?2, ?3, ?4)",
        params![sketch_id, timeline_id, next_position, now_us],
    )
    .context("attach timeline to sketch")?;

    info!(sketch_id, timeline_id, "timeline attached");
    Ok(())
}

/// Resolve the sketch's attached timelines to ready index ids, in attach
/// order.
///
/// # Errors
///
/// Returns `Internal` on storage failure.
pub fn ready_index_ids(conn: &Connection, sketch_id: i64) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT t.index_id
             FROM sketch_timelines st
             INNER JOIN timelines t ON t.timeline_id = st.timeline_id
             WHERE st.sketch_id = ?1 AND t.status = 'ready'
             ORDER BY st.position ASC",
        )
        .context("prepare index id resolution")?;

    let ids = stmt
        .query_map(params![sketch_id], |row| row.get::<_, String>(0))
        .context("query index ids")?
        .collect::<rusqlite::Result<_>>()
        .context("read index id rows")?;
    Ok(ids)
}

/// Add a collaborator. Owner only. Adding an existing collaborator is a
/// no-op.
///
/// # Errors
///
/// `Permission` unless `acting_user` owns the sketch; `Validation` for a
/// blank user.
pub fn add_collaborator(
    conn: &Connection,
    sketch_id: i64,
    user: &str,
    acting_user: &str,
    now_us: i64,
) -> Result<()> {
    if user.trim().is_empty() {
        return Err(StrataError::Validation("collaborator user is empty".into()));
    }
    let sketch = get(conn, sketch_id)?;
    acl::require(&sketch, acting_user, Access::Admin)?;

    conn.execute(
        "INSERT OR IGNORE INTO sketch_collaborators (sketch_id, user, added_at_us)
         VALUES (?1, ?2, ?3)",
        params![sketch_id, user, now_us],
    )
    .context("insert collaborator")?;

    info!(sketch_id, user, "collaborator added");
    Ok(())
}

/// Change sketch visibility. Owner only.
///
/// # Errors
///
/// `Permission` unless `acting_user` owns the sketch.
pub fn set_visibility(
    conn: &Connection,
    sketch_id: i64,
    visibility: Visibility,
    acting_user: &str,
) -> Result<()> {
    let sketch = get(conn, sketch_id)?;
    acl::require(&sketch, acting_user, Access::Admin)?;

    conn.execute(
        "UPDATE sketches SET visibility = ?2 WHERE sketch_id = ?1",
        params![sketch_id, visibility.to_string()],
    )
    .context("update sketch visibility")?;

    info!(sketch_id, %visibility, "sketch visibility changed");
    Ok(())
}

/// Delete a sketch and everything it owns (annotations, saved searches,
/// analyzer runs — via `ON DELETE CASCADE`). Timelines survive.
///
/// # Errors
///
/// `Permission` unless `acting_user` owns the sketch.
pub fn delete(conn: &Connection, sketch_id: i64, acting_user: &str) -> Result<()> {
    let sketch = get(conn, sketch_id)?;
    acl::require(&sketch, acting_user, Access::Admin)?;

    conn.execute("DELETE FROM sketches WHERE sketch_id = ?1", params![sketch_id])
        .context("delete sketch row")?;

    info!(sketch_id, "sketch deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{migrations, timelines};

    fn conn() -> Connection {
        let mut conn = Connection::open_in_memory().expect("open in-memory db");
        conn.pragma_update(None, "foreign_keys", "ON")
            .expect("enable fk");
        migrations::migrate(&mut conn).expect("migrate");
        conn
    }

    fn ready_timeline(conn: &Connection, name: &str, index_id: &str) -> i64 {
        let timeline =
            timelines::create_importing(conn, name, index_id, "alice", 1).expect("create");
        timelines::mark_ready(conn, timeline.timeline_id, 10, 0, 2).expect("ready");
        timeline.timeline_id
    }

    #[test]
    fn create_and_get_roundtrip() {
        let conn = conn();
        let sketch = create(&conn, "intrusion", "march case", "alice", 100).expect("create");
        assert_eq!(sketch.name, "intrusion");
        assert_eq!(sketch.owner, "alice");
        assert_eq!(sketch.visibility, Visibility::Private);
        assert!(sketch.collaborators.is_empty());
        assert!(sketch.timeline_ids.is_empty());
    }

    #[test]
    fn attach_requires_ready_timeline() {
        let conn = conn();
        let sketch = create(&conn, "case", "", "alice", 100).expect("create");
        let importing =
            timelines::create_importing(&conn, "laptop", "idx-0001", "alice", 1).expect("create");

        let result = attach_timeline(&conn, sketch.sketch_id, importing.timeline_id, "alice", 5);
        assert!(matches!(result, Err(StrataError::NotReady { .. })));

        timelines::mark_ready(&conn, importing.timeline_id, 10, 0, 2).expect("ready");
        attach_timeline(&conn, sketch.sketch_id, importing.timeline_id, "alice", 5)
            .expect("attach after ready");

        let loaded = get(&conn, sketch.sketch_id).expect("get");
        assert_eq!(loaded.timeline_ids, vec![importing.timeline_id]);
    }

    #[test]
    fn attach_requires_write_access() {
        let conn = conn();
        let sketch = create(&conn, "case", "", "alice", 100).expect("create");
        let timeline_id = ready_timeline(&conn, "laptop", "idx-0001");

        let result = attach_timeline(&conn, sketch.sketch_id, timeline_id, "mallory", 5);
        assert!(matches!(result, Err(StrataError::Permission { .. })));

        add_collaborator(&conn, sketch.sketch_id, "bob", "alice", 6).expect("share");
        attach_timeline(&conn, sketch.sketch_id, timeline_id, "bob", 7)
            .expect("collaborator attach");
    }

    #[test]
    fn attach_is_idempotent_and_ordered() {
        let conn = conn();
        let sketch = create(&conn, "case", "", "alice", 100).expect("create");
        let first = ready_timeline(&conn, "laptop", "idx-0001");
        let second = ready_timeline(&conn, "server", "idx-0002");

        attach_timeline(&conn, sketch.sketch_id, second, "alice", 5).expect("attach");
        attach_timeline(&conn, sketch.sketch_id, first, "alice", 6).expect("attach");
        attach_timeline(&conn, sketch.sketch_id, second, "alice", 7).expect("re-attach");

        let loaded = get(&conn, sketch.sketch_id).expect("get");
        assert_eq!(loaded.timeline_ids, vec![second, first]);

        let index_ids = ready_index_ids(&conn, sketch.sketch_id).expect("resolve");
        assert_eq!(index_ids, vec!["idx-0002".to_string(), "idx-0001".to_string()]);
    }

    #[test]
    fn visibility_and_collaborators_gate_listing() {
        let conn = conn();
        let mine = create(&conn, "mine", "", "alice", 100).expect("create");
        let theirs = create(&conn, "theirs", "", "carol", 100).expect("create");
        let open = create(&conn, "open", "", "carol", 100).expect("create");
        set_visibility(&conn, open.sketch_id, Visibility::Public, "carol").expect("publish");
        add_collaborator(&conn, theirs.sketch_id, "alice", "carol", 5).expect("share");

        let visible = list_visible(&conn, "alice").expect("list");
        let ids: Vec<i64> = visible.iter().map(|s| s.sketch_id).collect();
        assert!(ids.contains(&mine.sketch_id));
        assert!(ids.contains(&theirs.sketch_id));
        assert!(ids.contains(&open.sketch_id));

        let stranger = list_visible(&conn, "mallory").expect("list");
        let ids: Vec<i64> = stranger.iter().map(|s| s.sketch_id).collect();
        assert_eq!(ids, vec![open.sketch_id]);
    }

    #[test]
    fn only_owner_shares_or_deletes() {
        let conn = conn();
        let sketch = create(&conn, "case", "", "alice", 100).expect("create");
        add_collaborator(&conn, sketch.sketch_id, "bob", "alice", 5).expect("share");

        let result = add_collaborator(&conn, sketch.sketch_id, "carol", "bob", 6);
        assert!(matches!(result, Err(StrataError::Permission { .. })));

        let result = delete(&conn, sketch.sketch_id, "bob");
        assert!(matches!(result, Err(StrataError::Permission { .. })));

        delete(&conn, sketch.sketch_id, "alice").expect("owner delete");
        assert!(matches!(
            get(&conn, sketch.sketch_id),
            Err(StrataError::NotFound { .. })
        ));
    }

    #[test]
    fn deleting_sketch_keeps_timelines() {
        let conn = conn();
        let sketch = create(&conn, "case", "", "alice", 100).expect("create");
        let timeline_id = ready_timeline(&conn, "laptop", "idx-0001");
        attach_timeline(&conn, sketch.sketch_id, timeline_id, "alice", 5).expect("attach");

        delete(&conn, sketch.sketch_id, "alice").expect("delete");
        timelines::get(&conn, timeline_id).expect("timeline survives sketch deletion");
    }
}
