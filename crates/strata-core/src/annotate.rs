//! Annotation layer: tags, stars, and comments on indexed events.
//!
//! Every operation is scoped to one sketch. Two sketches referencing the
//! same timeline carry fully independent annotation sets; nothing here ever
//! touches an indexed document.
//!
//! Concurrency notes:
//! - tag add/remove is commutative and idempotent (`INSERT OR IGNORE` /
//!   plain `DELETE`), so concurrent writers converge
//! - comment `seq` is assigned inside the INSERT statement itself, so the
//!   per-(sketch, event) order is serialized by the single SQLite writer

use crate::acl::{self, Access, Actor};
use crate::db::sketches;
use crate::error::{Result, StrataError};
use crate::model::{Comment, EventAnnotations, EventRef};
use anyhow::Context;
use rusqlite::{Connection, params};
use tracing::debug;

/// Upper bound on comment body size, matching the API layer's limit.
pub const MAX_COMMENT_BODY_CHARS: usize = 8_192;

/// Add `tag` to an event. Adding an existing tag is a no-op.
///
/// Returns `true` when the tag was newly added.
///
/// # Errors
///
/// `Validation` for a blank tag; `Permission` when a user actor lacks write
/// access.
pub fn add_tag(
    conn: &Connection,
    sketch_id: i64,
    event: &EventRef,
    tag: &str,
    actor: Actor<'_>,
    now_us: i64,
) -> Result<bool> {
    if tag.trim().is_empty() {
        return Err(StrataError::Validation("tag is empty".into()));
    }

    let sketch = sketches::get(conn, sketch_id)?;
    acl::require_actor(&sketch, actor, Access::Write)?;

    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO event_tags
                 (sketch_id, index_id, doc_id, tag, created_by, created_at_us)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                sketch_id,
                event.index_id,
                event.doc_id,
                tag,
                actor.author(),
                now_us
            ],
        )
        .context("insert event tag")?;

    debug!(sketch_id, %event, tag, added = inserted > 0, "tag add");
    Ok(inserted > 0)
}

/// Remove `tag` from an event. Removing a non-member tag is a no-op.
///
/// Returns `true` when a tag was actually removed.
///
/// # Errors
///
/// `Permission` when a user actor lacks write access.
pub fn remove_tag(
    conn: &Connection,
    sketch_id: i64,
    event: &EventRef,
    tag: &str,
    actor: Actor<'_>,
) -> Result<bool> {
    let sketch = sketches::get(conn, sketch_id)?;
    acl::require_actor(&sketch, actor, Access::Write)?;

    let removed = conn
        .execute(
            "DELETE FROM event_tags
             WHERE sketch_id = ?1 AND index_id = ?2 AND doc_id = ?3 AND tag = ?4",
            params![sketch_id, event.index_id, event.doc_id, tag],
        )
        .context("delete event tag")?;

    debug!(sketch_id, %event, tag, removed = removed > 0, "tag remove");
    Ok(removed > 0)
}

/// Flip the star of `user` on an event; returns the new state.
///
/// Stars are per (user, event) within the sketch — analyzers do not star.
///
/// # Errors
///
/// `Permission` when `user` lacks write access.
pub fn toggle_star(
    conn: &Connection,
    sketch_id: i64,
    event: &EventRef,
    user: &str,
    now_us: i64,
) -> Result<bool> {
    let sketch = sketches::get(conn, sketch_id)?;
    acl::require(&sketch, user, Access::Write)?;

    let removed = conn
        .execute(
            "DELETE FROM event_stars
             WHERE sketch_id = ?1 AND index_id = ?2 AND doc_id = ?3 AND user = ?4",
            params![sketch_id, event.index_id, event.doc_id, user],
        )
        .context("delete event star")?;

    if removed > 0 {
        return Ok(false);
    }

    conn.execute(
        "INSERT INTO event_stars (sketch_id, index_id, doc_id, user, created_at_us)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![sketch_id, event.index_id, event.doc_id, user, now_us],
    )
    .context("insert event star")?;
    Ok(true)
}

/// Append a comment to an event's comment sequence.
///
/// The sequence number is assigned server-side inside the INSERT, so
/// concurrent appends from multiple writers never collide and read back in
/// a stable order.
///
/// # Errors
///
/// `Validation` for a blank or oversized body; `Permission` when a user
/// actor lacks write access.
pub fn add_comment(
    conn: &Connection,
    sketch_id: i64,
    event: &EventRef,
    body: &str,
    actor: Actor<'_>,
    now_us: i64,
) -> Result<Comment> {
    if body.trim().is_empty() {
        return Err(StrataError::Validation("comment body is empty".into()));
    }
    if body.chars().count() > MAX_COMMENT_BODY_CHARS {
        return Err(StrataError::Validation(format!(
            "comment body exceeds {MAX_COMMENT_BODY_CHARS} characters"
        )));
    }

    let sketch = sketches::get(conn, sketch_id)?;
    acl::require_actor(&sketch, actor, Access::Write)?;

    conn.execute(
        "INSERT INTO event_comments
             (sketch_id, index_id, doc_id, seq, author, body, created_at_us)
         VALUES (
             ?1, ?2, ?3,
             (SELECT COALESCE(MAX(seq), 0) + 1
              FROM event_comments
              WHERE sketch_id = ?1 AND index_id = ?2 AND doc_id = ?3),
             ?4, ?5, ?6
         )",
        params![
            sketch_id,
            event.index_id,
            event.doc_id,
            actor.author(),
            body,
            now_us
        ],
    )
    .context("insert event comment")?;

    let comment_id = conn.last_insert_rowid();
    conn.query_row(
        "SELECT comment_id, seq, author, body, created_at_us
         FROM event_comments
         WHERE comment_id = ?1",
        params![comment_id],
        |row| {
            Ok(Comment {
                comment_id: row.get(0)?,
                seq: row.get(1)?,
                author: row.get(2)?,
                body: row.get(3)?,
                created_at_us: row.get(4)?,
            })
        },
    )
    .context("read back inserted comment")
    .map_err(StrataError::from)
}

/// Everything annotated on one event under one sketch.
///
/// Comments come back ordered by their server-assigned sequence.
///
/// # Errors
///
/// `Permission` when `acting_user` cannot read the sketch.
pub fn list(
    conn: &Connection,
    sketch_id: i64,
    event: &EventRef,
    acting_user: &str,
) -> Result<EventAnnotations> {
    let sketch = sketches::get(conn, sketch_id)?;
    acl::require(&sketch, acting_user, Access::Read)?;

    let mut annotations = EventAnnotations::default();

    {
        let mut stmt = conn
            .prepare(
                "SELECT tag FROM event_tags
                 WHERE sketch_id = ?1 AND index_id = ?2 AND doc_id = ?3",
            )
            .context("prepare tag list")?;
        let tags = stmt
            .query_map(
                params![sketch_id, event.index_id, event.doc_id],
                |row| row.get::<_, String>(0),
            )
            .context("query tags")?;
        for tag in tags {
            annotations.tags.insert(tag.context("read tag row")?);
        }
    }

    {
        let mut stmt = conn
            .prepare(
                "SELECT user FROM event_stars
                 WHERE sketch_id = ?1 AND index_id = ?2 AND doc_id = ?3",
            )
            .context("prepare star list")?;
        let stars = stmt
            .query_map(
                params![sketch_id, event.index_id, event.doc_id],
                |row| row.get::<_, String>(0),
            )
            .context("query stars")?;
        for user in stars {
            annotations.starred_by.insert(user.context("read star row")?);
        }
    }

    let mut stmt = conn
        .prepare(
            "SELECT comment_id, seq, author, body, created_at_us
             FROM event_comments
             WHERE sketch_id = ?1 AND index_id = ?2 AND doc_id = ?3
             ORDER BY seq ASC",
        )
        .context("prepare comment list")?;
    let comments = stmt
        .query_map(params![sketch_id, event.index_id, event.doc_id], |row| {
            Ok(Comment {
                comment_id: row.get(0)?,
                seq: row.get(1)?,
                author: row.get(2)?,
                body: row.get(3)?,
                created_at_us: row.get(4)?,
            })
        })
        .context("query comments")?;
    for comment in comments {
        annotations.comments.push(comment.context("read comment row")?);
    }

    Ok(annotations)
}
