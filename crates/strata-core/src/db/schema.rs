//! Canonical SQLite schema for the strata metadata store.
//!
//! The metadata store holds everything except raw events:
//! - `timelines` tracks imports and their index bindings
//! - `sketches` plus edge tables (`sketch_collaborators`, `sketch_timelines`)
//!   model the collaborative workspace
//! - annotation tables (`event_tags`, `event_stars`, `event_comments`) key
//!   all collaboration state by (sketch, index, doc) so sketches sharing a
//!   timeline stay isolated
//! - `saved_searches` and `analyzer_runs` preserve query and execution
//!   history

/// Migration v1: core normalized tables.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS timelines (
    timeline_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    index_id TEXT NOT NULL UNIQUE CHECK (index_id LIKE 'idx-%'),
    status TEXT NOT NULL DEFAULT 'importing' CHECK (status IN ('importing', 'ready', 'failed')),
    error_detail TEXT,
    malformed_count INTEGER NOT NULL DEFAULT 0,
    event_count INTEGER NOT NULL DEFAULT 0,
    created_by TEXT NOT NULL,
    created_at_us INTEGER NOT NULL,
    finished_at_us INTEGER
);

CREATE TABLE IF NOT EXISTS sketches (
    sketch_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    description TEXT NOT NULL DEFAULT '',
    owner TEXT NOT NULL CHECK (length(trim(owner)) > 0),
    visibility TEXT NOT NULL DEFAULT 'private' CHECK (visibility IN ('private', 'shared', 'public')),
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sketch_collaborators (
    sketch_id INTEGER NOT NULL REFERENCES sketches(sketch_id) ON DELETE CASCADE,
    user TEXT NOT NULL CHECK (length(trim(user)) > 0),
    added_at_us INTEGER NOT NULL,
    PRIMARY KEY (sketch_id, user)
);

CREATE TABLE IF NOT EXISTS sketch_timelines (
    sketch_id INTEGER NOT NULL REFERENCES sketches(sketch_id) ON DELETE CASCADE,
    timeline_id INTEGER NOT NULL REFERENCES timelines(timeline_id),
    position INTEGER NOT NULL,
    added_at_us INTEGER NOT NULL,
    PRIMARY KEY (sketch_id, timeline_id)
);

CREATE TABLE IF NOT EXISTS event_tags (
    sketch_id INTEGER NOT NULL REFERENCES sketches(sketch_id) ON DELETE CASCADE,
    index_id TEXT NOT NULL,
    doc_id TEXT NOT NULL,
    tag TEXT NOT NULL CHECK (length(trim(tag)) > 0),
    created_by TEXT NOT NULL,
    created_at_us INTEGER NOT NULL,
    PRIMARY KEY (sketch_id, index_id, doc_id, tag)
);

CREATE TABLE IF NOT EXISTS event_stars (
    sketch_id INTEGER NOT NULL REFERENCES sketches(sketch_id) ON DELETE CASCADE,
    index_id TEXT NOT NULL,
    doc_id TEXT NOT NULL,
    user TEXT NOT NULL,
    created_at_us INTEGER NOT NULL,
    PRIMARY KEY (sketch_id, index_id, doc_id, user)
);

CREATE TABLE IF NOT EXISTS event_comments (
    comment_id INTEGER PRIMARY KEY AUTOINCREMENT,
    sketch_id INTEGER NOT NULL REFERENCES sketches(sketch_id) ON DELETE CASCADE,
    index_id TEXT NOT NULL,
    doc_id TEXT NOT NULL,
    seq INTEGER NOT NULL,
    author TEXT NOT NULL,
    body TEXT NOT NULL CHECK (length(trim(body)) > 0),
    created_at_us INTEGER NOT NULL,
    UNIQUE (sketch_id, index_id, doc_id, seq)
);

CREATE TABLE IF NOT EXISTS saved_searches (
    search_id INTEGER PRIMARY KEY AUTOINCREMENT,
    sketch_id INTEGER NOT NULL REFERENCES sketches(sketch_id) ON DELETE CASCADE,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    query_text TEXT NOT NULL DEFAULT '',
    filter_json TEXT,
    created_by TEXT NOT NULL,
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS analyzer_runs (
    run_id INTEGER PRIMARY KEY AUTOINCREMENT,
    sketch_id INTEGER NOT NULL REFERENCES sketches(sketch_id) ON DELETE CASCADE,
    analyzer TEXT NOT NULL CHECK (length(trim(analyzer)) > 0),
    timeline_scope TEXT,
    state TEXT NOT NULL DEFAULT 'pending' CHECK (state IN ('pending', 'started', 'done', 'error')),
    result_summary TEXT NOT NULL DEFAULT '',
    finding_count INTEGER NOT NULL DEFAULT 0,
    error_detail TEXT,
    created_at_us INTEGER NOT NULL,
    started_at_us INTEGER,
    finished_at_us INTEGER
);

CREATE TABLE IF NOT EXISTS metadata_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO metadata_meta (id, schema_version) VALUES (1, 1);
";

/// Migration v2: read-path indexes.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_timelines_status
    ON timelines(status, created_at_us DESC);

CREATE INDEX IF NOT EXISTS idx_sketch_timelines_timeline
    ON sketch_timelines(timeline_id);

CREATE INDEX IF NOT EXISTS idx_event_tags_sketch_event
    ON event_tags(sketch_id, index_id, doc_id);

CREATE INDEX IF NOT EXISTS idx_event_tags_tag
    ON event_tags(sketch_id, tag);

CREATE INDEX IF NOT EXISTS idx_event_stars_sketch_event
    ON event_stars(sketch_id, index_id, doc_id);

CREATE INDEX IF NOT EXISTS idx_event_comments_sketch_event_seq
    ON event_comments(sketch_id, index_id, doc_id, seq);

CREATE INDEX IF NOT EXISTS idx_saved_searches_sketch
    ON saved_searches(sketch_id, created_at_us DESC);

CREATE INDEX IF NOT EXISTS idx_analyzer_runs_sketch_state
    ON analyzer_runs(sketch_id, state, created_at_us DESC);

UPDATE metadata_meta SET schema_version = 2 WHERE id = 1;
";

/// Indexes expected by the read paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_timelines_status",
    "idx_sketch_timelines_timeline",
    "idx_event_tags_sketch_event",
    "idx_event_tags_tag",
    "idx_event_stars_sketch_event",
    "idx_event_comments_sketch_event_seq",
    "idx_saved_searches_sketch",
    "idx_analyzer_runs_sketch_state",
];

#[cfg(test)]
mod tests {
    use crate::db::migrations;
    use rusqlite::{Connection, params};

    fn seeded_conn() -> rusqlite::Result<Connection> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::migrate(&mut conn)?;

        conn.execute(
            "INSERT INTO sketches (name, owner, created_at_us) VALUES ('case-a', 'alice', 1)",
            [],
        )?;
        conn.execute(
            "INSERT INTO timelines (name, index_id, status, created_by, created_at_us)
             VALUES ('laptop', 'idx-0001', 'ready', 'alice', 1)",
            [],
        )?;

        for n in 0..24_u32 {
            conn.execute(
                "INSERT INTO event_tags (sketch_id, index_id, doc_id, tag, created_by, created_at_us)
                 VALUES (1, 'idx-0001', ?1, ?2, 'alice', ?3)",
                params![
                    format!("ev-{n:04x}"),
                    if n % 2 == 0 { "suspicious" } else { "reviewed" },
                    i64::from(n)
                ],
            )?;
        }

        Ok(conn)
    }

    fn query_plan_details(conn: &Connection, sql: &str) -> rusqlite::Result<Vec<String>> {
        let mut stmt = conn.prepare(&format!("EXPLAIN QUERY PLAN {sql}"))?;
        stmt.query_map([], |row| row.get::<_, String>(3))?
            .collect::<Result<Vec<_>, _>>()
    }

    #[test]
    fn query_plan_uses_tag_event_index() -> rusqlite::Result<()> {
        let conn = seeded_conn()?;
        let details = query_plan_details(
            &conn,
            "SELECT tag
             FROM event_tags
             WHERE sketch_id = 1 AND index_id = 'idx-0001' AND doc_id = 'ev-0002'",
        )?;

        assert!(
            details.iter().any(|detail| {
                detail.contains("idx_event_tags_sketch_event")
                    || detail.contains("sqlite_autoindex_event_tags")
            }),
            "expected tag lookup index in plan, got: {details:?}"
        );

        Ok(())
    }

    #[test]
    fn duplicate_tag_insert_conflicts_on_primary_key() -> rusqlite::Result<()> {
        let conn = seeded_conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO event_tags
                 (sketch_id, index_id, doc_id, tag, created_by, created_at_us)
             VALUES (1, 'idx-0001', 'ev-0000', 'suspicious', 'bob', 99)",
            [],
        )?;
        assert_eq!(inserted, 0, "duplicate tag must be ignored, not doubled");
        Ok(())
    }

    #[test]
    fn blank_comment_body_is_rejected_by_schema() -> rusqlite::Result<()> {
        let conn = seeded_conn()?;
        let result = conn.execute(
            "INSERT INTO event_comments
                 (sketch_id, index_id, doc_id, seq, author, body, created_at_us)
             VALUES (1, 'idx-0001', 'ev-0000', 1, 'alice', '   ', 1)",
            [],
        );
        assert!(result.is_err(), "blank body must violate the CHECK constraint");
        Ok(())
    }

    #[test]
    fn deleting_sketch_cascades_to_annotations() -> rusqlite::Result<()> {
        let conn = seeded_conn()?;
        conn.execute("DELETE FROM sketches WHERE sketch_id = 1", [])?;
        let remaining: i64 =
            conn.query_row("SELECT COUNT(*) FROM event_tags", [], |row| row.get(0))?;
        assert_eq!(remaining, 0);

        let timelines: i64 =
            conn.query_row("SELECT COUNT(*) FROM timelines", [], |row| row.get(0))?;
        assert_eq!(timelines, 1, "timelines are non-owned references");
        Ok(())
    }
}
