//! Event index schema.
//!
//! One SQLite database holds every index; an index is the set of rows
//! sharing an `index_id`. Events are append-only: there is no UPDATE path
//! and therefore no update trigger on the FTS table.

/// Migration v1: the events table.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS events (
    index_id TEXT NOT NULL CHECK (index_id LIKE 'idx-%'),
    doc_id TEXT NOT NULL CHECK (doc_id LIKE 'ev-%'),
    ts_us INTEGER NOT NULL,
    message TEXT NOT NULL CHECK (length(trim(message)) > 0),
    source_type TEXT NOT NULL DEFAULT '',
    attrs TEXT NOT NULL DEFAULT '{}',
    UNIQUE (index_id, doc_id)
);

CREATE INDEX IF NOT EXISTS idx_events_index_ts
    ON events(index_id, ts_us);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO store_meta (id, schema_version) VALUES (1, 1);
";

/// Migration v2: FTS5 table and sync triggers.
pub const MIGRATION_V2_SQL: &str = r"
CREATE VIRTUAL TABLE IF NOT EXISTS events_fts USING fts5(
    message,
    source_type,
    attrs,
    tokenize='porter unicode61',
    prefix='2 3'
);

CREATE TRIGGER IF NOT EXISTS events_ai
AFTER INSERT ON events
BEGIN
    INSERT INTO events_fts(rowid, message, source_type, attrs)
    VALUES (new.rowid, new.message, new.source_type, new.attrs);
END;

CREATE TRIGGER IF NOT EXISTS events_ad
AFTER DELETE ON events
BEGIN
    DELETE FROM events_fts WHERE rowid = old.rowid;
END;

DELETE FROM events_fts;
INSERT INTO events_fts(rowid, message, source_type, attrs)
SELECT rowid, message, source_type, attrs FROM events;

UPDATE store_meta SET schema_version = 2 WHERE id = 1;
";

/// BM25 column weights: message carries most of the signal.
pub const BM25_WEIGHT_MESSAGE: f64 = 3.0;
pub const BM25_WEIGHT_SOURCE_TYPE: f64 = 1.0;
pub const BM25_WEIGHT_ATTRS: f64 = 1.0;
