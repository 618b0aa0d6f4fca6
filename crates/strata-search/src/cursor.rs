//! Lazy, restartable paging over query results.
//!
//! A cursor fetches one page of events at a time and re-runs the compiled
//! query with a moving offset, so callers can stream arbitrarily large
//! result sets without holding them in memory. `rewind` restarts the
//! sequence from the beginning.

use rusqlite::Connection;
use rusqlite::params_from_iter;
use std::collections::VecDeque;
use strata_core::error::{Result, StrataError};
use strata_core::model::Event;

use crate::query::CompiledQuery;
use crate::store::{event_from_row, finish_event};

/// Iterator over matching events, in the compiled query's order.
#[derive(Debug)]
pub struct EventCursor<'conn> {
    conn: &'conn Connection,
    compiled: Option<CompiledQuery>,
    page_size: usize,
    offset: usize,
    buffer: VecDeque<Event>,
    exhausted: bool,
}

impl<'conn> EventCursor<'conn> {
    /// Cursor over a compiled query.
    #[must_use]
    pub fn new(conn: &'conn Connection, compiled: CompiledQuery, page_size: usize) -> Self {
        Self {
            conn,
            compiled: Some(compiled),
            page_size: page_size.max(1),
            offset: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Cursor that yields nothing. Used for sketches with zero timelines:
    /// an empty sequence, not an error.
    #[must_use]
    pub fn empty(conn: &'conn Connection) -> Self {
        Self {
            conn,
            compiled: None,
            page_size: 1,
            offset: 0,
            buffer: VecDeque::new(),
            exhausted: true,
        }
    }

    /// Restart the sequence from the first event.
    pub fn rewind(&mut self) {
        self.offset = 0;
        self.buffer.clear();
        self.exhausted = self.compiled.is_none();
    }

    /// Collect every remaining event. Convenience for small result sets.
    ///
    /// # Errors
    ///
    /// Returns the first storage error encountered.
    pub fn collect_all(mut self) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        for event in &mut self {
            events.push(event?);
        }
        Ok(events)
    }

    fn fetch_page(&mut self) -> Result<()> {
        let Some(compiled) = &self.compiled else {
            self.exhausted = true;
            return Ok(());
        };

        let sql = format!("{} LIMIT {} OFFSET {}", compiled.sql, self.page_size, self.offset);
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|err| StrataError::Internal(err.into()))?;

        let rows = stmt
            .query_map(params_from_iter(compiled.params.iter()), event_from_row)
            .map_err(|err| StrataError::Internal(err.into()))?;

        let mut fetched = 0_usize;
        for row in rows {
            let pair = row.map_err(|err| StrataError::Internal(err.into()))?;
            self.buffer.push_back(finish_event(pair)?);
            fetched += 1;
        }

        self.offset += fetched;
        if fetched < self.page_size {
            self.exhausted = true;
        }
        Ok(())
    }
}

impl Iterator for EventCursor<'_> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(err) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(err));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{SearchQuery, SortOrder, compile};
    use crate::store::{EventRecord, EventStore};

    fn seeded_store(count: i64) -> (tempfile::TempDir, EventStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = EventStore::open(&dir.path().join("events.sqlite3")).expect("open");
        let records = (0..count).map(|n| EventRecord {
            ts_us: Some(n * 1_000),
            message: format!("event number {n}"),
            source_type: "test:line".into(),
            attributes: std::collections::BTreeMap::new(),
        });
        store
            .index_events("idx-0001", records, 100)
            .expect("ingest");
        (dir, store)
    }

    #[test]
    fn pages_through_everything_in_time_order() {
        let (_dir, store) = seeded_store(25);
        let compiled = compile(
            &["idx-0001".to_string()],
            &SearchQuery::all(),
            SortOrder::Time,
        )
        .expect("compile");

        let cursor = EventCursor::new(store.conn(), compiled, 7);
        let events = cursor.collect_all().expect("collect");
        assert_eq!(events.len(), 25);

        let timestamps: Vec<i64> = events.iter().map(|e| e.ts_us).collect();
        let mut sorted = timestamps.clone();
        sorted.sort_unstable();
        assert_eq!(timestamps, sorted, "time order expected");
    }

    #[test]
    fn rewind_restarts_the_sequence() {
        let (_dir, store) = seeded_store(5);
        let compiled = compile(
            &["idx-0001".to_string()],
            &SearchQuery::all(),
            SortOrder::Time,
        )
        .expect("compile");

        let mut cursor = EventCursor::new(store.conn(), compiled, 2);
        let first: Vec<_> = cursor.by_ref().take(3).collect();
        assert_eq!(first.len(), 3);

        cursor.rewind();
        let all: Vec<_> = cursor.collect();
        assert_eq!(all.len(), 5, "rewound cursor replays from the start");
    }

    #[test]
    fn empty_cursor_yields_nothing() {
        let (_dir, store) = seeded_store(3);
        let mut cursor = EventCursor::empty(store.conn());
        assert!(cursor.next().is_none());
        cursor.rewind();
        assert!(cursor.next().is_none());
    }
}
