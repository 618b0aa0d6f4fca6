//! Sketch composer: one query surface over the union of a sketch's
//! timeline indices.
//!
//! Access is checked against the sketch as it exists at call time; cursors
//! already handed out keep streaming even if sharing changes mid-flight.

use rusqlite::Connection;
use strata_core::acl::{self, Access};
use strata_core::db::sketches;
use strata_core::error::{Result, StrataError};
use strata_core::model::Sketch;
use tracing::debug;

use crate::aggregate::{AggregationSpec, Bucket, aggregate};
use crate::cursor::EventCursor;
use crate::query::{SearchQuery, SortOrder, compile};
use crate::store::EventStore;

/// Resolve the index ids a query against `sketch` may touch.
///
/// `timeline_scope` narrows to a subset of the sketch's timelines (unknown
/// ids in the scope are rejected — a scope must not widen access).
fn scoped_index_ids(
    meta: &Connection,
    sketch: &Sketch,
    timeline_scope: Option<&[i64]>,
) -> Result<Vec<String>> {
    let Some(scope) = timeline_scope else {
        return sketches::ready_index_ids(meta, sketch.sketch_id);
    };

    for timeline_id in scope {
        if !sketch.timeline_ids.contains(timeline_id) {
            return Err(StrataError::Validation(format!(
                "timeline {timeline_id} is not attached to sketch {}",
                sketch.sketch_id
            )));
        }
    }

    let all = sketches::ready_index_ids(meta, sketch.sketch_id)?;
    let scoped_positions: Vec<usize> = sketch
        .timeline_ids
        .iter()
        .enumerate()
        .filter(|(_, id)| scope.contains(id))
        .map(|(pos, _)| pos)
        .collect();

    Ok(all
        .into_iter()
        .enumerate()
        .filter(|(pos, _)| scoped_positions.contains(pos))
        .map(|(_, id)| id)
        .collect())
}

/// Query a sketch's events.
///
/// The acting user needs read access (owner, collaborator, or public
/// visibility). A sketch with zero timelines yields an empty cursor, not an
/// error.
///
/// # Errors
///
/// `Permission` on failed access check, `NotFound` for an unknown sketch,
/// `Validation` for a bad query or scope.
pub fn query_sketch<'store>(
    meta: &Connection,
    store: &'store EventStore,
    sketch_id: i64,
    acting_user: &str,
    query: &SearchQuery,
    sort: SortOrder,
    timeline_scope: Option<&[i64]>,
    page_size: usize,
) -> Result<EventCursor<'store>> {
    let sketch = sketches::get(meta, sketch_id)?;
    acl::require(&sketch, acting_user, Access::Read)?;
    query_sketch_unchecked(meta, store, sketch_id, query, sort, timeline_scope, page_size)
}

/// [`query_sketch`] without the acting-user check, for callers holding a
/// standing authorization (analyzer runs are authorized at schedule time).
///
/// # Errors
///
/// `NotFound` for an unknown sketch, `Validation` for a bad query or scope.
pub fn query_sketch_unchecked<'store>(
    meta: &Connection,
    store: &'store EventStore,
    sketch_id: i64,
    query: &SearchQuery,
    sort: SortOrder,
    timeline_scope: Option<&[i64]>,
    page_size: usize,
) -> Result<EventCursor<'store>> {
    let sketch = sketches::get(meta, sketch_id)?;
    let index_ids = scoped_index_ids(meta, &sketch, timeline_scope)?;
    debug!(sketch_id, indices = index_ids.len(), "sketch query (standing auth)");

    if index_ids.is_empty() {
        return Ok(EventCursor::empty(store.conn()));
    }

    let compiled = compile(&index_ids, query, sort)?;
    Ok(EventCursor::new(store.conn(), compiled, page_size))
}

/// [`aggregate_sketch`] without the acting-user check; see
/// [`query_sketch_unchecked`].
///
/// # Errors
///
/// `NotFound` for an unknown sketch, `Validation` for a bad spec or scope.
pub fn aggregate_sketch_unchecked(
    meta: &Connection,
    store: &EventStore,
    sketch_id: i64,
    spec: &AggregationSpec,
    timeline_scope: Option<&[i64]>,
) -> Result<Vec<Bucket>> {
    let sketch = sketches::get(meta, sketch_id)?;
    let index_ids = scoped_index_ids(meta, &sketch, timeline_scope)?;
    aggregate(store.conn(), &index_ids, spec)
}

/// Aggregate over a sketch's events. Same access rules as [`query_sketch`].
///
/// # Errors
///
/// `Permission` on failed access check, `NotFound` for an unknown sketch,
/// `Validation` for a bad spec or scope.
pub fn aggregate_sketch(
    meta: &Connection,
    store: &EventStore,
    sketch_id: i64,
    acting_user: &str,
    spec: &AggregationSpec,
    timeline_scope: Option<&[i64]>,
) -> Result<Vec<Bucket>> {
    let sketch = sketches::get(meta, sketch_id)?;
    acl::require(&sketch, acting_user, Access::Read)?;
    aggregate_sketch_unchecked(meta, store, sketch_id, spec, timeline_scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::run_import;
    use crate::store::EventRecord;
    use strata_core::db::open_metadata;
    use strata_core::model::Visibility;

    struct Fixture {
        _dir: tempfile::TempDir,
        meta: Connection,
        store: EventStore,
        sketch_id: i64,
        laptop_id: i64,
        server_id: i64,
    }

    fn record(ts_us: i64, message: &str) -> EventRecord {
        EventRecord {
            ts_us: Some(ts_us),
            message: message.to_string(),
            ..EventRecord::default()
        }
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let meta = open_metadata(&dir.path().join("metadata.sqlite3")).expect("meta");
        let mut store = EventStore::open(&dir.path().join("events.sqlite3")).expect("events");

        let laptop = run_import(
            &meta,
            &mut store,
            "laptop",
            "alice",
            vec![
                record(100, "laptop boot"),
                record(300, "laptop suspicious powershell"),
            ]
            .into_iter(),
            100,
        )
        .expect("import laptop");

        let server = run_import(
            &meta,
            &mut store,
            "server",
            "alice",
            vec![record(200, "server ssh accepted")].into_iter(),
            100,
        )
        .expect("import server");

        let sketch = sketches::create(&meta, "intrusion", "", "alice", 1).expect("sketch");
        sketches::attach_timeline(&meta, sketch.sketch_id, laptop.timeline_id, "alice", 2)
            .expect("attach laptop");
        sketches::attach_timeline(&meta, sketch.sketch_id, server.timeline_id, "alice", 3)
            .expect("attach server");

        Fixture {
            _dir: dir,
            meta,
            store,
            sketch_id: sketch.sketch_id,
            laptop_id: laptop.timeline_id,
            server_id: server.timeline_id,
        }
    }

    #[test]
    fn union_query_merges_timelines_in_time_order() {
        let f = fixture();
        let events = query_sketch(
            &f.meta,
            &f.store,
            f.sketch_id,
            "alice",
            &SearchQuery::all(),
            SortOrder::Time,
            None,
            10,
        )
        .expect("query")
        .collect_all()
        .expect("collect");

        let messages: Vec<&str> = events.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(
            messages,
            vec!["laptop boot", "server ssh accepted", "laptop suspicious powershell"]
        );
    }

    #[test]
    fn timeline_scope_narrows_the_union() {
        let f = fixture();
        let events = query_sketch(
            &f.meta,
            &f.store,
            f.sketch_id,
            "alice",
            &SearchQuery::all(),
            SortOrder::Time,
            Some(&[f.server_id]),
            10,
        )
        .expect("query")
        .collect_all()
        .expect("collect");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, "server ssh accepted");
    }

    #[test]
    fn scope_outside_the_sketch_is_rejected() {
        let f = fixture();
        let result = query_sketch(
            &f.meta,
            &f.store,
            f.sketch_id,
            "alice",
            &SearchQuery::all(),
            SortOrder::Time,
            Some(&[f.laptop_id, 9999]),
            10,
        );
        assert!(matches!(result, Err(StrataError::Validation(_))));
    }

    #[test]
    fn zero_timelines_is_empty_not_error() {
        let f = fixture();
        let empty = sketches::create(&f.meta, "fresh", "", "alice", 9).expect("sketch");
        let events = query_sketch(
            &f.meta,
            &f.store,
            empty.sketch_id,
            "alice",
            &SearchQuery::all(),
            SortOrder::Time,
            None,
            10,
        )
        .expect("query")
        .collect_all()
        .expect("collect");
        assert!(events.is_empty());
    }

    #[test]
    fn read_access_is_enforced_and_sharing_applies_forward() {
        let f = fixture();
        let result = query_sketch(
            &f.meta,
            &f.store,
            f.sketch_id,
            "mallory",
            &SearchQuery::all(),
            SortOrder::Time,
            None,
            10,
        );
        assert!(matches!(result, Err(StrataError::Permission { .. })));

        sketches::set_visibility(&f.meta, f.sketch_id, Visibility::Public, "alice")
            .expect("publish");
        let events = query_sketch(
            &f.meta,
            &f.store,
            f.sketch_id,
            "mallory",
            &SearchQuery::all(),
            SortOrder::Time,
            None,
            10,
        )
        .expect("query after publish")
        .collect_all()
        .expect("collect");
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn full_text_reaches_only_matching_events() {
        let f = fixture();
        let events = query_sketch(
            &f.meta,
            &f.store,
            f.sketch_id,
            "alice",
            &SearchQuery::text("powershell"),
            SortOrder::Relevance,
            None,
            10,
        )
        .expect("query")
        .collect_all()
        .expect("collect");

        assert_eq!(events.len(), 1);
        assert!(events[0].message.contains("powershell"));
    }

    #[test]
    fn aggregate_sketch_counts_by_source() {
        let f = fixture();
        let buckets = aggregate_sketch(
            &f.meta,
            &f.store,
            f.sketch_id,
            "alice",
            &AggregationSpec::TimeHistogram {
                interval_us: 1_000,
            },
            None,
        )
        .expect("aggregate");
        let total: u64 = buckets.iter().map(|b| b.count).sum();
        assert_eq!(total, 3);
    }
}
