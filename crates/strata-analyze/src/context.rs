//! The bounded capability surface handed to a running analyzer.
//!
//! An analyzer sees read-only query/aggregate access to its sketch and
//! exactly three write paths: tags, comments, and saved searches — all
//! attributed to the run's identity — plus appending to its own result
//! summary. Indexed events are unreachable for mutation by construction.
//!
//! Every operation observes the run's cancellation flag: once cancellation
//! is acknowledged, reads stop early and writes are refused, so no
//! annotation from a cancelled run can appear after the acknowledgement.

use rusqlite::Connection;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use strata_core::acl::Actor;
use strata_core::annotate;
use strata_core::db::searches;
use strata_core::error::{Result, StrataError};
use strata_core::model::{Comment, Event, EventRef, SavedSearch};
use strata_core::time::now_us;
use strata_search::composer;
use strata_search::{AggregationSpec, Bucket, EventStore, SearchQuery, SortOrder};

/// Error detail used when an operation is refused due to cancellation.
pub(crate) const CANCELLED_MSG: &str = "run cancelled";

/// Capability context for one analyzer run.
pub struct AnalyzerContext {
    meta: Connection,
    store: EventStore,
    sketch_id: i64,
    run_id: i64,
    analyzer: String,
    timeline_scope: Option<Vec<i64>>,
    cancel: Arc<AtomicBool>,
    page_size: usize,
}

impl AnalyzerContext {
    pub(crate) fn new(
        meta: Connection,
        store: EventStore,
        sketch_id: i64,
        run_id: i64,
        analyzer: String,
        timeline_scope: Option<Vec<i64>>,
        cancel: Arc<AtomicBool>,
        page_size: usize,
    ) -> Self {
        Self {
            meta,
            store,
            sketch_id,
            run_id,
            analyzer,
            timeline_scope,
            cancel,
            page_size,
        }
    }

    /// Hand the metadata connection back for run finalization.
    pub(crate) fn into_meta(self) -> Connection {
        self.meta
    }

    #[must_use]
    pub const fn sketch_id(&self) -> i64 {
        self.sketch_id
    }

    #[must_use]
    pub const fn run_id(&self) -> i64 {
        self.run_id
    }

    /// True once cancellation has been requested for this run.
    #[must_use]
    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn ensure_active(&self) -> Result<()> {
        if self.cancelled() {
            return Err(StrataError::Validation(CANCELLED_MSG.into()));
        }
        Ok(())
    }

    fn actor(&self) -> Actor<'_> {
        Actor::Run {
            analyzer: &self.analyzer,
            run_id: self.run_id,
        }
    }

    /// Stream the sketch's events through `visit`, page by page.
    ///
    /// Stops promptly (with a cancellation error) when the run is cancelled
    /// mid-stream; no further events are consumed from the store.
    ///
    /// # Errors
    ///
    /// Propagates storage errors, the visitor's errors, and cancellation.
    pub fn for_each_event(
        &self,
        query: &SearchQuery,
        sort: SortOrder,
        mut visit: impl FnMut(&Event) -> Result<()>,
    ) -> Result<()> {
        self.ensure_active()?;
        // The run actor was authorized at schedule time, so the cursor is
        // resolved under that standing authority.
        let cursor = composer::query_sketch_unchecked(
            &self.meta,
            &self.store,
            self.sketch_id,
            query,
            sort,
            self.timeline_scope.as_deref(),
            self.page_size,
        )?;

        for event in cursor {
            self.ensure_active()?;
            visit(&event?)?;
        }
        Ok(())
    }

    /// Bucketed statistics over the sketch's events.
    ///
    /// # Errors
    ///
    /// Propagates storage errors and cancellation.
    pub fn aggregate(&self, spec: &AggregationSpec) -> Result<Vec<Bucket>> {
        self.ensure_active()?;
        composer::aggregate_sketch_unchecked(
            &self.meta,
            &self.store,
            self.sketch_id,
            spec,
            self.timeline_scope.as_deref(),
        )
    }

    /// Tag an event on behalf of this run. Idempotent.
    ///
    /// # Errors
    ///
    /// Refused once cancelled; propagates storage errors.
    pub fn add_tag(&self, event: &EventRef, tag: &str) -> Result<bool> {
        self.ensure_active()?;
        annotate::add_tag(&self.meta, self.sketch_id, event, tag, self.actor(), now_us())
    }

    /// Comment on an event on behalf of this run.
    ///
    /// # Errors
    ///
    /// Refused once cancelled; propagates storage errors.
    pub fn add_comment(&self, event: &EventRef, body: &str) -> Result<Comment> {
        self.ensure_active()?;
        annotate::add_comment(&self.meta, self.sketch_id, event, body, self.actor(), now_us())
    }

    /// Persist a saved search on behalf of this run.
    ///
    /// # Errors
    ///
    /// Refused once cancelled; propagates storage errors.
    pub fn save_search(&self, name: &str, query: &SearchQuery) -> Result<SavedSearch> {
        self.ensure_active()?;
        let filter_json = query
            .filter
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|err| StrataError::Internal(err.into()))?;
        searches::create(
            &self.meta,
            self.sketch_id,
            name,
            query.text.as_deref().unwrap_or_default(),
            filter_json.as_deref(),
            self.actor(),
            now_us(),
        )
    }

    /// Append a progress line to this run's result summary.
    ///
    /// # Errors
    ///
    /// Refused once cancelled; propagates storage errors.
    pub fn append_result(&self, line: &str) -> Result<()> {
        self.ensure_active()?;
        strata_core::db::runs::append_result(&self.meta, self.run_id, line)
    }
}
