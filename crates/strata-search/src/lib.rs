//! strata-search: event store adapter, import pipeline, and sketch
//! composer.
//!
//! The search capability underneath is SQLite FTS5 + JSON1; this crate
//! adapts it into named per-timeline indices, a structured query surface,
//! and sketch-scoped composition with access control.

pub mod aggregate;
pub mod composer;
pub mod cursor;
pub mod import;
pub mod query;
pub mod store;

pub use aggregate::{AggregationSpec, Bucket};
pub use cursor::EventCursor;
pub use query::{FilterExpr, SearchQuery, SortOrder};
pub use store::{EventRecord, EventStore, IndexOutcome};
