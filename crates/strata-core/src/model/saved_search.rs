//! Saved searches: named, persisted queries scoped to a sketch.

use serde::{Deserialize, Serialize};

/// A persisted query, created by a user or by an analyzer.
///
/// Stores both the full-text query string and an optional structured filter
/// (serialized JSON), matching what the query surface accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSearch {
    pub search_id: i64,
    pub sketch_id: i64,
    pub name: String,
    /// Full-text component of the saved query. May be empty.
    pub query_text: String,
    /// Structured filter component as JSON, if any.
    pub filter_json: Option<String>,
    pub created_by: String,
    pub created_at_us: i64,
}
