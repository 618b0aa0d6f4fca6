//! Annotation views: comments, tag sets, and star sets for one event under
//! one sketch.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One comment in the append-only sequence on (sketch, event).
///
/// `seq` is server-assigned and monotonic per (sketch, event), which gives a
/// stable read order even under concurrent writers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub comment_id: i64,
    pub seq: i64,
    pub author: String,
    pub body: String,
    pub created_at_us: i64,
}

/// Everything annotated on a single event within a single sketch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventAnnotations {
    pub tags: BTreeSet<String>,
    pub starred_by: BTreeSet<String>,
    /// Comments ordered by `seq`, ascending.
    pub comments: Vec<Comment>,
}

impl EventAnnotations {
    /// True when the event carries no annotations at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.starred_by.is_empty() && self.comments.is_empty()
    }
}
