//! Core data model for strata.
//!
//! Indexed events are immutable and live only in the search index; everything
//! here that is mutable (sketches, annotations, runs) is keyed by sketch
//! identity, never by index identity.

pub mod annotation;
pub mod event;
pub mod run;
pub mod saved_search;
pub mod sketch;
pub mod timeline;

pub use annotation::{Comment, EventAnnotations};
pub use event::{Event, EventRef};
pub use run::{AnalyzerRun, RunState};
pub use saved_search::SavedSearch;
pub use sketch::{Role, Sketch, Visibility};
pub use timeline::{ImportStatus, Timeline};
