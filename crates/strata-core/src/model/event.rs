//! Indexed forensic events and the references annotations use to point at
//! them.
//!
//! An [`Event`] is a read-only view of one document in a timeline index. It
//! is produced by the event store at ingest time and never mutated
//! afterwards; all collaboration state attaches to an [`EventRef`] instead.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single indexed forensic event.
///
/// # Fields
///
/// - `index_id` — the owning index (one per timeline)
/// - `doc_id` — document identifier, unique within its index
/// - `ts_us` — event timestamp in microseconds since the Unix epoch
/// - `message` — human-readable event description (always non-empty)
/// - `source_type` — producer-assigned type, e.g. `windows:evtx:record`
/// - `attributes` — open set of additional typed fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub index_id: String,
    pub doc_id: String,
    pub ts_us: i64,
    pub message: String,
    pub source_type: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Event {
    /// Reference to this event for annotation purposes.
    #[must_use]
    pub fn event_ref(&self) -> EventRef {
        EventRef {
            index_id: self.index_id.clone(),
            doc_id: self.doc_id.clone(),
        }
    }

    /// Look up a field by name, checking the fixed columns before the open
    /// attribute set.
    ///
    /// `timestamp`, `message`, and `source_type` resolve to the fixed
    /// columns; anything else resolves to `attributes`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<serde_json::Value> {
        match name {
            "timestamp" => Some(serde_json::Value::from(self.ts_us)),
            "message" => Some(serde_json::Value::from(self.message.clone())),
            "source_type" => Some(serde_json::Value::from(self.source_type.clone())),
            _ => self.attributes.get(name).cloned(),
        }
    }
}

/// Stable reference to an indexed event: (index id, document id).
///
/// Annotations are keyed by (sketch id, `EventRef`), so the same event
/// referenced from two sketches carries independent annotation sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventRef {
    pub index_id: String,
    pub doc_id: String,
}

impl EventRef {
    #[must_use]
    pub fn new(index_id: impl Into<String>, doc_id: impl Into<String>) -> Self {
        Self {
            index_id: index_id.into(),
            doc_id: doc_id.into(),
        }
    }
}

impl std::fmt::Display for EventRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.index_id, self.doc_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_event() -> Event {
        let mut attributes = BTreeMap::new();
        attributes.insert("username".to_string(), json!("alice"));
        attributes.insert("logon_type".to_string(), json!(10));
        Event {
            index_id: "idx-9f2c41d08a3b".into(),
            doc_id: "ev-00c1d2e3f4a5b6c7".into(),
            ts_us: 1_726_000_000_000_000,
            message: "Logon attempt from 10.0.0.5".into(),
            source_type: "windows:evtx:record".into(),
            attributes,
        }
    }

    #[test]
    fn field_resolves_fixed_columns_first() {
        let event = sample_event();
        assert_eq!(
            event.field("timestamp"),
            Some(json!(1_726_000_000_000_000_i64))
        );
        assert_eq!(
            event.field("message"),
            Some(json!("Logon attempt from 10.0.0.5"))
        );
        assert_eq!(event.field("source_type"), Some(json!("windows:evtx:record")));
    }

    #[test]
    fn field_falls_back_to_attributes() {
        let event = sample_event();
        assert_eq!(event.field("username"), Some(json!("alice")));
        assert_eq!(event.field("logon_type"), Some(json!(10)));
        assert_eq!(event.field("missing"), None);
    }

    #[test]
    fn event_ref_display_is_index_slash_doc() {
        let event = sample_event();
        assert_eq!(
            event.event_ref().to_string(),
            "idx-9f2c41d08a3b/ev-00c1d2e3f4a5b6c7"
        );
    }

    #[test]
    fn event_serde_roundtrip() {
        let event = sample_event();
        let json = serde_json::to_string(&event).expect("serialize");
        let deser: Event = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(event, deser);
    }
}
