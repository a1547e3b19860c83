//! Subscription filters.
//!
//! Only the fields the assistant actually queries with are modeled; relays
//! ignore absent fields.

use serde::{Deserialize, Serialize};

/// A relay subscription filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u16>>,

    /// Correlation by referenced event id (`e` tags).
    #[serde(rename = "#e", skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: u16) -> Self {
        self.kinds.get_or_insert_with(Vec::new).push(kind);
        self
    }

    /// Match events that reference `event_id` via an `e` tag.
    pub fn event(mut self, event_id: impl Into<String>) -> Self {
        self.events.get_or_insert_with(Vec::new).push(event_id.into());
        self
    }

    pub const fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_serializes_to_empty_object() {
        let json = serde_json::to_string(&Filter::new()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn e_tag_filter_uses_hash_key() {
        let filter = Filter::new().kind(6003).event("abc123").limit(1);
        let json = serde_json::to_value(&filter).unwrap();
        assert_eq!(json["kinds"], serde_json::json!([6003]));
        assert_eq!(json["#e"], serde_json::json!(["abc123"]));
        assert_eq!(json["limit"], serde_json::json!(1));
    }

    #[test]
    fn filter_roundtrip() {
        let filter = Filter::new().kind(7000).event("abc123").limit(1);
        let json = serde_json::to_string(&filter).unwrap();
        let parsed: Filter = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, filter);
    }
}
