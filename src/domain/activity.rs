//! Activity log entries.
//!
//! One entry is recorded per accepted webhook request. Entries are never
//! mutated after creation and are ordered by arrival.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::payload::WebhookPayload;

/// A single recorded webhook delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLogEntry {
    /// When the request was received
    pub received_at: DateTime<Utc>,

    /// Correlation id of the request that delivered the payload
    pub request_id: String,

    /// The typed payload
    pub payload: WebhookPayload,

    /// Path of a stored attachment (thumbnail), if the delivery carried one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb_path: Option<PathBuf>,
}

impl ActivityLogEntry {
    /// Create an entry received now
    pub fn new(request_id: impl Into<String>, payload: WebhookPayload) -> Self {
        Self {
            received_at: Utc::now(),
            request_id: request_id.into(),
            payload,
            thumb_path: None,
        }
    }

    /// Create an entry with a freshly generated request id
    pub fn with_random_id(payload: WebhookPayload) -> Self {
        Self::new(Uuid::new_v4().to_string(), payload)
    }

    /// Attach a stored thumbnail path
    pub fn with_thumb(mut self, path: PathBuf) -> Self {
        self.thumb_path = Some(path);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_wire_format() {
        let payload = WebhookPayload {
            event: "media.pause".to_string(),
            ..Default::default()
        };
        let entry = ActivityLogEntry::new("req-1", payload);

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["requestId"], "req-1");
        assert_eq!(json["payload"]["event"], "media.pause");
        assert!(json.get("receivedAt").is_some());
        assert!(json.get("thumbPath").is_none());
    }

    #[test]
    fn test_entry_with_thumb() {
        let entry = ActivityLogEntry::with_random_id(WebhookPayload::default())
            .with_thumb(PathBuf::from("store/thumbs/abc.jpg"));

        let json = serde_json::to_string(&entry).unwrap();
        let parsed: ActivityLogEntry = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, entry);
        assert_eq!(parsed.thumb_path, Some(PathBuf::from("store/thumbs/abc.jpg")));
        assert!(Uuid::parse_str(&parsed.request_id).is_ok());
    }
}
