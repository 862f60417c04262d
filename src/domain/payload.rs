//! Inbound webhook payloads.
//!
//! A payload is consumed two ways: deserialized into [`WebhookPayload`] for
//! storage and display, and kept as a raw JSON tree ([`RawPayload`]) so that
//! trigger rules can address arbitrary fields by dotted path.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Typed view of a media-server webhook event.
///
/// Every group is optional; the server omits fields that do not apply to an
/// event (e.g. `Metadata` on `admin.database.backup`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// Event kind, e.g. `media.play` or `library.new`
    #[serde(default)]
    pub event: String,

    /// Whether the event was triggered by a user of the server
    #[serde(default)]
    pub user: bool,

    /// Whether the event was triggered by the server owner
    #[serde(default)]
    pub owner: bool,

    #[serde(rename = "Account", default, skip_serializing_if = "Option::is_none")]
    pub account: Option<Account>,

    #[serde(rename = "Server", default, skip_serializing_if = "Option::is_none")]
    pub server: Option<Server>,

    #[serde(rename = "Player", default, skip_serializing_if = "Option::is_none")]
    pub player: Option<Player>,

    #[serde(rename = "Metadata", default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl WebhookPayload {
    /// Parse a typed payload from raw bytes
    pub fn from_slice(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    /// Title of the item the event refers to, if any
    pub fn title(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.title.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub thumb: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Server {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    #[serde(default)]
    pub local: bool,
    #[serde(default)]
    pub public_address: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
}

/// Library item metadata attached to playback and library events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default)]
    pub library_section_type: Option<String>,
    #[serde(default)]
    pub rating_key: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub parent_rating_key: Option<String>,
    #[serde(default)]
    pub grandparent_rating_key: Option<String>,
    #[serde(default)]
    pub guid: Option<String>,
    #[serde(rename = "librarySectionID", default)]
    pub library_section_id: Option<i64>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub grandparent_key: Option<String>,
    #[serde(default)]
    pub parent_key: Option<String>,
    #[serde(default)]
    pub grandparent_title: Option<String>,
    #[serde(default)]
    pub parent_title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub index: Option<i64>,
    #[serde(default)]
    pub parent_index: Option<i64>,
    #[serde(default)]
    pub rating_count: Option<i64>,
    #[serde(default)]
    pub thumb: Option<String>,
    #[serde(default)]
    pub art: Option<String>,
    #[serde(default)]
    pub parent_thumb: Option<String>,
    #[serde(default)]
    pub grandparent_thumb: Option<String>,
    #[serde(default)]
    pub grandparent_art: Option<String>,
    #[serde(default)]
    pub added_at: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
}

/// Read-only JSON tree used for rule evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPayload {
    root: Value,
}

impl RawPayload {
    /// Parse raw bytes into a JSON tree
    pub fn parse(raw: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(Self {
            root: serde_json::from_slice(raw)?,
        })
    }

    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Resolve a dot-separated path (`Metadata.librarySectionType`).
    ///
    /// Each segment descends into an object member. Returns `None` when any
    /// segment is missing or the current node is not an object.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.root, |node, segment| node.as_object()?.get(segment))
    }

    /// Resolve a path and return the leaf only when it is a JSON scalar
    pub fn lookup_scalar(&self, path: &str) -> Option<&Value> {
        self.lookup(path).filter(|v| is_scalar(v))
    }
}

/// Strings, numbers, booleans and null are scalars; arrays and objects are not
pub fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// Exact scalar equality as used by trigger constraints.
///
/// Numbers compare by their decoded floating point value, so a constraint of
/// `1` or `1.0` matches a payload value of `1`. All other values must agree in
/// both type and value.
pub fn scalar_eq(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => false,
        _ => actual == expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PLAY_EVENT: &str = r#"{
        "event": "media.play",
        "user": true,
        "owner": true,
        "Account": { "id": 1, "thumb": "https://plex.tv/users/1/avatar", "title": "elan" },
        "Server": { "title": "Office", "uuid": "54664a3d8acc39983675640ec9ce00b70af9cc36" },
        "Player": { "local": true, "publicAddress": "200.200.200.200", "title": "Plex Web (Safari)", "uuid": "r6yfkdnfggbh2bdnvkffwbms" },
        "Metadata": {
            "librarySectionType": "artist",
            "ratingKey": "1936545",
            "librarySectionID": 1224,
            "type": "track",
            "title": "Love The One You're With",
            "index": 1,
            "addedAt": 1000396126
        }
    }"#;

    #[test]
    fn test_typed_payload_parsing() {
        let payload = WebhookPayload::from_slice(PLAY_EVENT.as_bytes()).unwrap();

        assert_eq!(payload.event, "media.play");
        assert!(payload.user);
        assert_eq!(payload.account.as_ref().unwrap().id, Some(1));
        assert_eq!(payload.player.as_ref().unwrap().public_address.as_deref(), Some("200.200.200.200"));

        let metadata = payload.metadata.as_ref().unwrap();
        assert_eq!(metadata.library_section_id, Some(1224));
        assert_eq!(metadata.kind.as_deref(), Some("track"));
        assert_eq!(payload.title(), Some("Love The One You're With"));
    }

    #[test]
    fn test_minimal_payload_defaults() {
        let payload = WebhookPayload::from_slice(br#"{"event":"admin.database.backup"}"#).unwrap();
        assert_eq!(payload.event, "admin.database.backup");
        assert!(!payload.owner);
        assert!(payload.metadata.is_none());
        assert_eq!(payload.title(), None);
    }

    #[test]
    fn test_lookup_nested_path() {
        let raw = RawPayload::parse(PLAY_EVENT.as_bytes()).unwrap();

        assert_eq!(raw.lookup("event"), Some(&json!("media.play")));
        assert_eq!(raw.lookup("Metadata.librarySectionType"), Some(&json!("artist")));
        assert_eq!(raw.lookup("Metadata.missing"), None);
        assert_eq!(raw.lookup("event.deeper"), None);
        assert!(raw.lookup("Metadata").is_some());
        assert!(raw.lookup_scalar("Metadata").is_none());
    }

    #[test]
    fn test_scalar_eq_numbers() {
        assert!(scalar_eq(&json!(1), &json!(1.0)));
        assert!(scalar_eq(&json!(1.5), &json!(1.5)));
        assert!(!scalar_eq(&json!(1), &json!(2)));
    }

    #[test]
    fn test_scalar_eq_requires_same_type() {
        assert!(!scalar_eq(&json!("1"), &json!(1)));
        assert!(!scalar_eq(&json!(true), &json!("true")));
        assert!(scalar_eq(&json!(null), &json!(null)));
        assert!(!scalar_eq(&json!({"a": 1}), &json!({"a": 1})));
    }
}
