//! Inbound payload validation.
//!
//! Validation runs once per request, before anything is parsed or stored.
//! Any error rejects the whole request.

use serde_json::Value;
use thiserror::Error;

/// Payload rejected before dispatch
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid payload: not valid JSON: {0}")]
    Malformed(String),

    #[error("Invalid payload, see errors: {}", .0.join(", "))]
    Schema(Vec<String>),

    #[error("Invalid payload: {0}")]
    Payload(String),

    #[error("Invalid payload: no payload supplied")]
    Empty,
}

/// Validates raw payload bytes
pub trait PayloadValidator: Send + Sync {
    fn validate(&self, raw: &[u8]) -> Result<(), ValidationError>;
}

/// Checks the overall shape of a media-server webhook event.
///
/// The document must be an object with a non-empty string `event`. The flags
/// `user` and `owner` must be booleans and the groups `Account`, `Server`,
/// `Player` and `Metadata` must be objects whenever they are present.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralValidator;

const FLAG_FIELDS: [&str; 2] = ["user", "owner"];
const GROUP_FIELDS: [&str; 4] = ["Account", "Server", "Player", "Metadata"];

impl PayloadValidator for StructuralValidator {
    fn validate(&self, raw: &[u8]) -> Result<(), ValidationError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(ValidationError::Empty);
        }

        let document: Value =
            serde_json::from_slice(raw).map_err(|e| ValidationError::Malformed(e.to_string()))?;
        let object = document.as_object().ok_or_else(|| {
            ValidationError::Schema(vec!["(root): Invalid type. Expected: object".to_string()])
        })?;

        let mut errors = Vec::new();

        match object.get("event") {
            Some(Value::String(event)) if !event.trim().is_empty() => {}
            Some(Value::String(_)) => errors.push("event: must not be empty".to_string()),
            Some(_) => errors.push("event: Invalid type. Expected: string".to_string()),
            None => errors.push("(root): event is required".to_string()),
        }

        for field in FLAG_FIELDS {
            if object.get(field).is_some_and(|v| !v.is_boolean()) {
                errors.push(format!("{}: Invalid type. Expected: boolean", field));
            }
        }

        for field in GROUP_FIELDS {
            if object.get(field).is_some_and(|v| !v.is_object()) {
                errors.push(format!("{}: Invalid type. Expected: object", field));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::Schema(errors))
        }
    }
}
