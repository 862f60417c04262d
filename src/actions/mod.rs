//! Actions run when a trigger matches.
//!
//! Actions are configured as raw `{type, config}` descriptors and parsed once,
//! at config load, into the closed [`Action`] type. Malformed descriptors of
//! a known type fail the load; descriptors of an unknown type are skipped.

pub mod webhook;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use webhook::WebhookAction;

use crate::domain::WebhookPayload;

/// Descriptor type tag for [`WebhookAction`]
pub const ACTION_WEBHOOK: &str = "webhook";

/// An action descriptor as it appears in the trigger file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAction {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub config: Value,
}

/// Reasons a descriptor of a known type cannot be turned into an action
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionConfigError {
    #[error("invalid {0} action configuration: config must be an object")]
    NotAnObject(&'static str),

    #[error("invalid webhook action specified; missing URL")]
    MissingUrl,

    #[error("invalid webhook URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid webhook HTTP method: {0}")]
    InvalidMethod(String),
}

/// Failure of an action's side effect
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("webhook {method} {url} failed: {source}")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// An executable action
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Webhook(WebhookAction),
}

impl Action {
    /// Parse a raw descriptor.
    ///
    /// Returns `Ok(None)` for descriptor types this build does not know.
    pub fn from_raw(raw: &RawAction) -> Result<Option<Self>, ActionConfigError> {
        match raw.kind.as_str() {
            ACTION_WEBHOOK => Ok(Some(Self::Webhook(WebhookAction::from_config(&raw.config)?))),
            _ => Ok(None),
        }
    }

    /// Type tag of the action
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Webhook(_) => ACTION_WEBHOOK,
        }
    }

    /// Run the action's side effect for a payload
    pub async fn execute(
        &self,
        client: &reqwest::Client,
        payload: &WebhookPayload,
    ) -> Result<(), ActionError> {
        match self {
            Self::Webhook(action) => action.execute(client, payload).await,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Webhook(action) => write!(f, "webhook {} {}", action.method, action.url),
        }
    }
}
