//! Outbound HTTP request action.
//!
//! Fires a single request with no body at the configured URL. Only
//! transport-level failures are errors; the response status and body are
//! logged and discarded, and nothing is retried.

use reqwest::{Method, Url};
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::{ActionConfigError, ActionError};
use crate::domain::WebhookPayload;

/// Method used when the descriptor does not name one
pub const DEFAULT_METHOD: Method = Method::GET;

/// Fire an HTTP request when a trigger matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookAction {
    pub url: Url,
    pub method: Method,
}

impl WebhookAction {
    pub fn new(url: Url, method: Method) -> Self {
        Self { url, method }
    }

    /// Build from a descriptor's `config` object: `{"url": string, "action": string?}`
    pub fn from_config(config: &Value) -> Result<Self, ActionConfigError> {
        let config = config
            .as_object()
            .ok_or(ActionConfigError::NotAnObject("webhook"))?;

        let url = config
            .get("url")
            .and_then(Value::as_str)
            .ok_or(ActionConfigError::MissingUrl)?;
        let url = Url::parse(url).map_err(|e| ActionConfigError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ActionConfigError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        let method = match config.get("action") {
            None | Some(Value::Null) => DEFAULT_METHOD,
            Some(Value::String(verb)) => Method::from_bytes(verb.trim().to_uppercase().as_bytes())
                .map_err(|_| ActionConfigError::InvalidMethod(verb.clone()))?,
            Some(other) => {
                warn!(action = %other, "Webhook method is not a string, using GET");
                DEFAULT_METHOD
            }
        };

        Ok(Self { url, method })
    }

    /// Issue the request. A non-2xx response is not a failure.
    #[instrument(skip(self, client, payload), fields(verb = %self.method, url = %self.url, event = %payload.event))]
    pub async fn execute(
        &self,
        client: &reqwest::Client,
        payload: &WebhookPayload,
    ) -> Result<(), ActionError> {
        info!("Firing webhook");

        let response = client
            .request(self.method.clone(), self.url.clone())
            .send()
            .await
            .map_err(|source| ActionError::Transport {
                method: self.method.to_string(),
                url: self.url.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            info!(status = status.as_u16(), "Webhook delivered");
        } else {
            warn!(status = status.as_u16(), "Webhook target answered with non-success status");
        }

        Ok(())
    }
}
