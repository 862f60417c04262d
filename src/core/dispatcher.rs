//! Dispatch of validated webhook deliveries.
//!
//! For each delivery the dispatcher validates the raw bytes, records the
//! event in the activity store, then evaluates every trigger and runs the
//! actions of those that match. The activity append is committed before any
//! action runs and is never undone by an action failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::activity_store::{ActivityStore, StoreError};
use super::attachments::ThumbStore;
use super::triggers::{Evaluation, TriggerConfig};
use super::validation::{PayloadValidator, StructuralValidator, ValidationError};
use crate::domain::{ActivityLogEntry, RawPayload, WebhookPayload};

/// Reasons a delivery was not recorded
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Persistence(#[from] StoreError),
}

/// A file delivered alongside the payload
#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

/// Build the shared outbound client used by actions
pub fn build_http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("plexus/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Owns the activity store and the trigger set
pub struct Dispatcher {
    store: ActivityStore,
    triggers: Arc<TriggerConfig>,
    validator: Box<dyn PayloadValidator>,
    thumbs: Option<ThumbStore>,
    client: reqwest::Client,
}

impl Dispatcher {
    /// Create a dispatcher using the structural validator and no thumb storage
    pub fn new(store: ActivityStore, triggers: TriggerConfig, client: reqwest::Client) -> Self {
        Self {
            store,
            triggers: Arc::new(triggers),
            validator: Box::new(StructuralValidator),
            thumbs: None,
            client,
        }
    }

    /// Replace the payload validator
    pub fn with_validator(mut self, validator: impl PayloadValidator + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    /// Store delivered thumbnails in `thumbs`
    pub fn with_thumbs(mut self, thumbs: ThumbStore) -> Self {
        self.thumbs = Some(thumbs);
        self
    }

    pub fn triggers(&self) -> &TriggerConfig {
        &self.triggers
    }

    pub fn store(&self) -> &ActivityStore {
        &self.store
    }

    /// Recorded deliveries, oldest first
    pub async fn activity(&self) -> Vec<ActivityLogEntry> {
        self.store.get_all().await
    }

    /// Validate, record and evaluate one delivery.
    ///
    /// Returns the trigger evaluation; action failures are reported inside it
    /// rather than as an error because the delivery itself was recorded.
    #[instrument(skip(self, raw, attachment), fields(request_id = %request_id))]
    pub async fn handle(
        &self,
        request_id: &str,
        raw: &[u8],
        attachment: Option<Attachment>,
    ) -> Result<Evaluation, DispatchError> {
        self.validator.validate(raw)?;

        let payload = WebhookPayload::from_slice(raw)
            .map_err(|e| ValidationError::Payload(e.to_string()))?;
        let tree = RawPayload::parse(raw).map_err(|e| ValidationError::Malformed(e.to_string()))?;

        let mut entry = ActivityLogEntry::new(request_id, payload.clone());
        if let Some(attachment) = attachment {
            entry.thumb_path = self.store_thumb(request_id, attachment).await?;
        }
        let thumb_path = entry.thumb_path.clone();

        let evicted = match self.store.append(entry).await {
            Ok(evicted) => evicted,
            Err(e) => {
                if let Some(path) = thumb_path {
                    self.remove_thumb(&path).await;
                }
                return Err(e.into());
            }
        };
        info!(event = %payload.event, "Recorded activity");

        for path in evicted.iter().filter_map(|e| e.thumb_path.as_deref()) {
            self.remove_thumb(path).await;
        }

        Ok(self.triggers.evaluate_all(&self.client, &tree, &payload).await)
    }

    async fn remove_thumb(&self, path: &Path) {
        let Some(thumbs) = &self.thumbs else {
            return;
        };
        match thumbs.remove(path).await {
            Ok(()) => debug!(path = %path.display(), "Removed thumbnail"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove thumbnail"),
        }
    }

    async fn store_thumb(
        &self,
        request_id: &str,
        attachment: Attachment,
    ) -> Result<Option<PathBuf>, StoreError> {
        match &self.thumbs {
            Some(thumbs) => {
                let path = thumbs
                    .store(request_id, attachment.file_name.as_deref(), &attachment.bytes)
                    .await?;
                Ok(Some(path))
            }
            None => {
                warn!("Dropping attachment, no thumb storage configured");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::activity_store::MemoryStorage;

    async fn dispatcher(triggers: &str) -> Dispatcher {
        let store = ActivityStore::open(MemoryStorage::new(), 10).await.unwrap();
        let triggers = TriggerConfig::from_json(triggers).unwrap();
        Dispatcher::new(store, triggers, reqwest::Client::new())
    }

    #[tokio::test]
    async fn test_invalid_payload_is_not_recorded() {
        let dispatcher = dispatcher(r#"{"triggers":[]}"#).await;

        let result = dispatcher.handle("req-1", br#"{"user":true}"#, None).await;

        assert!(matches!(result, Err(DispatchError::Validation(_))));
        assert!(dispatcher.activity().await.is_empty());
    }

    #[tokio::test]
    async fn test_payload_with_wrong_field_types_is_rejected() {
        let dispatcher = dispatcher(r#"{"triggers":[]}"#).await;

        let raw = br#"{"event":"media.play","Account":{"id":"not-a-number"}}"#;
        let result = dispatcher.handle("req-1", raw, None).await;

        assert!(matches!(result, Err(DispatchError::Validation(ValidationError::Payload(_)))));
    }

    #[tokio::test]
    async fn test_recorded_without_matches() {
        let dispatcher = dispatcher(r#"{"triggers":[{"properties":{"event":"media.stop"}}]}"#).await;

        let evaluation = dispatcher
            .handle("req-7", br#"{"event":"media.play"}"#, None)
            .await
            .unwrap();

        assert_eq!(evaluation.matched, 0);
        assert!(evaluation.is_success());

        let activity = dispatcher.activity().await;
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].request_id, "req-7");
        assert_eq!(activity[0].payload.event, "media.play");
    }

    #[tokio::test]
    async fn test_attachment_without_thumb_store_is_dropped() {
        let dispatcher = dispatcher(r#"{"triggers":[]}"#).await;
        let attachment = Attachment {
            file_name: Some("thumb.jpg".to_string()),
            bytes: vec![1, 2, 3],
        };

        dispatcher
            .handle("req-1", br#"{"event":"library.new"}"#, Some(attachment))
            .await
            .unwrap();

        assert_eq!(dispatcher.activity().await[0].thumb_path, None);
    }

    struct RejectAll;

    impl PayloadValidator for RejectAll {
        fn validate(&self, _raw: &[u8]) -> Result<(), ValidationError> {
            Err(ValidationError::Payload("rejected".to_string()))
        }
    }

    #[tokio::test]
    async fn test_custom_validator() {
        let dispatcher = dispatcher(r#"{"triggers":[]}"#).await.with_validator(RejectAll);

        let result = dispatcher.handle("req-1", br#"{"event":"media.play"}"#, None).await;

        assert!(matches!(result, Err(DispatchError::Validation(_))));
    }

    struct FailingStorage;

    #[async_trait::async_trait]
    impl crate::core::ActivityStorage for FailingStorage {
        async fn read(&self) -> Result<Vec<u8>, StoreError> {
            Ok(Vec::new())
        }

        async fn write(&self, _bytes: &[u8]) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk full")))
        }
    }

    fn thumb(name: &str) -> Attachment {
        Attachment {
            file_name: Some(name.to_string()),
            bytes: vec![0xFF, 0xD8],
        }
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_failed_append_removes_thumb() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = ActivityStore::open(FailingStorage, 5).await.unwrap();
        let dispatcher = Dispatcher::new(store, TriggerConfig::default(), reqwest::Client::new())
            .with_thumbs(ThumbStore::new(temp.path()));

        let result = dispatcher
            .handle("req-1", br#"{"event":"library.new"}"#, Some(thumb("poster.jpg")))
            .await;

        assert!(matches!(result, Err(DispatchError::Persistence(_))));
        assert!(files_in(temp.path()).is_empty());
    }

    #[tokio::test]
    async fn test_evicted_entries_release_their_thumbs() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = ActivityStore::open(MemoryStorage::new(), 1).await.unwrap();
        let dispatcher = Dispatcher::new(store, TriggerConfig::default(), reqwest::Client::new())
            .with_thumbs(ThumbStore::new(temp.path()));

        dispatcher
            .handle("first", br#"{"event":"library.new"}"#, Some(thumb("a.jpg")))
            .await
            .unwrap();
        assert_eq!(files_in(temp.path()), vec!["first.jpg"]);

        dispatcher
            .handle("second", br#"{"event":"library.new"}"#, Some(thumb("b.png")))
            .await
            .unwrap();

        assert_eq!(files_in(temp.path()), vec!["second.png"]);
        let activity = dispatcher.activity().await;
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].thumb_path, Some(temp.path().join("second.png")));
    }
}
