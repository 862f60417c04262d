//! Core webhook handling.
//!
//! This module contains:
//! - ActivityStore: Bounded, persisted log of received deliveries
//! - Triggers: Rule loading, matching and action execution
//! - Validation: Inbound payload checks
//! - Dispatcher: Validate → record → evaluate for each delivery

pub mod activity_store;
pub mod attachments;
pub mod dispatcher;
pub mod triggers;
pub mod validation;

// Re-export commonly used types
pub use activity_store::{read_snapshot, ActivityStorage, ActivityStore, FileStorage, MemoryStorage, StoreError};
pub use attachments::ThumbStore;
pub use dispatcher::{build_http_client, Attachment, DispatchError, Dispatcher};
pub use triggers::{ConfigError, Evaluation, Trigger, TriggerConfig, TriggerDefinition, TriggerFailure};
pub use validation::{PayloadValidator, StructuralValidator, ValidationError};
