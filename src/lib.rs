//! plexus - webhook receiver for a media server
//!
//! Accepts webhook deliveries, keeps a bounded history of them on disk and
//! runs configured actions when a delivery matches a trigger.
//!
//! # Architecture
//!
//! - A trigger is a set of dotted-path property constraints plus a list of
//!   actions. A delivery matches when every constraint resolves to an equal
//!   scalar in the raw payload.
//! - Every accepted delivery is appended to the activity store before any
//!   action runs. The store keeps the newest `max_items` entries and rewrites
//!   its file atomically on each append.
//!
//! # Modules
//!
//! - `actions`: Side effects run by matching triggers (outbound webhooks)
//! - `core`: ActivityStore, trigger matching, validation, Dispatcher
//! - `domain`: Payload and activity entry types
//! - `http`: axum routes and request middleware
//! - `config`: Settings resolution
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Receive webhooks on :3000 using ./config.json
//! plexus serve
//!
//! # Show the last 10 deliveries
//! plexus activity --limit 10
//!
//! # Validate a trigger file
//! plexus check-config triggers.json
//! ```

pub mod actions;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod http;

// Re-export main types at crate root for convenience
pub use actions::{Action, ActionConfigError, ActionError, WebhookAction};
pub use core::{
    ActivityStore, ConfigError, DispatchError, Dispatcher, Evaluation, StoreError, Trigger,
    TriggerConfig, ValidationError,
};
pub use domain::{ActivityLogEntry, RawPayload, WebhookPayload};
