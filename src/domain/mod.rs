//! Domain types for plexus.
//!
//! - Payload: typed and raw views of an inbound webhook event
//! - Activity: recorded deliveries kept in the activity log

pub mod activity;
pub mod payload;

pub use activity::ActivityLogEntry;
pub use payload::{is_scalar, scalar_eq, RawPayload, WebhookPayload};
