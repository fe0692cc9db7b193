//! Webhook fan-out for domain events.
//!
//! - [`events`]: Triggers, data schemas and the canonical envelope
//! - [`signing`]: HMAC-SHA256 signatures over the envelope bytes
//! - [`dispatcher`]: Build/sign/publish fan-out across all destinations of an event

pub mod dispatcher;
pub mod events;
pub mod signing;

pub use dispatcher::{PublishOutcome, PublishRequest, PublishResult, SIGNATURE_HEADER, WebhookDispatcher};
pub use events::{Envelope, Event, EventData, WebhookTrigger, build_envelope};
pub use signing::{SigningError, generate_secret, sign_envelope, sign_payload, verify_signature};
