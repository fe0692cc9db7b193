//! # hookfan: webhook fan-out dispatcher
//!
//! `hookfan` turns a single domain event into one signed webhook delivery per subscribed
//! destination. It does not deliver anything itself: every signed request is handed to a
//! publish client (QStash in production) which owns retries, backoff and the final
//! success/failure callbacks.
//!
//! ## Flow
//!
//! ```text
//! trigger + event data
//!         |
//!   Envelope::build        validate against the trigger schema, canonical JSON
//!         |
//!   sign_envelope          HMAC-SHA256 per destination secret
//!         |
//!   PublishClient::publish one concurrent submission per destination
//!         |
//!   Vec<PublishResult>     exactly one result per destination
//! ```
//!
//! A schema violation fails the whole dispatch before anything is published. Everything
//! else (a bad secret, a refused or unacknowledged submission, a timeout) only affects its
//! own destination and shows up as a rejected [`webhooks::PublishResult`].
//!
//! ## Modules
//!
//! - [`webhooks`]: triggers, envelope building, signing and the dispatcher
//! - [`publishers`]: the [`publishers::PublishClient`] trait with QStash and dummy clients
//! - [`config`]: CLI arguments and figment-based configuration
//! - [`commands`]: the `dispatch` and `verify` subcommands
//! - [`telemetry`]: tracing subscriber and optional OTLP export

pub mod commands;
pub mod config;
pub mod errors;
pub mod publishers;
pub mod telemetry;
pub mod types;
pub mod webhooks;

pub use config::Config;
pub use errors::WebhookError;
pub use types::{Destination, DestinationId, WebhookSecret};
