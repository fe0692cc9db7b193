//! Publish client abstraction.
//!
//! This module defines the `PublishClient` trait, the capability the dispatcher hands signed
//! requests to. A publish client only has to *accept* a request for delivery; retries,
//! backoff and the eventual success/failure callbacks are its own business.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::PublisherConfig;
use crate::webhooks::dispatcher::PublishRequest;

pub mod dummy;
pub mod qstash;

/// Create a publish client from configuration
///
/// This is the single point where we convert config into client instances.
pub fn create_publisher(config: &PublisherConfig) -> Result<Arc<dyn PublishClient>> {
    match config {
        PublisherConfig::Qstash(qstash_config) => Ok(Arc::new(qstash::QStashPublisher::new(qstash_config)?)),
        PublisherConfig::Dummy(dummy_config) => Ok(Arc::new(dummy::DummyPublisher::from(dummy_config.clone()))),
    }
}

/// Result type for publish operations
pub type Result<T> = std::result::Result<T, PublishError>;

/// Errors returned by a publish client at enqueue time
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("publish rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("publish transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid publish response: {0}")]
    InvalidResponse(String),

    #[error("publish client misconfigured: {0}")]
    Config(String),
}

/// Acknowledgment returned once a request has been accepted into the publish pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishAck {
    /// Identifier assigned by the queue. `None` means the queue answered without one.
    pub message_id: Option<String>,
}

impl PublishAck {
    pub fn accepted(message_id: impl Into<String>) -> Self {
        Self {
            message_id: Some(message_id.into()),
        }
    }
}

/// Abstract publish client interface
///
/// Implementors accept signed webhook requests for durable delivery (QStash, an in-process
/// dummy, test doubles, ...). The call returns when the request is accepted or refused,
/// not when it is delivered.
#[async_trait]
pub trait PublishClient: Send + Sync {
    /// Enqueue one request for delivery.
    ///
    /// `request.callback` must be used for both the success and the failure delivery
    /// callbacks.
    async fn publish(&self, request: &PublishRequest) -> Result<PublishAck>;
}
