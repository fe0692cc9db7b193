use thiserror::Error as ThisError;

use crate::types::DestinationId;
use crate::webhooks::events::WebhookTrigger;
use crate::webhooks::signing::SigningError;

/// Errors raised while building, signing or publishing a webhook event.
///
/// Only [`WebhookError::SchemaViolation`] and [`WebhookError::Serialization`] ever
/// escape [`crate::webhooks::WebhookDispatcher::dispatch`]; the per-destination
/// variants are folded into the result set.
#[derive(ThisError, Debug)]
pub enum WebhookError {
    /// Event data does not match the schema of its trigger
    #[error("Event data does not match the {trigger} schema: {message}")]
    SchemaViolation { trigger: WebhookTrigger, message: String },

    /// Secret material for a destination is unusable
    #[error("Failed to sign payload: {0}")]
    Signing(#[from] SigningError),

    /// The publish collaborator declined or never acknowledged the request
    #[error("Publish rejected for destination {destination_id}: {reason}")]
    PublishRejected { destination_id: DestinationId, reason: String },

    /// Envelope could not be encoded
    #[error("Failed to serialize webhook envelope")]
    Serialization(#[from] serde_json::Error),
}

impl WebhookError {
    /// True for errors that only affect a single destination.
    pub fn is_per_destination(&self) -> bool {
        matches!(self, WebhookError::Signing(_) | WebhookError::PublishRejected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = WebhookError::SchemaViolation {
            trigger: WebhookTrigger::LinkCreated,
            message: "missing field `link`".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Event data does not match the link.created schema: missing field `link`"
        );
        assert!(!err.is_per_destination());

        let err = WebhookError::PublishRejected {
            destination_id: "wh_1".to_string(),
            reason: "no-ack".to_string(),
        };
        assert_eq!(err.to_string(), "Publish rejected for destination wh_1: no-ack");
        assert!(err.is_per_destination());

        let err = WebhookError::from(SigningError::EmptySecret);
        assert_eq!(err.to_string(), "Failed to sign payload: webhook secret is empty");
        assert!(err.is_per_destination());
    }
}
