//! Webhook fan-out: build once, sign per destination, publish concurrently.
//!
//! ```text
//! dispatcher.dispatch(destinations, trigger, data)
//!   ├─ Envelope::build()                  // schema check, fails the whole call
//!   ├─ to_canonical_json()                // body shared by every destination
//!   ├─ for each destination:
//!   │    ├─ CPU: sign_payload()           // per-destination secret
//!   │    │        └─ error → Rejected("signing-error: ...")
//!   │    └─ join_set.spawn(publish_one) ──────────────────────────┐
//!   │                                                              │
//!   │              ┌───────────────────────────────────────────────┘
//!   │              ▼
//!   │         publish_one (one task per destination):
//!   │              ├─ acquire permit (caps concurrency within this dispatch)
//!   │              ├─ publisher.publish(request)
//!   │              └─ Accepted(message_id) | Rejected(reason)
//!   │
//!   └─ join all tasks (bounded by dispatch_timeout, if set)
//!        ├─ panicked task → Rejected("task-failed")
//!        └─ still pending at deadline → detached, Rejected("timeout")
//! ```
//!
//! Every destination yields exactly one [`PublishResult`], in completion order. Only
//! construction errors that precede the fan-out are returned as `Err`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::{Id as TaskId, JoinSet};
use tokio::time::Instant;
use url::Url;

use crate::config::DispatcherConfig;
use crate::errors::WebhookError;
use crate::publishers::{PublishAck, PublishClient, PublishError};
use crate::types::{Destination, DestinationId};
use crate::webhooks::events::{Envelope, Event, WebhookTrigger};
use crate::webhooks::signing;

/// Header carrying the hex HMAC-SHA256 of the body
pub const SIGNATURE_HEADER: &str = "X-Hookfan-Signature";

/// Query parameter identifying the destination on delivery callbacks
pub const CALLBACK_DESTINATION_PARAM: &str = "webhookId";

/// Rejection reason when the publish client accepted but returned no message id
pub const NO_ACK_REASON: &str = "no-ack";
/// Rejection reason for submissions still pending when `dispatch_timeout` elapsed
pub const TIMEOUT_REASON: &str = "timeout";
/// Rejection reason for a submission task that panicked
pub const TASK_FAILED_REASON: &str = "task-failed";

/// A signed request for one destination, handed to the publish client.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub destination_id: DestinationId,
    pub endpoint: Url,
    /// Canonical envelope JSON, shared across all destinations of an event
    pub body: Arc<str>,
    pub headers: Vec<(String, String)>,
    /// Where the queue reports both delivery success and delivery failure
    pub callback: Url,
}

impl PublishRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn signature(&self) -> Option<&str> {
        self.header(SIGNATURE_HEADER)
    }
}

/// What happened to one destination's submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PublishOutcome {
    Accepted { message_id: String },
    Rejected { reason: String },
}

/// Per-destination result of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishResult {
    pub destination_id: DestinationId,
    #[serde(flatten)]
    pub outcome: PublishOutcome,
}

impl PublishResult {
    pub fn accepted(destination_id: impl Into<DestinationId>, message_id: impl Into<String>) -> Self {
        Self {
            destination_id: destination_id.into(),
            outcome: PublishOutcome::Accepted {
                message_id: message_id.into(),
            },
        }
    }

    pub fn rejected(destination_id: impl Into<DestinationId>, reason: impl Into<String>) -> Self {
        Self {
            destination_id: destination_id.into(),
            outcome: PublishOutcome::Rejected { reason: reason.into() },
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self.outcome, PublishOutcome::Accepted { .. })
    }

    /// Convert into a `Result`, for callers that want to treat rejection as an error.
    pub fn into_result(self) -> Result<String, WebhookError> {
        match self.outcome {
            PublishOutcome::Accepted { message_id } => Ok(message_id),
            PublishOutcome::Rejected { reason } => Err(WebhookError::PublishRejected {
                destination_id: self.destination_id,
                reason,
            }),
        }
    }
}

// --- Dispatcher ---

pub struct WebhookDispatcher {
    publisher: Arc<dyn PublishClient>,
    callback_url: Url,
    dispatch_timeout: Option<Duration>,
    max_concurrent_publishes: usize,
}

impl WebhookDispatcher {
    pub fn new(publisher: Arc<dyn PublishClient>, config: &DispatcherConfig) -> Self {
        Self {
            publisher,
            callback_url: config.callback_url.clone(),
            dispatch_timeout: config.dispatch_timeout,
            max_concurrent_publishes: config.max_concurrent_publishes.max(1),
        }
    }

    /// Callback reference for a destination: the configured callback URL tagged with its id.
    pub fn callback_reference(&self, destination_id: &str) -> Url {
        let mut callback = self.callback_url.clone();
        callback
            .query_pairs_mut()
            .append_pair(CALLBACK_DESTINATION_PARAM, destination_id);
        callback
    }

    /// Fan an event out to every destination.
    ///
    /// Returns one result per destination. Fails only if the event data doesn't match the
    /// trigger's schema, in which case nothing is published.
    #[tracing::instrument(skip_all, fields(trigger = %trigger, destinations = destinations.len()))]
    pub async fn dispatch(
        &self,
        destinations: &[Destination],
        trigger: WebhookTrigger,
        data: Value,
    ) -> Result<Vec<PublishResult>, WebhookError> {
        if destinations.is_empty() {
            tracing::debug!("No destinations for event, skipping");
            return Ok(Vec::new());
        }

        self.dispatch_event(destinations, &Event::new(trigger, data)).await
    }

    /// Fan an already constructed event out to every destination.
    #[tracing::instrument(skip_all, fields(event_id = %event.id(), trigger = %event.trigger()))]
    pub async fn dispatch_event(&self, destinations: &[Destination], event: &Event) -> Result<Vec<PublishResult>, WebhookError> {
        if destinations.is_empty() {
            return Ok(Vec::new());
        }

        let envelope = Envelope::build(event)?;
        let body: Arc<str> = envelope.to_canonical_json()?.into();

        let deadline = self.dispatch_timeout.map(|timeout| Instant::now() + timeout);
        // Scoped to this call: tasks abandoned at the deadline keep their permits.
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_publishes));
        let mut results = Vec::with_capacity(destinations.len());
        let mut join_set: JoinSet<PublishResult> = JoinSet::new();
        let mut pending: HashMap<TaskId, DestinationId> = HashMap::with_capacity(destinations.len());

        for destination in destinations {
            let signature = match signing::sign_payload(&destination.secret, body.as_bytes()) {
                Ok(s) => s,
                Err(e) => {
                    counter!("hookfan_webhook_anomalies_total", "kind" => "signing_error").increment(1);
                    counter!("hookfan_webhook_publishes_total", "outcome" => "rejected").increment(1);
                    tracing::error!(
                        destination_id = %destination.id,
                        error = %e,
                        "Failed to sign webhook payload, skipping destination"
                    );
                    results.push(PublishResult::rejected(&destination.id, format!("signing-error: {}", e)));
                    continue;
                }
            };

            let request = PublishRequest {
                destination_id: destination.id.clone(),
                endpoint: destination.endpoint.clone(),
                body: Arc::clone(&body),
                headers: vec![
                    ("Content-Type".to_string(), "application/json".to_string()),
                    (SIGNATURE_HEADER.to_string(), signature),
                ],
                callback: self.callback_reference(&destination.id),
            };

            let publisher = Arc::clone(&self.publisher);
            let handle = join_set.spawn(publish_one(publisher, Arc::clone(&semaphore), request));
            pending.insert(handle.id(), destination.id.clone());
        }

        loop {
            let joined = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, join_set.join_next_with_id()).await {
                    Ok(joined) => joined,
                    Err(_) => break,
                },
                None => join_set.join_next_with_id().await,
            };

            let Some(joined) = joined else {
                break;
            };

            match joined {
                Ok((id, result)) => {
                    pending.remove(&id);
                    results.push(result);
                }
                Err(join_error) => {
                    let Some(destination_id) = pending.remove(&join_error.id()) else {
                        continue;
                    };
                    counter!("hookfan_webhook_anomalies_total", "kind" => "task_failed").increment(1);
                    counter!("hookfan_webhook_publishes_total", "outcome" => "rejected").increment(1);
                    tracing::error!(destination_id = %destination_id, error = %join_error, "Publish task panicked");
                    results.push(PublishResult::rejected(destination_id, TASK_FAILED_REASON));
                }
            }
        }

        if !pending.is_empty() {
            // Abandon, don't abort: the publish may still be accepted after we return.
            join_set.detach_all();
            for (_, destination_id) in pending {
                counter!("hookfan_webhook_anomalies_total", "kind" => "timeout").increment(1);
                counter!("hookfan_webhook_publishes_total", "outcome" => "rejected").increment(1);
                tracing::warn!(destination_id = %destination_id, "Publish still pending at dispatch timeout, abandoning");
                results.push(PublishResult::rejected(destination_id, TIMEOUT_REASON));
            }
        }

        let accepted = results.iter().filter(|r| r.is_accepted()).count();
        tracing::debug!(
            accepted,
            rejected = results.len() - accepted,
            "Webhook dispatch complete"
        );

        Ok(results)
    }
}

/// Submit a single request. Never fails: every outcome becomes a `PublishResult`.
async fn publish_one(publisher: Arc<dyn PublishClient>, semaphore: Arc<Semaphore>, request: PublishRequest) -> PublishResult {
    let _permit = match semaphore.acquire_owned().await {
        Ok(p) => p,
        Err(_) => {
            tracing::warn!(destination_id = %request.destination_id, "Publish semaphore closed");
            return PublishResult::rejected(request.destination_id, TASK_FAILED_REASON);
        }
    };

    tracing::debug!(
        destination_id = %request.destination_id,
        endpoint = %request.endpoint,
        "Publishing webhook event"
    );

    let outcome = publisher.publish(&request).await;
    classify(request.destination_id, outcome)
}

fn classify(destination_id: DestinationId, outcome: Result<PublishAck, PublishError>) -> PublishResult {
    match outcome {
        Ok(PublishAck {
            message_id: Some(message_id),
        }) if !message_id.is_empty() => {
            counter!("hookfan_webhook_publishes_total", "outcome" => "accepted").increment(1);
            tracing::debug!(destination_id = %destination_id, message_id = %message_id, "Webhook event accepted for delivery");
            PublishResult::accepted(destination_id, message_id)
        }
        Ok(_) => {
            counter!("hookfan_webhook_anomalies_total", "kind" => "no_ack").increment(1);
            counter!("hookfan_webhook_publishes_total", "outcome" => "rejected").increment(1);
            tracing::error!(destination_id = %destination_id, "Publish returned no message id");
            PublishResult::rejected(destination_id, NO_ACK_REASON)
        }
        Err(e) => {
            counter!("hookfan_webhook_publishes_total", "outcome" => "rejected").increment(1);
            tracing::warn!(destination_id = %destination_id, error = %e, "Webhook publish rejected");
            PublishResult::rejected(destination_id, e.to_string())
        }
    }
}
