//! Dummy publish client
//!
//! Accepts every request without contacting a queue and logs it. Useful for local runs and
//! for checking a subscription file before pointing hookfan at a real queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::DummyPublisherConfig;
use crate::publishers::{PublishAck, PublishClient, Result};
use crate::webhooks::dispatcher::PublishRequest;

pub struct DummyPublisher {
    latency: Duration,
    published: AtomicU64,
}

impl DummyPublisher {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            published: AtomicU64::new(0),
        }
    }

    /// Number of requests accepted so far
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl From<DummyPublisherConfig> for DummyPublisher {
    fn from(config: DummyPublisherConfig) -> Self {
        Self::new(config.latency)
    }
}

#[async_trait]
impl PublishClient for DummyPublisher {
    async fn publish(&self, request: &PublishRequest) -> Result<PublishAck> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let message_id = format!("msg_{}", Uuid::new_v4().simple());
        self.published.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            destination_id = %request.destination_id,
            endpoint = %request.endpoint,
            callback = %request.callback,
            message_id = %message_id,
            bytes = request.body.len(),
            "Dummy publisher accepted webhook event"
        );

        Ok(PublishAck::accepted(message_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn make_request() -> PublishRequest {
        PublishRequest {
            destination_id: "wh_1".to_string(),
            endpoint: "https://dest.example.com/hook".parse().unwrap(),
            body: Arc::from("{}"),
            headers: Vec::new(),
            callback: "https://app.example.com/callback?webhookId=wh_1".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_accepts_with_unique_ids() {
        let publisher = DummyPublisher::from(DummyPublisherConfig::default());

        let first = publisher.publish(&make_request()).await.unwrap();
        let second = publisher.publish(&make_request()).await.unwrap();

        let first_id = first.message_id.unwrap();
        assert!(first_id.starts_with("msg_"));
        assert_ne!(Some(first_id), second.message_id);
        assert_eq!(publisher.published(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_latency() {
        let publisher = DummyPublisher::new(Duration::from_secs(2));
        let start = tokio::time::Instant::now();

        publisher.publish(&make_request()).await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
