//! QStash publish client.
//!
//! Publishes through the QStash HTTP API (`POST /v2/publish/{destination}`). QStash stores
//! the message, delivers it with retries and reports the final outcome to the callback URLs.
//! Request headers meant for the destination are sent with the `Upstash-Forward-` prefix;
//! headers already addressed to QStash (`Upstash-*`) pass through unchanged.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::config::QStashConfig;
use crate::publishers::{PublishAck, PublishClient, PublishError, Result};
use crate::webhooks::dispatcher::PublishRequest;

const FORWARD_PREFIX: &str = "Upstash-Forward-";

/// Body returned by QStash for a single-destination publish
#[derive(Debug, Deserialize)]
struct PublishResponse {
    #[serde(rename = "messageId")]
    message_id: Option<String>,
}

pub struct QStashPublisher {
    http_client: reqwest::Client,
    base_url: Url,
    token: String,
    hide_headers: bool,
}

impl QStashPublisher {
    pub fn new(config: &QStashConfig) -> Result<Self> {
        if config.token.is_empty() {
            return Err(PublishError::Config("QStash token is not configured".to_string()));
        }

        let http_client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.clone(),
            token: config.token.clone(),
            hide_headers: config.hide_headers,
        })
    }

    fn publish_url(&self, endpoint: &Url) -> String {
        format!("{}/v2/publish/{}", self.base_url.as_str().trim_end_matches('/'), endpoint)
    }
}

/// Map a header meant for the destination onto the name QStash expects.
fn qstash_header_name(name: &str) -> String {
    if name.to_ascii_lowercase().starts_with("upstash-") {
        name.to_string()
    } else {
        format!("{}{}", FORWARD_PREFIX, name)
    }
}

#[async_trait]
impl PublishClient for QStashPublisher {
    async fn publish(&self, request: &PublishRequest) -> Result<PublishAck> {
        let mut req_builder = self.http_client.post(self.publish_url(&request.endpoint)).bearer_auth(&self.token);

        for (name, value) in &request.headers {
            // QStash forwards the publish request's own content type
            if name.eq_ignore_ascii_case("content-type") {
                req_builder = req_builder.header(name, value);
            } else {
                req_builder = req_builder.header(qstash_header_name(name), value);
            }
        }
        if self.hide_headers {
            req_builder = req_builder.header("Upstash-Hide-Headers", "true");
        }

        let response = req_builder
            .header("Upstash-Callback", request.callback.as_str())
            .header("Upstash-Failure-Callback", request.callback.as_str())
            .body(request.body.to_string())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        if body.trim().is_empty() {
            return Ok(PublishAck::default());
        }

        let parsed: PublishResponse =
            serde_json::from_str(&body).map_err(|e| PublishError::InvalidResponse(format!("{}: {}", e, body)))?;

        Ok(PublishAck {
            message_id: parsed.message_id,
        })
    }
}
