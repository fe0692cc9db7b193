//! Subscription-side types shared by the dispatcher and the publishers.

use std::fmt;

use serde::{Deserialize, Deserializer};
use url::Url;

/// Opaque identifier of a registered webhook (the subscription's public id).
pub type DestinationId = String;

/// Shared secret used to sign payloads for one destination.
///
/// Must never reach payloads, logs or spans: there is no `Serialize` impl and
/// `Debug` prints a placeholder.
#[derive(Clone, PartialEq, Eq)]
pub struct WebhookSecret(Vec<u8>);

impl WebhookSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WebhookSecret([REDACTED])")
    }
}

impl From<&str> for WebhookSecret {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<String> for WebhookSecret {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

impl<'de> Deserialize<'de> for WebhookSecret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

/// A registered webhook subscriber. Loaded from the subscription store, read-only here.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Destination {
    pub id: DestinationId,
    pub endpoint: Url,
    pub secret: WebhookSecret,
}

impl Destination {
    pub fn new(id: impl Into<DestinationId>, endpoint: Url, secret: impl Into<WebhookSecret>) -> Self {
        Self {
            id: id.into(),
            endpoint,
            secret: secret.into(),
        }
    }
}
