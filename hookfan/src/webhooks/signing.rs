//! HMAC-SHA256 signing of webhook envelopes.
//!
//! The signature is the lowercase hex HMAC-SHA256 of the exact request body (the canonical
//! envelope JSON), keyed with the destination's secret. Receivers verify by recomputing it
//! over the raw body they received and comparing with the `X-Hookfan-Signature` header.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::errors::WebhookError;
use crate::types::WebhookSecret;
use crate::webhooks::events::Envelope;

type HmacSha256 = Hmac<Sha256>;

/// Prefix for generated webhook secrets
pub const SECRET_PREFIX: &str = "whsec_";

/// Errors caused by unusable secret material. Never caused by payload content.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SigningError {
    #[error("webhook secret is empty")]
    EmptySecret,

    #[error("invalid HMAC key: {0}")]
    InvalidKey(String),
}

/// Generate a new webhook secret for a subscription.
///
/// Returns a `whsec_` prefixed base64-encoded 32-byte random secret. The whole string
/// (prefix included) is the key material, so subscribers can use it verbatim.
pub fn generate_secret() -> String {
    use rand::RngCore;

    let mut secret_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret_bytes);

    format!("{}{}", SECRET_PREFIX, BASE64_STANDARD.encode(secret_bytes))
}

fn keyed_mac(secret: &WebhookSecret) -> Result<HmacSha256, SigningError> {
    if secret.is_empty() {
        return Err(SigningError::EmptySecret);
    }
    HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| SigningError::InvalidKey(e.to_string()))
}

/// Sign an already-serialized payload.
pub fn sign_payload(secret: &WebhookSecret, payload: &[u8]) -> Result<String, SigningError> {
    let mut mac = keyed_mac(secret)?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Sign the canonical serialization of an envelope.
pub fn sign_envelope(secret: &WebhookSecret, envelope: &Envelope) -> Result<String, WebhookError> {
    let body = envelope.to_canonical_json()?;
    Ok(sign_payload(secret, body.as_bytes())?)
}

/// Verify a hex signature over `payload`. Comparison is constant-time.
pub fn verify_signature(secret: &WebhookSecret, payload: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = keyed_mac(secret) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhooks::events::{Event, WebhookTrigger};
    use serde_json::json;

    const PAYLOAD: &[u8] = br#"{"version":"2024-10-01","id":"evt_1","event":"document.deleted"}"#;

    #[test]
    fn test_generate_secret() {
        let secret = generate_secret();
        assert!(secret.starts_with(SECRET_PREFIX));

        let encoded = secret.strip_prefix(SECRET_PREFIX).unwrap();
        assert_eq!(BASE64_STANDARD.decode(encoded).unwrap().len(), 32);

        assert_ne!(generate_secret(), secret);
    }

    #[test]
    fn test_sign_is_deterministic() {
        let secret = WebhookSecret::from("whsec_test");

        let first = sign_payload(&secret, PAYLOAD).unwrap();
        let second = sign_payload(&secret, PAYLOAD).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        let secret = WebhookSecret::from("Jefe");
        let signature = sign_payload(&secret, b"what do ya want for nothing?").unwrap();
        assert_eq!(signature, "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843");
    }

    #[test]
    fn test_single_byte_changes_signature() {
        let secret = WebhookSecret::from("whsec_test");
        let original = sign_payload(&secret, PAYLOAD).unwrap();

        for index in [0, PAYLOAD.len() / 2, PAYLOAD.len() - 1] {
            let mut tampered = PAYLOAD.to_vec();
            tampered[index] ^= 0x01;
            assert_ne!(sign_payload(&secret, &tampered).unwrap(), original, "byte {index}");
        }

        let other_secret = WebhookSecret::from("whsec_tesu");
        assert_ne!(sign_payload(&other_secret, PAYLOAD).unwrap(), original);
    }

    #[test]
    fn test_secret_not_embedded_in_signature() {
        let secret = WebhookSecret::from("abcdef");
        let signature = sign_payload(&secret, PAYLOAD).unwrap();
        assert!(!signature.contains("abcdef"));
        assert!(!signature.contains(&hex::encode("abcdef")));
    }

    #[test]
    fn test_empty_secret_fails() {
        let secret = WebhookSecret::new(Vec::new());
        assert_eq!(sign_payload(&secret, PAYLOAD), Err(SigningError::EmptySecret));
        // Empty payloads are fine
        assert!(sign_payload(&WebhookSecret::from("s"), b"").is_ok());
    }

    #[test]
    fn test_sign_and_verify() {
        let secret = WebhookSecret::from(generate_secret());
        let signature = sign_payload(&secret, PAYLOAD).unwrap();

        assert!(verify_signature(&secret, PAYLOAD, &signature));
        assert!(!verify_signature(&secret, b"tampered", &signature));
        assert!(!verify_signature(&WebhookSecret::from(generate_secret()), PAYLOAD, &signature));
        assert!(!verify_signature(&secret, PAYLOAD, "not-hex"));
        assert!(!verify_signature(&secret, PAYLOAD, &signature[..62]));
        assert!(!verify_signature(&WebhookSecret::new(Vec::new()), PAYLOAD, &signature));
    }

    #[test]
    fn test_sign_envelope_matches_body_signature() {
        let event = Event::from_parts(
            "evt_1",
            WebhookTrigger::DataroomCreated,
            "2024-10-01T00:00:00Z".parse().unwrap(),
            json!({"dataroom": {
                "id": "dr_1",
                "name": "Series A",
                "createdAt": "2024-10-01T00:00:00Z",
                "updatedAt": "2024-10-01T00:00:00Z"
            }}),
        );
        let envelope = Envelope::build(&event).unwrap();
        let secret = WebhookSecret::from("whsec_test");

        let signature = sign_envelope(&secret, &envelope).unwrap();
        let body = envelope.to_canonical_json().unwrap();
        assert!(verify_signature(&secret, body.as_bytes(), &signature));
    }
}
