//! Implementations of the `hookfan` subcommands.

use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Format, Yaml},
};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncReadExt;

use crate::config::Config;
use crate::publishers::create_publisher;
use crate::types::{Destination, WebhookSecret};
use crate::webhooks::{PublishResult, WebhookDispatcher, WebhookTrigger, verify_signature};

/// Subscription file layout. JSON works too, since it parses as YAML.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DestinationsFile {
    destinations: Vec<Destination>,
}

/// Load destinations from a subscription file.
pub fn load_destinations(path: &Path) -> anyhow::Result<Vec<Destination>> {
    if !path.is_file() {
        anyhow::bail!("Destinations file {} does not exist", path.display());
    }

    let file: DestinationsFile = Figment::from(Yaml::file(path))
        .extract()
        .with_context(|| format!("Failed to parse destinations file {}", path.display()))?;

    Ok(file.destinations)
}

/// Read a whole input file, or stdin when the path is `-`.
pub async fn read_input(path: &Path) -> anyhow::Result<String> {
    if path == Path::new("-") {
        let mut input = String::new();
        tokio::io::stdin()
            .read_to_string(&mut input)
            .await
            .context("Failed to read stdin")?;
        return Ok(input);
    }

    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

/// Dispatch one event to every destination in `destinations_path`.
pub async fn run_dispatch(
    config: &Config,
    trigger: WebhookTrigger,
    data_path: &Path,
    destinations_path: &Path,
) -> anyhow::Result<Vec<PublishResult>> {
    let destinations = load_destinations(destinations_path)?;
    let data: Value = serde_json::from_str(&read_input(data_path).await?).context("Event data is not valid JSON")?;

    let publisher = create_publisher(&config.publisher)?;
    let dispatcher = WebhookDispatcher::new(publisher, &config.dispatcher);

    tracing::info!(trigger = %trigger, destinations = destinations.len(), "Dispatching webhook event");
    let results = dispatcher.dispatch(&destinations, trigger, data).await?;

    Ok(results)
}

/// Check a received body against its signature header value.
pub async fn run_verify(secret: &str, signature: &str, body_path: &Path) -> anyhow::Result<bool> {
    let body = read_input(body_path).await?;
    Ok(verify_signature(&WebhookSecret::from(secret), body.as_bytes(), signature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhooks::sign_payload;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const DESTINATIONS: &str = r#"
destinations:
  - id: wh_a
    endpoint: https://a.example.com/hook
    secret: whsec_a
  - id: wh_b
    endpoint: https://b.example.com/hook
    secret: whsec_b
"#;

    #[test]
    fn test_load_destinations() {
        let file = write_temp(DESTINATIONS);
        let destinations = load_destinations(file.path()).unwrap();

        assert_eq!(destinations.len(), 2);
        assert_eq!(destinations[0].id, "wh_a");
        assert_eq!(destinations[1].endpoint.as_str(), "https://b.example.com/hook");
        assert_eq!(destinations[1].secret, WebhookSecret::from("whsec_b"));
    }

    #[test]
    fn test_load_destinations_json() {
        let file = write_temp(r#"{"destinations": [{"id": "wh_j", "endpoint": "https://j.example.com", "secret": "s"}]}"#);
        let destinations = load_destinations(file.path()).unwrap();
        assert_eq!(destinations[0].id, "wh_j");
    }

    #[test]
    fn test_load_destinations_missing_file() {
        let err = load_destinations(Path::new("/nonexistent/destinations.yaml")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_load_destinations_invalid_endpoint() {
        let file = write_temp("destinations:\n  - id: x\n    endpoint: not a url\n    secret: s\n");
        assert!(load_destinations(file.path()).is_err());
    }

    #[tokio::test]
    async fn test_run_dispatch_with_dummy_publisher() {
        let destinations = write_temp(DESTINATIONS);
        let data = write_temp(
            r#"{"dataroom": {"id": "dr_1", "name": "Series A", "createdAt": "2024-10-01T00:00:00Z", "updatedAt": "2024-10-01T00:00:00Z"}}"#,
        );

        let results = run_dispatch(
            &Config::default(),
            WebhookTrigger::DataroomCreated,
            data.path(),
            destinations.path(),
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_accepted()));
    }

    #[tokio::test]
    async fn test_run_dispatch_rejects_bad_data() {
        let destinations = write_temp(DESTINATIONS);
        let data = write_temp(r#"{"dataroom": {"id": "dr_1"}}"#);

        let err = run_dispatch(
            &Config::default(),
            WebhookTrigger::DataroomCreated,
            data.path(),
            destinations.path(),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("dataroom.created schema"));
    }

    #[tokio::test]
    async fn test_run_verify() {
        let body = r#"{"id":"evt_1"}"#;
        let file = write_temp(body);
        let signature = sign_payload(&WebhookSecret::from("whsec_v"), body.as_bytes()).unwrap();

        assert!(run_verify("whsec_v", &signature, file.path()).await.unwrap());
        assert!(!run_verify("whsec_other", &signature, file.path()).await.unwrap());
    }
}
