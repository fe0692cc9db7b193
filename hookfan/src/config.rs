//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The file path
//! defaults to `config.yaml` but can be specified via `-f` or the `HOOKFAN_CONFIG` environment
//! variable. A missing file is not an error; every field has a default.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `HOOKFAN_` override YAML values
//!
//! For nested values use double underscores, e.g. `HOOKFAN_DISPATCHER__DISPATCH_TIMEOUT=20s`
//! or `HOOKFAN_PUBLISHER__QSTASH__TOKEN=...`.
//!
//! ## Example
//!
//! ```yaml
//! enable_otel_export: false
//! dispatcher:
//!   callback_url: https://app.example.com/api/webhooks/callback
//!   max_concurrent_publishes: 20
//!   dispatch_timeout: 15s
//! publisher:
//!   qstash:
//!     token: "<set via HOOKFAN_PUBLISHER__QSTASH__TOKEN>"
//!     timeout: 10s
//! ```

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::webhooks::events::WebhookTrigger;

/// CLI args: config file location plus the command to run
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "HOOKFAN_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit.
    #[arg(long)]
    pub validate: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Fan one event out to every destination in a subscription file
    Dispatch {
        /// Event trigger, e.g. `link.created`
        #[arg(long)]
        trigger: WebhookTrigger,
        /// JSON file with the event data (`-` for stdin)
        #[arg(long)]
        data: PathBuf,
        /// YAML or JSON file listing destinations (`id`, `endpoint`, `secret`)
        #[arg(long)]
        destinations: PathBuf,
    },
    /// Check a received payload against its signature header
    Verify {
        /// Destination secret
        #[arg(long, env = "HOOKFAN_VERIFY_SECRET", hide_env_values = true)]
        secret: String,
        /// Value of the signature header
        #[arg(long)]
        signature: String,
        /// File with the raw request body (`-` for stdin)
        #[arg(long)]
        body: PathBuf,
    },
}

/// Main application configuration.
///
/// All fields have defaults, so an empty file (or none at all) runs against the dummy
/// publisher.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
    /// Fan-out behaviour
    pub dispatcher: DispatcherConfig,
    /// Which publish backend receives signed requests
    pub publisher: PublisherConfig,
}

/// Dispatcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatcherConfig {
    /// Callback endpoint the queue reports delivery outcomes to. Each destination's
    /// callback reference is this URL plus a `webhookId` query parameter.
    pub callback_url: Url,
    /// Maximum concurrent publish calls within one `dispatch` call (default: 20)
    pub max_concurrent_publishes: usize,
    /// Upper bound for a whole `dispatch` call. Submissions still pending are abandoned
    /// and reported as rejected. Unset means wait for every submission.
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub dispatch_timeout: Option<Duration>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            callback_url: Url::parse("http://localhost:3000/api/webhooks/callback").expect("valid default callback URL"),
            max_concurrent_publishes: 20,
            dispatch_timeout: None,
        }
    }
}

/// Publish backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PublisherConfig {
    /// QStash durable queue
    /// Set credentials via:
    /// - `HOOKFAN_PUBLISHER__QSTASH__TOKEN` - QStash API token
    Qstash(QStashConfig),
    /// In-process publisher that accepts everything (development)
    Dummy(DummyPublisherConfig),
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self::Dummy(DummyPublisherConfig::default())
    }
}

/// QStash configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct QStashConfig {
    /// QStash API base URL
    pub base_url: Url,
    /// QStash API token (required)
    pub token: String,
    /// HTTP timeout for publish calls (default: 10s)
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Ask QStash not to show forwarded headers in its console (default: true)
    pub hide_headers: bool,
}

impl Default for QStashConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("https://qstash.upstash.io").expect("valid default QStash URL"),
            token: String::new(),
            timeout: Duration::from_secs(10),
            hide_headers: true,
        }
    }
}

impl fmt::Debug for QStashConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QStashConfig")
            .field("base_url", &self.base_url)
            .field("token", &if self.token.is_empty() { "" } else { "[REDACTED]" })
            .field("timeout", &self.timeout)
            .field("hide_headers", &self.hide_headers)
            .finish()
    }
}

/// Dummy publisher configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DummyPublisherConfig {
    /// Simulated enqueue latency (default: none)
    #[serde(with = "humantime_serde")]
    pub latency: Duration,
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.dispatcher.max_concurrent_publishes == 0 {
            anyhow::bail!("Config validation: dispatcher.max_concurrent_publishes must be at least 1");
        }

        if !matches!(self.dispatcher.callback_url.scheme(), "http" | "https") {
            anyhow::bail!(
                "Config validation: dispatcher.callback_url must be an http(s) URL, got {}",
                self.dispatcher.callback_url
            );
        }

        if self.dispatcher.dispatch_timeout.is_some_and(|t| t.is_zero()) {
            anyhow::bail!("Config validation: dispatcher.dispatch_timeout must be greater than zero when set");
        }

        if let PublisherConfig::Qstash(qstash) = &self.publisher {
            if qstash.token.is_empty() {
                anyhow::bail!(
                    "Config validation: QStash publisher is selected but no token is configured. \
                     Please set HOOKFAN_PUBLISHER__QSTASH__TOKEN or add publisher.qstash.token to the config file."
                );
            }
            if !matches!(qstash.base_url.scheme(), "http" | "https") {
                anyhow::bail!("Config validation: publisher.qstash.base_url must be an http(s) URL");
            }
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables override specific values
            .merge(Env::prefixed("HOOKFAN_").ignore(&["CONFIG", "VERIFY_SECRET"]).split("__"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args(path: &str) -> Args {
        Args {
            config: path.to_string(),
            validate: false,
            command: None,
        }
    }

    #[test]
    fn test_defaults_without_file() {
        Jail::expect_with(|_jail| {
            let config = Config::load(&args("missing.yaml"))?;

            assert!(!config.enable_otel_export);
            assert_eq!(config.dispatcher.max_concurrent_publishes, 20);
            assert_eq!(config.dispatcher.dispatch_timeout, None);
            assert!(matches!(config.publisher, PublisherConfig::Dummy(_)));

            Ok(())
        });
    }

    #[test]
    fn test_qstash_config() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
dispatcher:
  callback_url: https://app.example.com/api/webhooks/callback
  dispatch_timeout: 15s
publisher:
  qstash:
    token: qs-token
    timeout: 3s
"#,
            )?;

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(
                config.dispatcher.callback_url.as_str(),
                "https://app.example.com/api/webhooks/callback"
            );
            assert_eq!(config.dispatcher.dispatch_timeout, Some(Duration::from_secs(15)));
            assert_eq!(config.dispatcher.max_concurrent_publishes, 20); // default

            let PublisherConfig::Qstash(qstash) = config.publisher else {
                panic!("expected qstash publisher");
            };
            assert_eq!(qstash.token, "qs-token");
            assert_eq!(qstash.timeout, Duration::from_secs(3));
            assert_eq!(qstash.base_url.as_str(), "https://qstash.upstash.io/");
            assert!(qstash.hide_headers);

            Ok(())
        });
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
dispatcher:
  max_concurrent_publishes: 5
publisher:
  qstash:
    base_url: https://qstash.internal
"#,
            )?;

            jail.set_env("HOOKFAN_DISPATCHER__MAX_CONCURRENT_PUBLISHES", "50");
            jail.set_env("HOOKFAN_PUBLISHER__QSTASH__TOKEN", "from-env");

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.dispatcher.max_concurrent_publishes, 50);
            let PublisherConfig::Qstash(qstash) = config.publisher else {
                panic!("expected qstash publisher");
            };
            assert_eq!(qstash.token, "from-env");
            // YAML values should be preserved
            assert_eq!(qstash.base_url.as_str(), "https://qstash.internal/");

            Ok(())
        });
    }

    #[test]
    fn test_qstash_without_token_fails_validation() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
publisher:
  qstash:
    timeout: 3s
"#,
            )?;

            let err = Config::load(&args("test.yaml")).unwrap_err();
            assert!(err.to_string().contains("no token is configured"));

            Ok(())
        });
    }

    #[test]
    fn test_zero_concurrency_fails_validation() {
        let mut config = Config::default();
        config.dispatcher.max_concurrent_publishes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_http_callback_fails_validation() {
        let mut config = Config::default();
        config.dispatcher.callback_url = "ftp://example.com/callback".parse().unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "dispatcher:\n  callback: https://example.com\n")?;
            assert!(Config::load(&args("test.yaml")).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_qstash_token_not_in_debug() {
        let config = QStashConfig {
            token: "very-secret".to_string(),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_dummy_latency() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "publisher:\n  dummy:\n    latency: 250ms\n")?;

            let config = Config::load(&args("test.yaml"))?;
            let PublisherConfig::Dummy(dummy) = config.publisher else {
                panic!("expected dummy publisher");
            };
            assert_eq!(dummy.latency, Duration::from_millis(250));

            Ok(())
        });
    }
}
