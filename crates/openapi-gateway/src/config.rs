//! Runtime configuration read from environment variables.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GATEWAY_HOST` | `0.0.0.0` | Address to bind. |
//! | `GATEWAY_PORT` | `8005` | TCP port to listen on. |
//! | `GATEWAY_SERVICES_FILE` | `services.json` | Registry file. |
//! | `GATEWAY_KEY` | *(none)* | Shared secret. Takes precedence over the file. |
//! | `GATEWAY_KEY_FILE` | `api_key.txt` | File holding the shared secret, re-read on use. |
//! | `GATEWAY_UPSTREAM_TIMEOUT_SECS` | `30` | Per-call timeout for proxied requests. `0` is ignored. |
//! | `GATEWAY_SCHEMA_RETRY_ATTEMPTS` | `5` | Document fetch attempts per backend at startup. |
//! | `GATEWAY_SCHEMA_RETRY_BASE_MS` | `500` | First backoff delay. |
//! | `GATEWAY_SCHEMA_RETRY_MAX_MS` | `8000` | Backoff cap. |
//! | `GATEWAY_SCHEMA_DEADLINE_SECS` | `60` | Budget for the startup document build. |
//! | `GATEWAY_INJECT_ALL_SERVICES` | `false` | Inject key parameters into the combined document too. |
//! | `GATEWAY_PROBE_ALLOWED_HOSTS` | *(empty)* | Comma-separated probe allow-list; empty disables `/check-website`. |
//! | `GATEWAY_INSECURE_SCHEMA_TLS` | `false` | Accept invalid certificates when fetching backend documents. |

use crate::openapi::AggregateOptions;
use crate::retry::RetryConfig;
use crate::secret::GatewaySecret;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for [`GatewayServer`](crate::server::GatewayServer).
#[derive(Debug, Clone)]
pub struct GatewayServerConfig {
    pub host: String,
    pub port: u16,
    pub services_file: PathBuf,
    pub secret: GatewaySecret,
    pub upstream_timeout: Duration,
    pub aggregate: AggregateOptions,
    /// Hosts `/check-website` may probe. Empty disables the probe.
    pub probe_allowed_hosts: Vec<String>,
    pub insecure_schema_tls: bool,
}

impl Default for GatewayServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8005,
            services_file: PathBuf::from("services.json"),
            secret: GatewaySecret::File(PathBuf::from("api_key.txt")),
            upstream_timeout: Duration::from_secs(30),
            aggregate: AggregateOptions::default(),
            probe_allowed_hosts: Vec::new(),
            insecure_schema_tls: false,
        }
    }
}

impl GatewayServerConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, falling back to defaults for
    /// absent or unparsable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let flag = |key: &str| {
            lookup(key)
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false)
        };

        let secret = match lookup("GATEWAY_KEY").filter(|k| !k.trim().is_empty()) {
            Some(key) => GatewaySecret::Static(key),
            None => GatewaySecret::File(
                lookup("GATEWAY_KEY_FILE")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("api_key.txt")),
            ),
        };

        let retry = RetryConfig::exponential(
            parsed("GATEWAY_SCHEMA_RETRY_ATTEMPTS").unwrap_or(5) as usize,
            parsed("GATEWAY_SCHEMA_RETRY_BASE_MS").unwrap_or(500),
            parsed("GATEWAY_SCHEMA_RETRY_MAX_MS").unwrap_or(8_000),
        );

        Self {
            host: lookup("GATEWAY_HOST").unwrap_or(defaults.host),
            port: lookup("GATEWAY_PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.port),
            services_file: lookup("GATEWAY_SERVICES_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.services_file),
            secret,
            upstream_timeout: parsed("GATEWAY_UPSTREAM_TIMEOUT_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.upstream_timeout),
            aggregate: AggregateOptions {
                startup_retry: retry,
                startup_deadline: parsed("GATEWAY_SCHEMA_DEADLINE_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.aggregate.startup_deadline),
                inject_all_services: flag("GATEWAY_INJECT_ALL_SERVICES"),
                ..defaults.aggregate
            },
            probe_allowed_hosts: lookup("GATEWAY_PROBE_ALLOWED_HOSTS")
                .map(|v| {
                    v.split(',')
                        .map(|h| h.trim().to_string())
                        .filter(|h| !h.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            insecure_schema_tls: flag("GATEWAY_INSECURE_SCHEMA_TLS"),
        }
    }
}
