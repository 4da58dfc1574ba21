//! Allow-listed liveness probe.
//!
//! `HEAD`s a caller-supplied URL and reports whether it answered below 400.
//! Only hosts on the allow-list may be probed; an empty list disables the
//! probe.

use crate::error::{GatewayError, GatewayResult};
use reqwest::Client;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;
use url::Url;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Hosts the probe may contact.
#[derive(Debug, Clone, Default)]
pub struct ProbePolicy {
    allowed_hosts: HashSet<String>,
}

impl ProbePolicy {
    pub fn new(allowed_hosts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            allowed_hosts: allowed_hosts
                .into_iter()
                .map(|h| h.into().trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.allowed_hosts.is_empty()
    }

    /// Parse `target` and check it against the allow-list.
    pub fn check(&self, target: &str) -> GatewayResult<Url> {
        if !self.is_enabled() {
            return Err(GatewayError::ProbeForbidden("probe is disabled".to_string()));
        }
        let url = Url::parse(target)
            .map_err(|e| GatewayError::ProbeForbidden(format!("invalid url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(GatewayError::ProbeForbidden(format!(
                "scheme '{}' is not allowed",
                url.scheme()
            )));
        }
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        if !self.allowed_hosts.contains(&host) {
            return Err(GatewayError::ProbeForbidden(format!(
                "host '{host}' is not on the allow-list"
            )));
        }
        Ok(url)
    }
}

/// `HEAD url`; `true` when the status is below 400. Transport errors
/// report `false`.
pub async fn probe(client: &Client, url: Url) -> bool {
    match client.head(url.clone()).timeout(PROBE_TIMEOUT).send().await {
        Ok(resp) => resp.status().as_u16() < 400,
        Err(err) => {
            debug!(url = %url, error = %err, "probe failed");
            false
        }
    }
}
