//! reqwest-based [`UpstreamForwarder`].
//!
//! The proxy relays upstream bodies verbatim when they are JSON. A body that
//! is not JSON is replaced by a small diagnostic object while the upstream
//! status code is kept.

use super::UpstreamForwarder;
use crate::error::{GatewayError, GatewayResult};
use crate::registry::ServiceDescriptor;
use crate::types::{GatewayRequest, GatewayResponse, HttpMethod};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// Diagnostic message used when an upstream body is not valid JSON.
pub const NON_JSON_ERROR: &str = "Upstream did not return valid JSON";

/// Inbound headers never sent upstream. `host` would misidentify the target;
/// the body is re-serialized so its length and encoding are recomputed.
const STRIPPED_REQUEST_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "accept-encoding",
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Upstream headers not relayed back; framing is recomputed by the server and
/// the gateway always answers with JSON.
const STRIPPED_RESPONSE_HEADERS: &[&str] = &[
    "content-length",
    "content-type",
    "content-encoding",
    "connection",
    "keep-alive",
    "transfer-encoding",
];

/// Proxies requests to any registered backend over HTTP.
pub struct HttpForwarder {
    client: Client,
    timeout: Duration,
}

impl HttpForwarder {
    /// - `client`:  shared reqwest client.
    /// - `timeout`: per-call deadline covering connect, send and body read.
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn classify(&self, service: &str, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::UpstreamTimeout {
                service: service.to_string(),
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else if err.is_builder() {
            GatewayError::InvalidRequest(err.to_string())
        } else {
            GatewayError::UpstreamUnreachable {
                service: service.to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl UpstreamForwarder for HttpForwarder {
    #[instrument(skip(self, service, req), fields(service = %service.name, request_id = %req.id))]
    async fn forward(
        &self,
        service: &ServiceDescriptor,
        req: &GatewayRequest,
    ) -> GatewayResult<GatewayResponse> {
        let url = target_url(&service.endpoint, &req.path, req.query.as_deref());
        debug!(url = %url, method = req.method.as_str(), "forwarding to backend");

        let mut builder = self
            .client
            .request(reqwest_method(req.method), &url)
            .timeout(self.timeout);

        for (name, value) in &req.headers {
            if is_stripped(STRIPPED_REQUEST_HEADERS, name) {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }

        if req.method.carries_body() && !req.body.is_empty() {
            let payload: serde_json::Value = serde_json::from_slice(&req.body)
                .map_err(|e| GatewayError::InvalidRequest(format!("body is not valid JSON: {e}")))?;
            builder = builder.json(&payload);
        }

        let start = Instant::now();
        let upstream = builder
            .send()
            .await
            .map_err(|e| self.classify(&service.name, e))?;

        let status = upstream.status().as_u16();
        let mut resp = GatewayResponse::new(status, &service.name);
        for (name, value) in upstream.headers() {
            if is_stripped(STRIPPED_RESPONSE_HEADERS, name.as_str()) {
                continue;
            }
            if let Ok(v) = value.to_str() {
                resp.headers.push((name.to_string(), v.to_string()));
            }
        }

        let body = upstream
            .bytes()
            .await
            .map_err(|e| self.classify(&service.name, e))?;

        resp.headers
            .push(("content-type".to_string(), "application/json".to_string()));
        resp.body = relay_body(status, &body);
        resp.latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(resp)
    }
}

/// Join `endpoint` and `path` with exactly one `/` and append the raw query.
///
/// No normalization beyond the join: `..` segments pass through unchanged.
pub fn target_url(endpoint: &str, path: &str, query: Option<&str>) -> String {
    let mut url = format!(
        "{}/{}",
        endpoint.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    if let Some(q) = query.filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(q);
    }
    url
}

/// Upstream body as sent to the caller: verbatim when valid JSON, otherwise
/// a diagnostic object carrying the upstream status.
pub fn relay_body(status: u16, body: &[u8]) -> Vec<u8> {
    if serde_json::from_slice::<serde::de::IgnoredAny>(body).is_ok() {
        return body.to_vec();
    }
    debug!(status, bytes = body.len(), "upstream body is not JSON");
    json!({ "error": NON_JSON_ERROR, "status": status })
        .to_string()
        .into_bytes()
}

fn is_stripped(list: &[&str], name: &str) -> bool {
    list.iter().any(|h| h.eq_ignore_ascii_case(name))
}

fn reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_uses_a_single_slash() {
        assert_eq!(target_url("http://a:1/", "/x/y", None), "http://a:1/x/y");
        assert_eq!(target_url("http://a:1", "x/y", None), "http://a:1/x/y");
        assert_eq!(target_url("http://a:1//", "//x", None), "http://a:1/x");
    }

    #[test]
    fn dot_segments_pass_through() {
        assert_eq!(
            target_url("http://a/api", "../admin", None),
            "http://a/api/../admin"
        );
    }

    #[test]
    fn query_is_appended_verbatim() {
        assert_eq!(
            target_url("http://a", "items", Some("gateway_key=k&q=a%20b")),
            "http://a/items?gateway_key=k&q=a%20b"
        );
        assert_eq!(target_url("http://a", "items", Some("")), "http://a/items");
    }

    #[test]
    fn host_is_stripped_in_any_case() {
        for name in ["host", "Host", "HOST", "hOsT"] {
            assert!(is_stripped(STRIPPED_REQUEST_HEADERS, name));
        }
        assert!(!is_stripped(STRIPPED_REQUEST_HEADERS, "authorization"));
        assert!(!is_stripped(STRIPPED_REQUEST_HEADERS, "x-host-id"));
    }

    #[test]
    fn json_body_is_relayed_verbatim() {
        let body = br#"{"items": [1, 2]}"#;
        assert_eq!(relay_body(200, body), body.to_vec());
        assert_eq!(relay_body(200, b"null"), b"null".to_vec());
    }

    #[test]
    fn non_json_body_becomes_diagnostic() {
        let out = relay_body(200, b"<html>oops</html>");
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value, json!({ "error": NON_JSON_ERROR, "status": 200 }));

        let empty = relay_body(502, b"");
        let value: serde_json::Value = serde_json::from_slice(&empty).unwrap();
        assert_eq!(value["status"], 502);
    }
}
