//! Gateway error types

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Every failure the gateway can report to a caller.
///
/// Each variant maps to one HTTP status and one machine-readable code in the
/// [`IntoResponse`] impl below.
#[derive(Debug, Error)]
pub enum GatewayError {
    // ── Registry ─────────────────────────────────────────────────────────────
    #[error("service registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("failed to write service registry: {0}")]
    RegistryWriteError(String),

    #[error("invalid service registry: {0}")]
    InvalidRegistry(String),

    #[error("service '{0}' not found")]
    ServiceNotFound(String),

    // ── Gated access ─────────────────────────────────────────────────────────
    #[error("gateway_key query parameter is required")]
    MissingKey,

    #[error("gateway_key query parameter is invalid")]
    InvalidKey,

    #[error("gateway secret unavailable: {0}")]
    SecretUnavailable(String),

    // ── Forwarding ───────────────────────────────────────────────────────────
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("service '{service}' is unreachable: {message}")]
    UpstreamUnreachable { service: String, message: String },

    #[error("service '{service}' did not respond within {timeout_ms} ms")]
    UpstreamTimeout { service: String, timeout_ms: u64 },

    // ── Schema aggregation ───────────────────────────────────────────────────
    #[error("failed to fetch OpenAPI document for '{service}': {message}")]
    SchemaFetch {
        service: String,
        status: Option<u16>,
        message: String,
    },

    #[error("combined OpenAPI document is still being assembled")]
    SchemaNotReady,

    // ── Probe ────────────────────────────────────────────────────────────────
    #[error("probe target refused: {0}")]
    ProbeForbidden(String),
}

impl GatewayError {
    /// HTTP status this error is surfaced as.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::RegistryUnavailable(_)
            | GatewayError::RegistryWriteError(_)
            | GatewayError::SecretUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::InvalidRegistry(_)
            | GatewayError::MissingKey
            | GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::ServiceNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::InvalidKey => StatusCode::UNAUTHORIZED,
            GatewayError::UpstreamUnreachable { .. } | GatewayError::SchemaFetch { .. } => {
                StatusCode::BAD_GATEWAY
            }
            GatewayError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::SchemaNotReady => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::ProbeForbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::RegistryUnavailable(_) => "REGISTRY_UNAVAILABLE",
            GatewayError::RegistryWriteError(_) => "REGISTRY_WRITE_ERROR",
            GatewayError::InvalidRegistry(_) => "INVALID_REGISTRY",
            GatewayError::ServiceNotFound(_) => "SERVICE_NOT_FOUND",
            GatewayError::MissingKey => "MISSING_KEY",
            GatewayError::InvalidKey => "INVALID_KEY",
            GatewayError::SecretUnavailable(_) => "SECRET_UNAVAILABLE",
            GatewayError::InvalidRequest(_) => "INVALID_REQUEST",
            GatewayError::UpstreamUnreachable { .. } => "UPSTREAM_UNREACHABLE",
            GatewayError::UpstreamTimeout { .. } => "UPSTREAM_TIMEOUT",
            GatewayError::SchemaFetch { .. } => "SCHEMA_FETCH_FAILED",
            GatewayError::SchemaNotReady => "SCHEMA_NOT_READY",
            GatewayError::ProbeForbidden(_) => "PROBE_FORBIDDEN",
        }
    }

    fn upstream_status(&self) -> Option<u16> {
        match self {
            GatewayError::SchemaFetch { status, .. } => *status,
            _ => None,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut error = json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        if let Some(upstream) = self.upstream_status() {
            error["upstream_status"] = json!(upstream);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
