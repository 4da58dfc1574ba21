//! Source of the gateway's shared secret.

use crate::error::{GatewayError, GatewayResult};
use std::path::PathBuf;

/// Where the shared secret comes from.
///
/// A file source is re-read on every call so the secret can be rotated
/// without a restart.
#[derive(Debug, Clone)]
pub enum GatewaySecret {
    Static(String),
    File(PathBuf),
}

impl GatewaySecret {
    /// Current secret, trimmed of surrounding whitespace.
    pub async fn current(&self) -> GatewayResult<String> {
        match self {
            GatewaySecret::Static(secret) => Ok(secret.trim().to_string()),
            GatewaySecret::File(path) => tokio::fs::read_to_string(path)
                .await
                .map(|s| s.trim().to_string())
                .map_err(|e| GatewayError::SecretUnavailable(format!("{}: {e}", path.display()))),
        }
    }
}
