//! Service registry.
//!
//! The registry is the flat list of backend [`ServiceDescriptor`]s the
//! gateway proxies to and aggregates documents from. It is persisted as
//! `{"services": [ ... ]}` and always replaced wholesale.

mod file;
mod memory;

pub use file::FileServiceRegistry;
pub use memory::InMemoryServiceRegistry;

use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

// ─────────────────────────────────────────────────────────────────────────────
// ServiceDescriptor
// ─────────────────────────────────────────────────────────────────────────────

/// One registered backend.
///
/// `security`, `securitySchemes`, `gateway_api` and `api_key` are opaque
/// OpenAPI fragments copied into the combined document. An explicit `null`
/// is held as `Some(Value::Null)` so it is written back as `null`; use
/// [`present`] to read these fields. Unknown fields are kept in `extra` so a
/// load/replace cycle never drops data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Registry key and URL path prefix.
    pub name: String,
    /// Base URL requests are forwarded to.
    pub endpoint: String,
    /// URL of the backend's OpenAPI document.
    pub swagger: String,
    #[serde(
        default,
        deserialize_with = "keep_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub security: Option<Value>,
    #[serde(
        default,
        rename = "securitySchemes",
        deserialize_with = "keep_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub security_schemes: Option<Value>,
    /// Parameter injected into every operation, defaulted to the shared secret.
    #[serde(
        default,
        deserialize_with = "keep_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub gateway_api: Option<Value>,
    /// Parameter advertised on every operation. Never enforced.
    #[serde(
        default,
        deserialize_with = "keep_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ServiceDescriptor {
    /// Construct a minimal descriptor.
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        swagger: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            swagger: swagger.into(),
            security: None,
            security_schemes: None,
            gateway_api: None,
            api_key: None,
            extra: Map::new(),
        }
    }

    /// Builder: set the top-level security requirement.
    pub fn with_security(mut self, security: Value) -> Self {
        self.security = Some(security);
        self
    }

    /// Builder: set the security scheme definitions.
    pub fn with_security_schemes(mut self, schemes: Value) -> Self {
        self.security_schemes = Some(schemes);
        self
    }

    /// Builder: set the injected gateway-key parameter descriptor.
    pub fn with_gateway_api(mut self, param: Value) -> Self {
        self.gateway_api = Some(param);
        self
    }

    /// Builder: set the advertised api-key parameter descriptor.
    pub fn with_api_key(mut self, param: Value) -> Self {
        self.api_key = Some(param);
        self
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("service name cannot be empty".to_string());
        }
        if self.name.contains('/') {
            return Err(format!("service name '{}' must not contain '/'", self.name));
        }
        check_http_url(&self.name, "endpoint", &self.endpoint)?;
        check_http_url(&self.name, "swagger", &self.swagger)?;
        for (field, value) in [("gateway_api", &self.gateway_api), ("api_key", &self.api_key)] {
            if let Some(v) = present(value) {
                if !v.is_object() {
                    return Err(format!(
                        "service '{}': {field} must be a parameter object",
                        self.name
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A present field's value; `None` for both an absent key and an explicit
/// `null`.
pub fn present(field: &Option<Value>) -> Option<&Value> {
    field.as_ref().filter(|v| !v.is_null())
}

/// Called only when the key exists, so `null` becomes `Some(Value::Null)`.
fn keep_null<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn check_http_url(service: &str, field: &str, value: &str) -> Result<(), String> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(format!(
            "service '{service}': {field} '{value}' must start with http:// or https://"
        ));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// RegistryDocument
// ─────────────────────────────────────────────────────────────────────────────

/// On-disk / wire shape of the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryDocument {
    pub services: Vec<ServiceDescriptor>,
}

impl RegistryDocument {
    pub fn new(services: Vec<ServiceDescriptor>) -> Self {
        Self { services }
    }

    /// Parse and validate a raw JSON payload.
    pub fn from_value(value: Value) -> Result<Self, String> {
        let doc: RegistryDocument =
            serde_json::from_value(value).map_err(|e| format!("malformed registry: {e}"))?;
        doc.validate()?;
        Ok(doc)
    }

    /// Parse and validate raw bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, String> {
        let doc: RegistryDocument =
            serde_json::from_slice(bytes).map_err(|e| format!("malformed registry: {e}"))?;
        doc.validate()?;
        Ok(doc)
    }

    /// Structural checks: every descriptor valid, names unique.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for service in &self.services {
            service.validate()?;
            if !seen.insert(service.name.as_str()) {
                return Err(format!("service '{}' is registered twice", service.name));
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ServiceRegistry trait
// ─────────────────────────────────────────────────────────────────────────────

/// Source of truth for registered backends.
///
/// Every call re-reads the underlying store; implementations hold no cache.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Read the full registry.
    ///
    /// Fails with [`GatewayError::RegistryUnavailable`] when the store cannot
    /// be read, parsed or validated.
    async fn load(&self) -> GatewayResult<Vec<ServiceDescriptor>>;

    /// Overwrite the registry with `payload` and return the reloaded result.
    ///
    /// Invalid payloads fail with [`GatewayError::InvalidRegistry`] and leave
    /// the store untouched.
    async fn replace(&self, payload: RegistryDocument) -> GatewayResult<Vec<ServiceDescriptor>>;

    /// Exact-match lookup by service name.
    async fn find_by_name(&self, name: &str) -> GatewayResult<Option<ServiceDescriptor>> {
        Ok(self.load().await?.into_iter().find(|s| s.name == name))
    }
}
