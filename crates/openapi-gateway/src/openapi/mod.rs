//! OpenAPI aggregation.
//!
//! [`SchemaAggregator`] fetches each backend's OpenAPI document, prefixes its
//! routes with the service name and merges everything into one combined
//! document. A backend that cannot be fetched is skipped and listed under
//! [`UNAVAILABLE_EXTENSION`]; it never blanks out the other backends.

mod merge;

pub use merge::{
    DocumentMerger, UNAVAILABLE_EXTENSION, WELL_KNOWN_COMPONENTS, api_key_parameter,
    gateway_parameter, inject_parameters,
};

use crate::error::{GatewayError, GatewayResult};
use crate::registry::{ServiceDescriptor, ServiceRegistry, present};
use crate::retry::{RetryConfig, retry_with_deadline};
use crate::secret::GatewaySecret;
use futures::future::join_all;
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Tunables for [`SchemaAggregator`].
#[derive(Debug, Clone)]
pub struct AggregateOptions {
    /// Retry policy per backend when building the all-services document.
    pub startup_retry: RetryConfig,
    /// Overall budget for the all-services build; no retry sleeps past it.
    pub startup_deadline: Duration,
    /// Timeout of a single document fetch.
    pub fetch_timeout: Duration,
    /// Inject `gateway_api` / `api_key` parameters in all-services mode too.
    pub inject_all_services: bool,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            startup_retry: RetryConfig::exponential(5, 500, 8_000),
            startup_deadline: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(10),
            inject_all_services: false,
        }
    }
}

/// Builds combined OpenAPI documents from the registered backends.
pub struct SchemaAggregator {
    registry: Arc<dyn ServiceRegistry>,
    secret: GatewaySecret,
    client: Client,
    options: AggregateOptions,
}

impl SchemaAggregator {
    pub fn new(
        registry: Arc<dyn ServiceRegistry>,
        secret: GatewaySecret,
        client: Client,
        options: AggregateOptions,
    ) -> Self {
        Self {
            registry,
            secret,
            client,
            options,
        }
    }

    /// Combined document for one service, with parameter injection.
    #[instrument(skip(self))]
    pub async fn aggregate(&self, name: &str) -> GatewayResult<Value> {
        let service = self
            .registry
            .find_by_name(name)
            .await?
            .ok_or_else(|| GatewayError::ServiceNotFound(name.to_string()))?;
        let extra = self.injected_parameters(&service).await?;

        let mut merger = DocumentMerger::new();
        match self.fetch(&service).await {
            Ok(document) => contribute(&mut merger, &service, document, &extra),
            Err(err) => {
                warn!(service = %service.name, error = %err, "skipping unavailable backend");
                merger.mark_unavailable(&service.name);
            }
        }

        info!(service = %service.name, "built OpenAPI document for service");
        Ok(merger.finish(json!({
            "title": "API Gateway",
            "version": env!("CARGO_PKG_VERSION"),
            "description": format!("API Gateway document for service '{}'", service.name),
        })))
    }

    /// Combined document for every registered service.
    ///
    /// Backends are fetched concurrently, each with bounded backoff, and
    /// merged in registry order.
    #[instrument(skip(self))]
    pub async fn aggregate_all(&self) -> GatewayResult<Value> {
        let services = self.registry.load().await?;
        let deadline = Instant::now() + self.options.startup_deadline;

        let fetches = services.iter().map(|service| async move {
            let result = retry_with_deadline(
                &self.options.startup_retry,
                Some(deadline),
                move |attempt| async move {
                    let result = self.fetch(service).await;
                    if let Err(err) = &result {
                        debug!(service = %service.name, attempt, error = %err, "document fetch failed");
                    }
                    result
                },
            )
            .await;
            (service, result)
        });
        let fetched = join_all(fetches).await;

        let mut merger = DocumentMerger::new();
        let mut loaded = 0usize;
        for (service, result) in fetched {
            match result {
                Ok(document) => {
                    let extra = if self.options.inject_all_services {
                        self.injected_parameters(service).await.unwrap_or_else(|err| {
                            warn!(service = %service.name, error = %err, "merging without injected parameters");
                            Vec::new()
                        })
                    } else {
                        Vec::new()
                    };
                    contribute(&mut merger, service, document, &extra);
                    loaded += 1;
                    info!(service = %service.name, "loaded OpenAPI document");
                }
                Err(err) => {
                    warn!(service = %service.name, error = %err, "skipping unavailable backend");
                    merger.mark_unavailable(&service.name);
                }
            }
        }

        info!(
            loaded,
            total = services.len(),
            "built combined OpenAPI document"
        );
        Ok(merger.finish(json!({
            "title": "API Gateway",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "API Gateway for API Services",
        })))
    }

    async fn injected_parameters(&self, service: &ServiceDescriptor) -> GatewayResult<Vec<Value>> {
        let mut extra = Vec::new();
        if let Some(descriptor) = present(&service.gateway_api) {
            let secret = self.secret.current().await?;
            extra.push(gateway_parameter(descriptor, &secret));
        }
        if let Some(descriptor) = present(&service.api_key) {
            extra.push(api_key_parameter(descriptor));
        }
        Ok(extra)
    }

    async fn fetch(&self, service: &ServiceDescriptor) -> GatewayResult<Value> {
        let fetch_err = |status: Option<u16>, message: String| GatewayError::SchemaFetch {
            service: service.name.clone(),
            status,
            message,
        };

        let resp = self
            .client
            .get(&service.swagger)
            .timeout(self.options.fetch_timeout)
            .send()
            .await
            .map_err(|e| fetch_err(None, e.to_string()))?;

        let status = resp.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(fetch_err(Some(status.as_u16()), format!("HTTP {status}")));
        }

        let document: Value = resp
            .json()
            .await
            .map_err(|e| fetch_err(Some(status.as_u16()), e.to_string()))?;
        if !document.is_object() {
            return Err(fetch_err(
                Some(status.as_u16()),
                "document is not a JSON object".to_string(),
            ));
        }
        Ok(document)
    }
}

fn contribute(
    merger: &mut DocumentMerger,
    service: &ServiceDescriptor,
    mut document: Value,
    extra: &[Value],
) {
    if let Some(paths) = document.get_mut("paths").and_then(Value::as_object_mut) {
        inject_parameters(paths, extra);
    }
    merger.add_document(service, &document);
}

// ─────────────────────────────────────────────────────────────────────────────
// Cached all-services document
// ─────────────────────────────────────────────────────────────────────────────

/// Holds the latest all-services document.
///
/// Rebuilds run in the background; when two overlap, only the most recently
/// started one is allowed to publish.
#[derive(Default)]
pub struct CombinedDocument {
    current: RwLock<Option<Arc<Value>>>,
    generation: AtomicU64,
}

impl CombinedDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest document, or [`GatewayError::SchemaNotReady`] before the first
    /// build completes.
    pub async fn get(&self) -> GatewayResult<Arc<Value>> {
        self.current
            .read()
            .await
            .clone()
            .ok_or(GatewayError::SchemaNotReady)
    }

    /// Rebuild in a background task.
    pub fn spawn_rebuild(
        self: &Arc<Self>,
        aggregator: Arc<SchemaAggregator>,
    ) -> tokio::task::JoinHandle<()> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let this = Arc::clone(self);
        tokio::spawn(async move {
            match aggregator.aggregate_all().await {
                Ok(document) => {
                    let mut current = this.current.write().await;
                    if this.generation.load(Ordering::SeqCst) == generation {
                        *current = Some(Arc::new(document));
                    } else {
                        debug!(generation, "discarding superseded combined document");
                    }
                }
                Err(err) => warn!(error = %err, "failed to build combined OpenAPI document"),
            }
        })
    }
}
