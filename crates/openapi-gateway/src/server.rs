//! Axum-based HTTP gateway server.
//!
//! [`GatewayServer`] wires the registry, filter pipeline, forwarder and
//! schema aggregator into a running axum service.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness check, always `200 OK`. |
//! | `GET`  | `/services` | Current registry. |
//! | `POST` | `/update` | Replace the registry, returns the reloaded list. |
//! | `GET`  | `/openapi.json` | Combined document of every service. |
//! | `GET`  | `/openapi/{name}` | Combined document of one service. |
//! | `GET`  | `/check-website?url=` | Allow-listed `HEAD` probe. |
//! | `GET POST PUT PATCH DELETE` | `/{service}`, `/{service}/`, `/{service}/{*path}` | Gated proxy to `service`. |

use crate::backend::{HttpForwarder, UpstreamForwarder};
use crate::config::GatewayServerConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::filter::{FilterAction, FilterPipeline, GatewayFilter, GatewayKeyFilter, LoggingFilter};
use crate::openapi::{CombinedDocument, SchemaAggregator};
use crate::probe::{ProbePolicy, probe};
use crate::registry::{FileServiceRegistry, RegistryDocument, ServiceDescriptor, ServiceRegistry};
use crate::secret::GatewaySecret;
use crate::types::{GatewayContext, GatewayRequest, GatewayResponse, HttpMethod};
use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Shared application state
// ─────────────────────────────────────────────────────────────────────────────

/// Shared state injected into every axum handler via [`State`] extractor.
#[derive(Clone)]
pub struct AppState {
    registry: Arc<dyn ServiceRegistry>,
    pipeline: Arc<FilterPipeline>,
    forwarder: Arc<dyn UpstreamForwarder>,
    aggregator: Arc<SchemaAggregator>,
    combined: Arc<CombinedDocument>,
    probe_policy: Arc<ProbePolicy>,
    probe_client: Client,
}

impl AppState {
    /// Assemble state from its parts. The pipeline is always access-log then
    /// gateway-key check.
    pub fn new(
        registry: Arc<dyn ServiceRegistry>,
        secret: GatewaySecret,
        forwarder: Arc<dyn UpstreamForwarder>,
        aggregator: Arc<SchemaAggregator>,
        probe_policy: ProbePolicy,
        probe_client: Client,
    ) -> Self {
        let filters: Vec<Arc<dyn GatewayFilter>> = vec![
            Arc::new(LoggingFilter::new()),
            Arc::new(GatewayKeyFilter::new(secret)),
        ];
        Self {
            registry,
            pipeline: Arc::new(FilterPipeline::new(filters)),
            forwarder,
            aggregator,
            combined: Arc::new(CombinedDocument::new()),
            probe_policy: Arc::new(probe_policy),
            probe_client,
        }
    }

    /// Start (or restart) the background build of the all-services document.
    pub fn rebuild_combined(&self) -> tokio::task::JoinHandle<()> {
        self.combined.spawn_rebuild(self.aggregator.clone())
    }
}

/// Build the axum [`Router`] over `state`.
pub fn router(state: AppState) -> Router {
    // `{*path}` never matches an empty remainder, so the service root needs
    // its own routes.
    let proxy = get(proxy_handler)
        .post(proxy_handler)
        .put(proxy_handler)
        .patch(proxy_handler)
        .delete(proxy_handler);

    Router::new()
        .route("/health", get(health_handler))
        .route("/services", get(list_services_handler))
        .route("/update", post(update_handler))
        .route("/openapi.json", get(combined_openapi_handler))
        .route("/openapi/{name}", get(service_openapi_handler))
        .route("/check-website", get(check_website_handler))
        .route("/{service}", proxy.clone())
        .route("/{service}/", proxy.clone())
        .route("/{service}/{*path}", proxy)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

// ─────────────────────────────────────────────────────────────────────────────
// GatewayServer
// ─────────────────────────────────────────────────────────────────────────────

/// High-level gateway server built from a [`GatewayServerConfig`].
pub struct GatewayServer {
    config: GatewayServerConfig,
}

impl GatewayServer {
    pub fn new(config: GatewayServerConfig) -> Self {
        Self { config }
    }

    /// Build production state: file registry, HTTP forwarder, aggregator.
    pub fn build_state(&self) -> std::io::Result<AppState> {
        let cfg = &self.config;

        let proxy_client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(std::io::Error::other)?;
        let schema_client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .danger_accept_invalid_certs(cfg.insecure_schema_tls)
            .build()
            .map_err(std::io::Error::other)?;

        let registry: Arc<dyn ServiceRegistry> =
            Arc::new(FileServiceRegistry::new(cfg.services_file.clone()));
        let forwarder = Arc::new(HttpForwarder::new(
            proxy_client.clone(),
            cfg.upstream_timeout,
        ));
        let aggregator = Arc::new(SchemaAggregator::new(
            registry.clone(),
            cfg.secret.clone(),
            schema_client,
            cfg.aggregate.clone(),
        ));

        Ok(AppState::new(
            registry,
            cfg.secret.clone(),
            forwarder,
            aggregator,
            ProbePolicy::new(cfg.probe_allowed_hosts.clone()),
            proxy_client,
        ))
    }

    /// Bind to `{host}:{port}`, kick off the combined-document build and serve
    /// until the process exits.
    pub async fn start(self) -> std::io::Result<()> {
        let state = self.build_state()?;
        state.rebuild_combined();

        let addr = format!("{}:{}", self.config.host, self.config.port);
        info!(
            addr = %addr,
            registry = %self.config.services_file.display(),
            probe_enabled = !self.config.probe_allowed_hosts.is_empty(),
            "API gateway starting"
        );
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, router(state)).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// `GET /health`: liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "openapi-gateway" }))
}

/// `GET /services`: current registry.
async fn list_services_handler(
    State(state): State<AppState>,
) -> GatewayResult<Json<Vec<ServiceDescriptor>>> {
    Ok(Json(state.registry.load().await?))
}

/// `POST /update`: replace the registry wholesale.
async fn update_handler(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> GatewayResult<Json<Vec<ServiceDescriptor>>> {
    let document = RegistryDocument::from_value(payload).map_err(GatewayError::InvalidRegistry)?;
    let services = state.registry.replace(document).await?;
    info!(services = services.len(), "registry updated, rebuilding combined document");
    state.rebuild_combined();
    Ok(Json(services))
}

/// `GET /openapi.json`: combined document of every service.
async fn combined_openapi_handler(State(state): State<AppState>) -> GatewayResult<Json<Value>> {
    let document = state.combined.get().await?;
    Ok(Json(document.as_ref().clone()))
}

/// `GET /openapi/{name}`: combined document of one service.
async fn service_openapi_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> GatewayResult<Json<Value>> {
    Ok(Json(state.aggregator.aggregate(&name).await?))
}

#[derive(Debug, Deserialize)]
struct ProbeQuery {
    url: String,
}

/// `GET /check-website?url=`: allow-listed `HEAD` probe.
async fn check_website_handler(
    State(state): State<AppState>,
    Query(query): Query<ProbeQuery>,
) -> GatewayResult<Json<Value>> {
    let url = state.probe_policy.check(&query.url)?;
    let exists = probe(&state.probe_client, url).await;
    Ok(Json(json!({ "exists": exists })))
}

#[derive(Debug, Deserialize)]
struct ProxyTarget {
    service: String,
}

/// Gated proxy: filter pipeline, registry lookup, upstream call.
///
/// Dropping this future on client disconnect also drops the upstream call.
async fn proxy_handler(
    State(state): State<AppState>,
    Path(target): Path<ProxyTarget>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(http_method) = HttpMethod::from_str_ci(method.as_str()) else {
        return GatewayError::InvalidRequest(format!("method '{method}' is not supported"))
            .into_response();
    };

    let request_id = Uuid::new_v4().to_string();
    let mut req = GatewayRequest::new(
        request_id,
        target.service,
        raw_sub_path(uri.path()),
        http_method,
    )
    .with_query(uri.query().unwrap_or_default())
    .with_body(body.to_vec());
    for (name, value) in &headers {
        if let Ok(v) = value.to_str() {
            req = req.with_header(name.as_str(), v);
        }
    }

    let mut ctx = GatewayContext::new(req);
    match dispatch(&state, &mut ctx).await {
        Ok(resp) => build_axum_response(resp),
        Err(err) => {
            state.pipeline.run_error(&ctx, &err).await;
            err.into_response()
        }
    }
}

async fn dispatch(state: &AppState, ctx: &mut GatewayContext) -> GatewayResult<GatewayResponse> {
    if let FilterAction::Reject(err) = state.pipeline.run_request(ctx).await? {
        return Err(err);
    }

    let service = &ctx.request.service;
    let descriptor = state
        .registry
        .find_by_name(service)
        .await?
        .ok_or_else(|| GatewayError::ServiceNotFound(service.clone()))?;

    let mut resp = state.forwarder.forward(&descriptor, &ctx.request).await?;

    if let Err(err) = state.pipeline.run_response(ctx, &mut resp).await {
        warn!(
            request_id = %ctx.request.id,
            error = %err,
            "response filter pipeline error (upstream response still returned)"
        );
    }
    Ok(resp)
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Undecoded path after the leading service segment.
fn raw_sub_path(path: &str) -> &str {
    path.trim_start_matches('/')
        .split_once('/')
        .map(|(_, rest)| rest)
        .unwrap_or_default()
}

fn build_axum_response(resp: GatewayResponse) -> Response {
    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = Response::new(Body::from(resp.body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    for (name, value) in &resp.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
    response
}
