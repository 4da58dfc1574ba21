//! Shared fixtures for the router-level integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use openapi_gateway::backend::{HttpForwarder, UpstreamForwarder};
use openapi_gateway::error::GatewayResult;
use openapi_gateway::openapi::{AggregateOptions, SchemaAggregator};
use openapi_gateway::probe::ProbePolicy;
use openapi_gateway::registry::{InMemoryServiceRegistry, ServiceDescriptor, ServiceRegistry};
use openapi_gateway::retry::RetryConfig;
use openapi_gateway::secret::GatewaySecret;
use openapi_gateway::server::{AppState, router};
use openapi_gateway::types::{GatewayRequest, GatewayResponse};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

pub const KEY: &str = "s3cret";

/// Descriptor for a backend served by a mock server at `base`.
pub fn service(name: &str, base: &str) -> ServiceDescriptor {
    ServiceDescriptor::new(name, base, format!("{base}/openapi.json"))
}

pub fn fast_options() -> AggregateOptions {
    AggregateOptions {
        startup_retry: RetryConfig::exponential(2, 10, 20),
        startup_deadline: Duration::from_secs(5),
        fetch_timeout: Duration::from_secs(2),
        inject_all_services: false,
    }
}

/// State over an in-memory registry and an arbitrary forwarder.
pub fn state_with(
    services: Vec<ServiceDescriptor>,
    forwarder: Arc<dyn UpstreamForwarder>,
    options: AggregateOptions,
) -> AppState {
    let registry: Arc<dyn ServiceRegistry> =
        Arc::new(InMemoryServiceRegistry::with_services(services));
    let secret = GatewaySecret::Static(KEY.to_string());
    let client = reqwest::Client::new();
    let aggregator = Arc::new(SchemaAggregator::new(
        registry.clone(),
        secret.clone(),
        client.clone(),
        options,
    ));
    AppState::new(
        registry,
        secret,
        forwarder,
        aggregator,
        ProbePolicy::default(),
        client,
    )
}

/// State that forwards over real HTTP.
pub fn http_state(services: Vec<ServiceDescriptor>, timeout: Duration) -> AppState {
    let forwarder = Arc::new(HttpForwarder::new(reqwest::Client::new(), timeout));
    state_with(services, forwarder, fast_options())
}

/// Drive one request through the router, returning status and JSON body.
pub async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

pub async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

/// Forwarder that records every call and answers `200 {}`.
#[derive(Default)]
pub struct RecordingForwarder {
    pub calls: Mutex<Vec<GatewayRequest>>,
}

impl RecordingForwarder {
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl UpstreamForwarder for RecordingForwarder {
    async fn forward(
        &self,
        service: &ServiceDescriptor,
        req: &GatewayRequest,
    ) -> GatewayResult<GatewayResponse> {
        self.calls.lock().unwrap().push(req.clone());
        Ok(GatewayResponse::new(200, &service.name).with_body(b"{}".to_vec()))
    }
}
