//! `openapi-gateway`: API gateway for registered backend services.
//!
//! Requests to `/{service}/{*path}` pass a shared-secret check and are relayed
//! to the backend registered under `service`. Each backend's OpenAPI document
//! is fetched, re-rooted under `/{service}` and merged into one combined
//! document.
//!
//! | Concern | Implementation |
//! |---------|----------------|
//! | [`ServiceRegistry`](registry::ServiceRegistry) | [`registry::FileServiceRegistry`], [`registry::InMemoryServiceRegistry`] |
//! | [`GatewayFilter`](filter::GatewayFilter) | [`filter::GatewayKeyFilter`], [`filter::LoggingFilter`] |
//! | [`UpstreamForwarder`](backend::UpstreamForwarder) | [`backend::HttpForwarder`] |
//! | OpenAPI aggregation | [`openapi::SchemaAggregator`], [`openapi::CombinedDocument`] |
//!
//! The [`server::GatewayServer`] wires everything together into an axum HTTP
//! service.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use openapi_gateway::config::GatewayServerConfig;
//! use openapi_gateway::server::GatewayServer;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let server = GatewayServer::new(GatewayServerConfig {
//!         port: 8005,
//!         services_file: "services.json".into(),
//!         ..Default::default()
//!     });
//!     server.start().await
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod filter;
pub mod openapi;
pub mod probe;
pub mod registry;
pub mod retry;
pub mod secret;
pub mod server;
pub mod types;

pub use error::{GatewayError, GatewayResult};
