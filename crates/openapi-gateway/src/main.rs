//! API gateway entry point.
//!
//! Reads configuration from environment variables (see
//! [`openapi_gateway::config`]) and starts the axum-based HTTP gateway.
//! Log verbosity follows `RUST_LOG`.

use openapi_gateway::config::GatewayServerConfig;
use openapi_gateway::server::GatewayServer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialise structured logging.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("openapi_gateway=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = GatewayServerConfig::from_env();

    if config.probe_allowed_hosts.is_empty() {
        info!("GATEWAY_PROBE_ALLOWED_HOSTS is not set, /check-website is disabled");
    }
    if config.insecure_schema_tls {
        warn!("certificate verification is DISABLED for backend document fetches");
    }

    info!(
        host = %config.host,
        port = config.port,
        services_file = %config.services_file.display(),
        upstream_timeout_secs = config.upstream_timeout.as_secs(),
        "API gateway configuration loaded"
    );

    let server = GatewayServer::new(config);
    if let Err(e) = server.start().await {
        eprintln!("Gateway error: {e}");
        std::process::exit(1);
    }
}
