//! Backend module: forwarding proxied requests to registered services.

mod http;

pub use http::{HttpForwarder, NON_JSON_ERROR, relay_body, target_url};

use crate::error::GatewayResult;
use crate::registry::ServiceDescriptor;
use crate::types::{GatewayRequest, GatewayResponse};
use async_trait::async_trait;

/// Sends one gateway request to one backend and returns its response.
///
/// The server only holds this trait, so tests can substitute a recording
/// stub for the network.
#[async_trait]
pub trait UpstreamForwarder: Send + Sync {
    async fn forward(
        &self,
        service: &ServiceDescriptor,
        req: &GatewayRequest,
    ) -> GatewayResult<GatewayResponse>;
}
