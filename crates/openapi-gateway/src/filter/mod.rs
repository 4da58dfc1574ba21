//! Gateway filter trait and filter pipeline.
//!
//! A pipeline is an ordered list of [`GatewayFilter`]s applied to every
//! proxied request and response. Filters run in ascending [`FilterOrder`] on
//! the request path and descending order on the response path. A request
//! that ends in a [`GatewayError`] instead of an upstream response goes
//! through the `on_error` hooks, also in descending order.
//!
//! ```text
//! Request  ──► Logging ──► Auth ──► (registry lookup, upstream call)
//! Response ◄── Logging ◄── Auth ◄──
//! Error    ◄── Logging ◄── Auth ◄──
//! ```

mod gateway_key;
mod logger;

pub use gateway_key::{
    AUTH_OUTCOME_ATTR, Authorization, GATEWAY_KEY_PARAM, GatewayKeyFilter, Rejection, authorize,
};
pub use logger::{AccessRecord, LoggingFilter};

use crate::error::{GatewayError, GatewayResult};
use crate::types::{GatewayContext, GatewayResponse};
use async_trait::async_trait;
use std::sync::Arc;

// ─────────────────────────────────────────────────────────────────────────────
// Filter ordering
// ─────────────────────────────────────────────────────────────────────────────

/// Numeric ordering slot for a filter in the chain.
///
/// Filters with equal order values run in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FilterOrder(pub u32);

impl FilterOrder {
    /// Access logging runs first so rejected requests are logged too.
    pub const LOGGING: FilterOrder = FilterOrder(0);
    /// Authentication slot.
    pub const AUTH: FilterOrder = FilterOrder(100);
}

// ─────────────────────────────────────────────────────────────────────────────
// Filter action
// ─────────────────────────────────────────────────────────────────────────────

/// What the pipeline does with the request after a filter runs.
#[derive(Debug)]
pub enum FilterAction {
    /// Pass the request to the next filter or on to the backend.
    Continue,
    /// Short-circuit and answer the caller with this error. No upstream
    /// call is made.
    Reject(GatewayError),
}

// ─────────────────────────────────────────────────────────────────────────────
// GatewayFilter trait
// ─────────────────────────────────────────────────────────────────────────────

/// A single filter in the gateway pipeline.
#[async_trait]
pub trait GatewayFilter: Send + Sync {
    /// Stable identifier used in logs.
    fn name(&self) -> &str;

    /// Position in the chain. Lower values run first on the request path.
    fn order(&self) -> FilterOrder;

    /// Called with the inbound request *before* it is forwarded.
    async fn on_request(&self, ctx: &mut GatewayContext) -> GatewayResult<FilterAction>;

    /// Called with the backend response *before* it is returned.
    async fn on_response(
        &self,
        _ctx: &GatewayContext,
        _resp: &mut GatewayResponse,
    ) -> GatewayResult<()> {
        Ok(())
    }

    /// Called when the request ends in `err`: a rejection, a failed lookup
    /// or a failed upstream call.
    async fn on_error(&self, _ctx: &GatewayContext, _err: &GatewayError) {}
}

// ─────────────────────────────────────────────────────────────────────────────
// FilterPipeline
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered list of filters executed as a pipeline.
pub struct FilterPipeline {
    filters: Vec<Arc<dyn GatewayFilter>>,
}

impl FilterPipeline {
    /// Build a pipeline from a list of filters, sorted by their declared order.
    pub fn new(mut filters: Vec<Arc<dyn GatewayFilter>>) -> Self {
        filters.sort_by_key(|f| f.order());
        Self { filters }
    }

    /// Names of the filters in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Run every `on_request` hook in ascending order, stopping at the first
    /// rejection.
    pub async fn run_request(&self, ctx: &mut GatewayContext) -> GatewayResult<FilterAction> {
        for filter in &self.filters {
            match filter.on_request(ctx).await? {
                FilterAction::Continue => {}
                reject => return Ok(reject),
            }
        }
        Ok(FilterAction::Continue)
    }

    /// Run every `on_response` hook in descending order.
    pub async fn run_response(
        &self,
        ctx: &GatewayContext,
        resp: &mut GatewayResponse,
    ) -> GatewayResult<()> {
        for filter in self.filters.iter().rev() {
            filter.on_response(ctx, resp).await?;
        }
        Ok(())
    }

    /// Run every `on_error` hook in descending order.
    pub async fn run_error(&self, ctx: &GatewayContext, err: &GatewayError) {
        for filter in self.filters.iter().rev() {
            filter.on_error(ctx, err).await;
        }
    }
}
