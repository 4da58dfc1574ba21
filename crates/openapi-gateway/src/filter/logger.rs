//! Access log for proxied requests.
//!
//! One line when a request arrives and one [`AccessRecord`] when it
//! completes, whether it completed with an upstream response or with a
//! gateway error such as a key rejection or an unreachable backend.

use super::{AUTH_OUTCOME_ATTR, FilterAction, FilterOrder, GatewayFilter};
use crate::error::{GatewayError, GatewayResult};
use crate::types::{GatewayContext, GatewayResponse};
use async_trait::async_trait;
use tracing::{error, info, warn};

const STARTED_AT_ATTR: &str = "access_log.started_at_ms";

/// Summary of one completed proxied request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRecord {
    pub status: u16,
    /// Error code when the gateway answered instead of the backend.
    pub error_code: Option<&'static str>,
    /// Key-check outcome, absent when the check never ran.
    pub auth: Option<String>,
    pub latency_ms: u64,
}

impl AccessRecord {
    /// Record for a request the backend answered.
    pub fn upstream(ctx: &GatewayContext, resp: &GatewayResponse) -> Self {
        Self::finish(ctx, resp.status, None)
    }

    /// Record for a request that ended in `err`.
    pub fn failed(ctx: &GatewayContext, err: &GatewayError) -> Self {
        Self::finish(ctx, err.status().as_u16(), Some(err.code()))
    }

    fn finish(ctx: &GatewayContext, status: u16, error_code: Option<&'static str>) -> Self {
        let started: u64 = ctx.get_attr(STARTED_AT_ATTR).unwrap_or_else(now_ms);
        Self {
            status,
            error_code,
            auth: ctx.get_attr(AUTH_OUTCOME_ATTR),
            latency_ms: now_ms().saturating_sub(started),
        }
    }

    fn emit(&self, ctx: &GatewayContext) {
        let req = &ctx.request;
        let code = self.error_code.unwrap_or("-");
        let auth = self.auth.as_deref().unwrap_or("-");
        match self.status {
            500..=u16::MAX => error!(
                request_id = %req.id,
                method = req.method.as_str(),
                service = %req.service,
                path = %req.path,
                status = self.status,
                code,
                auth,
                latency_ms = self.latency_ms,
                "request failed"
            ),
            400..=499 => warn!(
                request_id = %req.id,
                method = req.method.as_str(),
                service = %req.service,
                path = %req.path,
                status = self.status,
                code,
                auth,
                latency_ms = self.latency_ms,
                "request refused"
            ),
            _ => info!(
                request_id = %req.id,
                method = req.method.as_str(),
                service = %req.service,
                path = %req.path,
                status = self.status,
                auth,
                latency_ms = self.latency_ms,
                "request completed"
            ),
        }
    }
}

/// Access-log filter. Runs first so every outcome is recorded.
#[derive(Default)]
pub struct LoggingFilter;

impl LoggingFilter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GatewayFilter for LoggingFilter {
    fn name(&self) -> &str {
        "access-log"
    }

    fn order(&self) -> FilterOrder {
        FilterOrder::LOGGING
    }

    async fn on_request(&self, ctx: &mut GatewayContext) -> GatewayResult<FilterAction> {
        info!(
            request_id = %ctx.request.id,
            method = ctx.request.method.as_str(),
            service = %ctx.request.service,
            path = %ctx.request.path,
            "proxy request received"
        );
        ctx.set_attr(STARTED_AT_ATTR, &now_ms());
        Ok(FilterAction::Continue)
    }

    async fn on_response(
        &self,
        ctx: &GatewayContext,
        resp: &mut GatewayResponse,
    ) -> GatewayResult<()> {
        let record = AccessRecord::upstream(ctx, resp);
        record.emit(ctx);
        resp.latency_ms = record.latency_ms;
        Ok(())
    }

    async fn on_error(&self, ctx: &GatewayContext, err: &GatewayError) {
        AccessRecord::failed(ctx, err).emit(ctx);
    }
}

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    u64::try_from(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis(),
    )
    .unwrap_or(u64::MAX)
}
