//! Shared-secret check on the `gateway_key` query parameter.
//!
//! Every proxied request must carry `?gateway_key=<secret>`. The check runs in
//! the auth slot of the pipeline, so a rejected request never reaches the
//! registry lookup or the upstream.

use super::{FilterAction, FilterOrder, GatewayFilter};
use crate::error::{GatewayError, GatewayResult};
use crate::secret::GatewaySecret;
use crate::types::GatewayContext;
use async_trait::async_trait;
use tracing::warn;

/// Query parameter carrying the shared secret.
pub const GATEWAY_KEY_PARAM: &str = "gateway_key";

/// Context attribute holding the outcome label of the key check.
pub const AUTH_OUTCOME_ATTR: &str = "gateway_key.outcome";

/// Outcome of [`authorize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Authorized,
    Rejected(Rejection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No non-empty `gateway_key` parameter.
    MissingKey,
    /// `gateway_key` present but not byte-equal to the secret.
    InvalidKey,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::MissingKey => "missing_key",
            Rejection::InvalidKey => "invalid_key",
        }
    }
}

impl From<Rejection> for GatewayError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::MissingKey => GatewayError::MissingKey,
            Rejection::InvalidKey => GatewayError::InvalidKey,
        }
    }
}

/// Check decoded query parameters against the expected secret.
///
/// The first `gateway_key` occurrence wins. An empty expected key matches
/// nothing.
pub fn authorize(query_params: &[(String, String)], expected_key: &str) -> Authorization {
    let supplied = query_params
        .iter()
        .find(|(k, _)| k == GATEWAY_KEY_PARAM)
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.is_empty());

    match supplied {
        None => Authorization::Rejected(Rejection::MissingKey),
        Some(key) if !expected_key.is_empty() && key == expected_key => Authorization::Authorized,
        Some(_) => Authorization::Rejected(Rejection::InvalidKey),
    }
}

/// Pipeline filter enforcing [`authorize`] against a [`GatewaySecret`].
pub struct GatewayKeyFilter {
    secret: GatewaySecret,
}

impl GatewayKeyFilter {
    pub fn new(secret: GatewaySecret) -> Self {
        Self { secret }
    }
}

#[async_trait]
impl GatewayFilter for GatewayKeyFilter {
    fn name(&self) -> &str {
        "gateway-key"
    }

    fn order(&self) -> FilterOrder {
        FilterOrder::AUTH
    }

    async fn on_request(&self, ctx: &mut GatewayContext) -> GatewayResult<FilterAction> {
        let expected = self.secret.current().await?;
        match authorize(&ctx.request.query_params(), &expected) {
            Authorization::Authorized => {
                ctx.set_attr(AUTH_OUTCOME_ATTR, &"authorized");
                Ok(FilterAction::Continue)
            }
            Authorization::Rejected(rejection) => {
                ctx.set_attr(AUTH_OUTCOME_ATTR, &rejection.as_str());
                warn!(
                    request_id = %ctx.request.id,
                    service = %ctx.request.service,
                    reason = ?rejection,
                    "rejected request"
                );
                Ok(FilterAction::Reject(rejection.into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GatewayRequest, HttpMethod};

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn missing_key_is_rejected() {
        assert_eq!(
            authorize(&params(&[("page", "1")]), "s3cret"),
            Authorization::Rejected(Rejection::MissingKey)
        );
        assert_eq!(
            authorize(&params(&[("gateway_key", "")]), "s3cret"),
            Authorization::Rejected(Rejection::MissingKey)
        );
    }

    #[test]
    fn comparison_is_case_sensitive() {
        assert_eq!(
            authorize(&params(&[("gateway_key", "S3CRET")]), "s3cret"),
            Authorization::Rejected(Rejection::InvalidKey)
        );
        assert_eq!(
            authorize(&params(&[("gateway_key", "s3cret ")]), "s3cret"),
            Authorization::Rejected(Rejection::InvalidKey)
        );
    }

    #[test]
    fn exact_match_is_authorized() {
        assert_eq!(
            authorize(&params(&[("a", "b"), ("gateway_key", "s3cret")]), "s3cret"),
            Authorization::Authorized
        );
    }

    #[test]
    fn empty_secret_authorizes_nobody() {
        assert_eq!(
            authorize(&params(&[("gateway_key", "anything")]), ""),
            Authorization::Rejected(Rejection::InvalidKey)
        );
    }

    #[tokio::test]
    async fn filter_records_authorized_outcome() {
        let filter = GatewayKeyFilter::new(GatewaySecret::Static("s3cret".into()));
        let mut ctx = GatewayContext::new(
            GatewayRequest::new("r1", "billing", "invoices", HttpMethod::Get)
                .with_query("gateway_key=s3cret"),
        );
        assert!(matches!(
            filter.on_request(&mut ctx).await.unwrap(),
            FilterAction::Continue
        ));
        assert_eq!(
            ctx.get_attr::<String>(AUTH_OUTCOME_ATTR).as_deref(),
            Some("authorized")
        );
    }

    #[tokio::test]
    async fn filter_rejects_with_invalid_key() {
        let filter = GatewayKeyFilter::new(GatewaySecret::Static("s3cret".into()));
        let mut ctx = GatewayContext::new(
            GatewayRequest::new("r1", "billing", "invoices", HttpMethod::Get)
                .with_query("gateway_key=wrong"),
        );
        assert!(matches!(
            filter.on_request(&mut ctx).await.unwrap(),
            FilterAction::Reject(GatewayError::InvalidKey)
        ));
        assert_eq!(
            ctx.get_attr::<String>(AUTH_OUTCOME_ATTR).as_deref(),
            Some("invalid_key")
        );
    }
}
