//! Operator context extractor.
//!
//! The authentication layer in front of this service resolves the
//! caller's organization, selected location, and identity, and forwards
//! them as headers. Headers are only trusted because that layer runs
//! first; this service never sees unauthenticated traffic directly.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;

/// Operator context extracted from request headers.
#[derive(Debug, Clone)]
pub struct OperatorContext {
    /// Organization that owns the schedules and transactions in scope.
    pub org_id: String,
    /// The operator's currently selected location.
    pub location_id: String,
    /// Who performed the change, recorded in the audit log.
    pub actor: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for OperatorContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let org_id = parts
            .headers
            .get("X-Org-ID")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing X-Org-ID header")))?;

        let location_id = parts
            .headers
            .get("X-Location-ID")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!("Missing X-Location-ID header"))
            })?;

        let actor = parts
            .headers
            .get("X-Actor")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        let span = tracing::Span::current();
        span.record("org_id", org_id);
        span.record("location_id", location_id);

        Ok(OperatorContext {
            org_id: org_id.to_string(),
            location_id: location_id.to_string(),
            actor,
        })
    }
}
