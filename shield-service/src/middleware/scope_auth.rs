//! Capability enforcement for service-account callers.
//!
//! A service identity missing a required capability is a 403 from this
//! layer, never a rate-limit failure. Human sessions pass through; their
//! role checks belong to the domain authorization built on top of this core.

use axum::{extract::Request, middleware::Next, response::Response};
use service_core::error::AppError;

use crate::models::RequestIdentity;

pub async fn require_scope(
    capability: &'static str,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(RequestIdentity::Service(service)) = req.extensions().get::<RequestIdentity>() {
        if !service.has_scope(capability) {
            tracing::warn!(
                token_id = %service.token_id,
                required_scope = %capability,
                "Insufficient scopes"
            );
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "Insufficient scopes. Required: {}",
                capability
            )));
        }
    }

    Ok(next.run(req).await)
}
