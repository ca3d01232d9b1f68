//! Credential guard: the request-facing entry point of the shield core.
//!
//! Extracts a bearer credential (header, then cookie), classifies it before
//! any verification work, dispatches to the matching verifier, and attaches
//! the authenticated identity for downstream handlers.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use crate::models::{
    actions, ActivityEntry, Identity, RequestIdentity, API_TOKEN_MIN_LEN, API_TOKEN_PREFIX,
};
use crate::AppState;

/// Credential kinds, decided by shape alone. Verification failure is never
/// used as a control-flow signal to try the next kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    /// Signed session token (JWT shape).
    Session,
    /// Long-lived API token (`ktv_live_` prefix, minimum length).
    ApiToken,
    Unrecognized,
}

pub fn classify_credential(raw: &str) -> CredentialKind {
    if raw.starts_with(API_TOKEN_PREFIX) {
        if raw.len() >= API_TOKEN_MIN_LEN {
            CredentialKind::ApiToken
        } else {
            CredentialKind::Unrecognized
        }
    } else if raw.split('.').count() == 3 {
        CredentialKind::Session
    } else {
        CredentialKind::Unrecognized
    }
}

/// Marker preventing the usage logger from attaching twice when the guard
/// runs more than once for a request.
#[derive(Clone, Copy)]
struct UsageLogAttached;

pub async fn credential_guard(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string);

    // Cookie fallback for browser sessions.
    let raw = bearer.or_else(|| {
        jar.get(&state.config.session.cookie_name)
            .map(|cookie| cookie.value().to_string())
            .filter(|token| !token.is_empty())
    });

    let raw = match raw {
        Some(raw) => raw,
        None => {
            return Err(AppError::Unauthorized(anyhow::anyhow!(
                "Missing credentials"
            )))
        }
    };

    match classify_credential(&raw) {
        CredentialKind::Session => {
            let identity: Identity = state.sessions.identity(&raw)?;
            req.extensions_mut()
                .insert(RequestIdentity::User(identity.clone()));
            req.extensions_mut().insert(identity);
            Ok(next.run(req).await)
        }
        CredentialKind::ApiToken => {
            let identity = state.api_tokens.authenticate(&raw).await?;
            req.extensions_mut()
                .insert(RequestIdentity::Service(identity.clone()));
            req.extensions_mut().insert(identity.clone());

            let attach_logger = req.extensions().get::<UsageLogAttached>().is_none();
            req.extensions_mut().insert(UsageLogAttached);

            let method = req.method().to_string();
            let endpoint = req.uri().path().to_string();
            let ip_address = client_ip(req.headers());

            let response = next.run(req).await;

            // Post-response usage record. Spawned with its own error
            // boundary; it can neither delay nor alter the response.
            if attach_logger {
                let status = response.status().as_u16();
                let success = response.status().is_success();
                let entry =
                    ActivityEntry::new(identity.org_id, actions::API_TOKEN_USED, "api_token")
                        .with_entity_id(identity.token_id.to_string())
                        .with_ip(ip_address)
                        .with_after(serde_json::json!({
                            "method": method,
                            "endpoint": endpoint,
                            "status_code": status,
                            "success": success,
                        }));

                let activity = state.activity.clone();
                tokio::spawn(async move {
                    if let Err(e) = activity.append(&entry).await {
                        tracing::debug!(error = %e, "Failed to record API token usage");
                    }
                });
            }

            Ok(response)
        }
        CredentialKind::Unrecognized => Err(AppError::Unauthorized(anyhow::anyhow!(
            "Unrecognized credential"
        ))),
    }
}

fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Extractor for handlers that require a human session.
pub struct AuthUser(pub Identity);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = parts
            .extensions
            .get::<Identity>()
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("User session required")))?;

        Ok(AuthUser(identity.clone()))
    }
}

/// Extractor accepting either kind of authenticated caller.
pub struct AnyAuth(pub RequestIdentity);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AnyAuth
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = parts.extensions.get::<RequestIdentity>().ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Authentication required"))
        })?;

        Ok(AnyAuth(identity.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::API_TOKEN_PREFIX;

    #[test]
    fn api_token_shape_classifies_as_api_token() {
        let raw = format!("{}{}", API_TOKEN_PREFIX, "a".repeat(43));
        assert_eq!(classify_credential(&raw), CredentialKind::ApiToken);
    }

    #[test]
    fn short_prefixed_token_is_unrecognized() {
        assert_eq!(
            classify_credential("ktv_live_tooshort"),
            CredentialKind::Unrecognized
        );
    }

    #[test]
    fn jwt_shape_classifies_as_session() {
        assert_eq!(
            classify_credential("eyJhbGciOi.eyJzdWIiOi.c2lnbmF0dXJl"),
            CredentialKind::Session
        );
    }

    #[test]
    fn garbage_is_unrecognized() {
        assert_eq!(classify_credential("not-a-token"), CredentialKind::Unrecognized);
        assert_eq!(classify_credential(""), CredentialKind::Unrecognized);
        assert_eq!(
            classify_credential("too.many.dots.here"),
            CredentialKind::Unrecognized
        );
    }
}
