//! Session lifecycle: login, refresh rotation, logout.

use std::sync::Arc;
use uuid::Uuid;

use crate::models::{actions, ActivityEntry, Identity, RefreshToken};
use crate::services::token_crypto::{generate_refresh_token, sha256_hex};
use crate::services::{Clock, JwtService, ServiceError, Shield, TokenResponse};
use crate::stores::{ActivityLog, Directory, RefreshTokenStore};
use crate::utils::{verify_password, Password, PasswordHashString};

#[derive(Clone)]
pub struct SessionService {
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    directory: Arc<dyn Directory>,
    activity: Arc<dyn ActivityLog>,
    jwt: JwtService,
    shield: Shield,
    clock: Arc<dyn Clock>,
    refresh_token_expiry_days: i64,
}

impl SessionService {
    pub fn new(
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        directory: Arc<dyn Directory>,
        activity: Arc<dyn ActivityLog>,
        jwt: JwtService,
        shield: Shield,
        clock: Arc<dyn Clock>,
        refresh_token_expiry_days: i64,
    ) -> Self {
        Self {
            refresh_tokens,
            directory,
            activity,
            jwt,
            shield,
            clock,
            refresh_token_expiry_days,
        }
    }

    /// Verify credentials and issue a fresh token pair.
    pub async fn login(
        &self,
        org_id: Uuid,
        email: &str,
        password: &str,
        ip_address: Option<String>,
    ) -> Result<TokenResponse, ServiceError> {
        let now = self.clock.now();

        let user = self
            .directory
            .find_user_by_email(org_id, email)
            .await
            .map_err(ServiceError::Database)?;

        let user = match user {
            Some(user) => user,
            None => {
                self.shield.register_failed_attempt(org_id, None, email).await;
                return Err(ServiceError::InvalidCredentials);
            }
        };

        if !user.is_active() {
            return Err(ServiceError::AccountDisabled);
        }

        let membership = self
            .directory
            .find_membership(org_id, user.user_id)
            .await
            .map_err(ServiceError::Database)?
            .filter(|m| m.is_active())
            .ok_or(ServiceError::MembershipInactive)?;

        // Slow hash comparison; failures feed the spike detector.
        if verify_password(
            &Password::new(password.to_string()),
            &PasswordHashString::new(user.password_hash.clone()),
        )
        .is_err()
        {
            self.shield
                .register_failed_attempt(org_id, Some(user.user_id), email)
                .await;
            return Err(ServiceError::InvalidCredentials);
        }

        self.shield.clear_failed_attempts(org_id, email);

        let identity = Identity {
            user_id: user.user_id,
            org_id,
            role: membership.role,
            email: user.email.clone(),
            name: user.name.clone(),
        };

        let access_token = self
            .jwt
            .issue_access_token(&identity)
            .map_err(ServiceError::Internal)?;

        let raw_refresh_token = generate_refresh_token();
        let refresh_token = RefreshToken::new(
            org_id,
            user.user_id,
            sha256_hex(&raw_refresh_token),
            self.refresh_token_expiry_days,
            now,
        );
        self.refresh_tokens
            .insert(&refresh_token)
            .await
            .map_err(ServiceError::Database)?;

        tracing::info!(user_id = %user.user_id, org_id = %org_id, "User logged in");

        self.log_activity(
            ActivityEntry::new(org_id, actions::LOGIN_SUCCESS, "session")
                .with_actor(user.user_id)
                .with_entity_id(refresh_token.token_id.to_string()),
            ip_address,
        );

        Ok(TokenResponse {
            access_token,
            refresh_token: raw_refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt.access_token_expiry_seconds(),
        })
    }

    /// Rotate a refresh token: revoke the presented row and mint a new pair.
    ///
    /// Rotation is atomic in the store; a token that lost a concurrent
    /// rotation race is treated the same as a revoked one.
    pub async fn refresh(&self, raw_refresh_token: &str) -> Result<TokenResponse, ServiceError> {
        let now = self.clock.now();
        let presented_hash = sha256_hex(raw_refresh_token);

        let stored = self
            .refresh_tokens
            .find_by_hash(&presented_hash)
            .await
            .map_err(ServiceError::Database)?
            .ok_or(ServiceError::InvalidRefreshToken)?;

        if !stored.is_active(now) {
            tracing::warn!(
                token_id = %stored.token_id,
                user_id = %stored.user_id,
                "Revoked or expired refresh token presented"
            );
            return Err(ServiceError::InvalidRefreshToken);
        }

        let user = self
            .directory
            .find_user_by_id(stored.user_id)
            .await
            .map_err(ServiceError::Database)?
            .filter(|u| u.is_active())
            .ok_or(ServiceError::InvalidRefreshToken)?;

        // Org mismatch or retired membership invalidates the lineage.
        let membership = self
            .directory
            .find_membership(stored.org_id, user.user_id)
            .await
            .map_err(ServiceError::Database)?
            .filter(|m| m.is_active())
            .ok_or(ServiceError::InvalidRefreshToken)?;

        let raw_replacement = generate_refresh_token();
        let replacement = RefreshToken::new(
            stored.org_id,
            user.user_id,
            sha256_hex(&raw_replacement),
            self.refresh_token_expiry_days,
            now,
        );

        let rotated = self
            .refresh_tokens
            .rotate(stored.token_id, &replacement, now)
            .await
            .map_err(ServiceError::Database)?;
        if !rotated {
            return Err(ServiceError::InvalidRefreshToken);
        }

        let identity = Identity {
            user_id: user.user_id,
            org_id: stored.org_id,
            role: membership.role,
            email: user.email.clone(),
            name: user.name.clone(),
        };
        let access_token = self
            .jwt
            .issue_access_token(&identity)
            .map_err(ServiceError::Internal)?;

        tracing::info!(user_id = %user.user_id, org_id = %stored.org_id, "Token refreshed");

        self.log_activity(
            ActivityEntry::new(stored.org_id, actions::TOKEN_REFRESH, "session")
                .with_actor(user.user_id)
                .with_entity_id(replacement.token_id.to_string()),
            None,
        );

        Ok(TokenResponse {
            access_token,
            refresh_token: raw_replacement,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt.access_token_expiry_seconds(),
        })
    }

    /// Revoke a refresh token. Absent, unknown, or already-revoked tokens
    /// are treated as success; logout never surfaces an error to the caller.
    pub async fn logout(&self, raw_refresh_token: Option<&str>) {
        let raw = match raw_refresh_token {
            Some(raw) if !raw.is_empty() => raw,
            _ => return,
        };

        let now = self.clock.now();
        let presented_hash = sha256_hex(raw);

        match self.refresh_tokens.find_by_hash(&presented_hash).await {
            Ok(Some(stored)) if stored.revoked_at.is_none() => {
                if let Err(e) = self.refresh_tokens.revoke(stored.token_id, now).await {
                    tracing::warn!(error = %e, token_id = %stored.token_id, "Logout revocation failed");
                    return;
                }

                tracing::info!(user_id = %stored.user_id, "User logged out");

                self.log_activity(
                    ActivityEntry::new(stored.org_id, actions::LOGOUT, "session")
                        .with_actor(stored.user_id)
                        .with_entity_id(stored.token_id.to_string()),
                    None,
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Logout lookup failed");
            }
        }
    }

    /// Resolve the identity carried by a session token.
    pub fn identity(&self, raw_access_token: &str) -> Result<Identity, ServiceError> {
        self.jwt.identity(raw_access_token)
    }

    // Audit writes are diagnostic, never authoritative: spawned off the
    // request path with their own error boundary.
    fn log_activity(&self, entry: ActivityEntry, ip_address: Option<String>) {
        let entry = match ip_address {
            Some(ip) => entry.with_ip(ip),
            None => entry,
        };
        let activity = self.activity.clone();
        tokio::spawn(async move {
            if let Err(e) = activity.append(&entry).await {
                tracing::debug!(error = %e, action = %entry.action, "Failed to write activity entry");
            }
        });
    }
}
