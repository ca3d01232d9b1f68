use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::Identity;
use crate::services::ServiceError;

/// JWT service for access token signing and verification
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expiry_minutes: i64,
}

/// Claims for access tokens (short-lived)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Email
    pub email: String,
    /// Display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Role resolved for the active org
    pub role: String,
    /// Active org claim
    #[serde(rename = "activeOrgId", skip_serializing_if = "Option::is_none")]
    pub active_org_id: Option<String>,
    /// Legacy org claim still present on tokens minted by older issuers
    #[serde(rename = "orgId", skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// JWT ID
    pub jti: String,
}

/// Token response returned to client
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl JwtService {
    /// Create a new JWT service from the configured signing secret.
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        if config.signing_secret.trim().is_empty() {
            anyhow::bail!("JWT signing secret must not be blank");
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.signing_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.signing_secret.as_bytes()),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
        })
    }

    /// Sign a short-lived access token for an authenticated identity.
    pub fn issue_access_token(&self, identity: &Identity) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.access_token_expiry_minutes);

        let claims = AccessTokenClaims {
            sub: identity.user_id.to_string(),
            email: identity.email.clone(),
            name: identity.name.clone(),
            role: identity.role.clone(),
            active_org_id: Some(identity.org_id.to_string()),
            org_id: None,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let header = Header::new(Algorithm::HS256);
        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))
    }

    /// Validate signature and expiry, returning the raw claims.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, anyhow::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let token_data = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| anyhow::anyhow!("Invalid access token: {}", e))?;

        Ok(token_data.claims)
    }

    /// Resolve the identity carried by a session token.
    ///
    /// Accepts either the `activeOrgId` claim or the legacy `orgId` claim,
    /// preferring `activeOrgId` when both are present.
    pub fn identity(&self, token: &str) -> Result<Identity, ServiceError> {
        let claims = self
            .validate_access_token(token)
            .map_err(|_| ServiceError::Unauthorized)?;

        let org_claim = claims
            .active_org_id
            .as_deref()
            .or(claims.org_id.as_deref())
            .ok_or(ServiceError::Unauthorized)?;

        let org_id = Uuid::parse_str(org_claim).map_err(|_| ServiceError::Unauthorized)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| ServiceError::Unauthorized)?;

        Ok(Identity {
            user_id,
            org_id,
            role: claims.role,
            email: claims.email,
            name: claims.name,
        })
    }

    /// Get access token expiry in seconds (for client info)
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> JwtService {
        JwtService::new(&JwtConfig {
            signing_secret: "unit-test-signing-secret".to_string(),
            access_token_expiry_minutes: 15,
        })
        .expect("Failed to create JWT service")
    }

    fn test_identity() -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            role: "admin".to_string(),
            email: "ops@example.com".to_string(),
            name: Some("Ops Admin".to_string()),
        }
    }

    #[test]
    fn blank_secret_is_rejected() {
        let result = JwtService::new(&JwtConfig {
            signing_secret: "   ".to_string(),
            access_token_expiry_minutes: 15,
        });
        assert!(result.is_err());
    }

    #[test]
    fn access_token_round_trip() {
        let service = test_service();
        let identity = test_identity();

        let token = service.issue_access_token(&identity).unwrap();
        let claims = service.validate_access_token(&token).unwrap();

        assert_eq!(claims.sub, identity.user_id.to_string());
        assert_eq!(claims.email, identity.email);
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.active_org_id, Some(identity.org_id.to_string()));
        assert_eq!(claims.org_id, None);
    }

    #[test]
    fn identity_resolves_active_org_claim() {
        let service = test_service();
        let identity = test_identity();

        let token = service.issue_access_token(&identity).unwrap();
        let resolved = service.identity(&token).unwrap();

        assert_eq!(resolved.user_id, identity.user_id);
        assert_eq!(resolved.org_id, identity.org_id);
    }

    #[test]
    fn identity_accepts_legacy_org_claim() {
        let service = test_service();
        let user_id = Uuid::new_v4();
        let legacy_org = Uuid::new_v4();
        let now = Utc::now();

        // Token minted by an older issuer: orgId only, no activeOrgId.
        let claims = AccessTokenClaims {
            sub: user_id.to_string(),
            email: "legacy@example.com".to_string(),
            name: None,
            role: "member".to_string(),
            active_org_id: None,
            org_id: Some(legacy_org.to_string()),
            exp: (now + Duration::minutes(5)).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret("unit-test-signing-secret".as_bytes()),
        )
        .unwrap();

        let resolved = service.identity(&token).unwrap();
        assert_eq!(resolved.org_id, legacy_org);
    }

    #[test]
    fn identity_prefers_active_org_over_legacy() {
        let service = test_service();
        let active_org = Uuid::new_v4();
        let legacy_org = Uuid::new_v4();
        let now = Utc::now();

        let claims = AccessTokenClaims {
            sub: Uuid::new_v4().to_string(),
            email: "both@example.com".to_string(),
            name: None,
            role: "member".to_string(),
            active_org_id: Some(active_org.to_string()),
            org_id: Some(legacy_org.to_string()),
            exp: (now + Duration::minutes(5)).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret("unit-test-signing-secret".as_bytes()),
        )
        .unwrap();

        let resolved = service.identity(&token).unwrap();
        assert_eq!(resolved.org_id, active_org);
    }

    #[test]
    fn tampered_token_is_rejected() {
        let service = test_service();
        let token = service.issue_access_token(&test_identity()).unwrap();

        let other = JwtService::new(&JwtConfig {
            signing_secret: "a-different-secret".to_string(),
            access_token_expiry_minutes: 15,
        })
        .unwrap();

        assert!(other.validate_access_token(&token).is_err());
        assert!(matches!(
            other.identity(&token),
            Err(ServiceError::Unauthorized)
        ));
    }
}
