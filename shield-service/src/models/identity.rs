//! Authenticated identities attached to requests by the credential guard.

use serde::Serialize;
use std::collections::HashMap;
use utoipa::ToSchema;
use uuid::Uuid;

/// A human user authenticated through a session token.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Identity {
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub role: String,
    pub email: String,
    pub name: Option<String>,
}

/// A service account authenticated through an API token.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ServiceIdentity {
    pub token_id: Uuid,
    pub org_id: Uuid,
    pub role: String,
    #[schema(value_type = Object)]
    pub scopes: HashMap<String, bool>,
}

impl ServiceIdentity {
    /// A capability absent from the map is not granted.
    pub fn has_scope(&self, capability: &str) -> bool {
        self.scopes.get(capability).copied().unwrap_or(false)
            || self.scopes.get("*").copied().unwrap_or(false)
    }
}

/// Either kind of caller, as seen by downstream handlers.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestIdentity {
    User(Identity),
    Service(ServiceIdentity),
}

impl RequestIdentity {
    pub fn org_id(&self) -> Uuid {
        match self {
            RequestIdentity::User(identity) => identity.org_id,
            RequestIdentity::Service(identity) => identity.org_id,
        }
    }

    pub fn role(&self) -> &str {
        match self {
            RequestIdentity::User(identity) => &identity.role,
            RequestIdentity::Service(identity) => &identity.role,
        }
    }
}
