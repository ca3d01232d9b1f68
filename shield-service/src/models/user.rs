//! Read-only directory shapes.
//!
//! The user/org directory is owned by the platform; this core only reads
//! account status, membership, and role through the `Directory` trait and
//! never mutates these records.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// State code an account must carry to authenticate.
pub const USER_STATE_ACTIVE: &str = "active";

/// State code a membership must carry to authenticate against its org.
pub const MEMBERSHIP_STATE_ACTIVE: &str = "ACTIVE";

/// Platform user as seen by the directory.
#[derive(Debug, Clone, FromRow)]
pub struct DirectoryUser {
    pub user_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub password_hash: String,
    pub state_code: String,
    pub created_at: DateTime<Utc>,
}

impl DirectoryUser {
    pub fn is_active(&self) -> bool {
        self.state_code == USER_STATE_ACTIVE
    }
}

/// A user's membership in one org, carrying the role resolved into session
/// tokens.
#[derive(Debug, Clone, FromRow)]
pub struct Membership {
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub state_code: String,
}

impl Membership {
    pub fn is_active(&self) -> bool {
        self.state_code == MEMBERSHIP_STATE_ACTIVE
    }
}
