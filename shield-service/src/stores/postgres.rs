//! PostgreSQL-backed stores.
//!
//! Uses sqlx with runtime-checked queries. The refresh-token rotation is the
//! one multi-row write in this core and runs inside a single transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use uuid::Uuid;

use super::{
    ActivityLog, ApiTokenStore, Directory, RefreshTokenStore, SecurityEventFilter,
    SecurityEventStore, StoreHealth,
};
use crate::config::DatabaseConfig;
use crate::models::{
    ActivityEntry, ApiToken, DirectoryUser, Membership, RefreshToken, SecurityEvent,
};

/// Create a PostgreSQL connection pool.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    tracing::info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.url)
        .await?;

    tracing::info!("Successfully connected to PostgreSQL");

    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations completed");
    Ok(())
}

/// PostgreSQL store wrapper.
#[derive(Clone)]
pub struct PostgresStores {
    pool: PgPool,
}

impl PostgresStores {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StoreHealth for PostgresStores {
    async fn ping(&self) -> Result<(), anyhow::Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!("Database health check failed: {}", e))?;
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenStore for PostgresStores {
    async fn insert(&self, token: &RefreshToken) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens
                (token_id, org_id, user_id, token_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(token.token_id)
        .bind(token.org_id)
        .bind(token.user_id)
        .bind(&token.token_hash)
        .bind(token.expires_at)
        .bind(token.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    async fn find_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshToken>, anyhow::Error> {
        sqlx::query_as::<_, RefreshToken>(
            "SELECT * FROM refresh_tokens WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))
    }

    async fn find_by_id(&self, token_id: Uuid) -> Result<Option<RefreshToken>, anyhow::Error> {
        sqlx::query_as::<_, RefreshToken>("SELECT * FROM refresh_tokens WHERE token_id = $1")
            .bind(token_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }

    async fn revoke(&self, token_id: Uuid, now: DateTime<Utc>) -> Result<(), anyhow::Error> {
        sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2 WHERE token_id = $1 AND revoked_at IS NULL",
        )
        .bind(token_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    async fn rotate(
        &self,
        old_id: Uuid,
        replacement: &RefreshToken,
        now: DateTime<Utc>,
    ) -> Result<bool, anyhow::Error> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow::anyhow!(e))?;

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens
                (token_id, org_id, user_id, token_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(replacement.token_id)
        .bind(replacement.org_id)
        .bind(replacement.user_id)
        .bind(&replacement.token_hash)
        .bind(replacement.expires_at)
        .bind(replacement.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

        // Guard on revoked_at so a concurrent rotation of the same row loses.
        let updated = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $2, replaced_by_token_id = $3
            WHERE token_id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(old_id)
        .bind(now)
        .bind(replacement.token_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

        if updated.rows_affected() == 0 {
            tx.rollback().await.map_err(|e| anyhow::anyhow!(e))?;
            return Ok(false);
        }

        tx.commit().await.map_err(|e| anyhow::anyhow!(e))?;
        Ok(true)
    }
}

#[async_trait]
impl ApiTokenStore for PostgresStores {
    async fn insert(&self, token: &ApiToken) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            INSERT INTO api_tokens
                (token_id, org_id, name, role, token_hash, scopes,
                 rate_limit_per_hour, requests_this_hour, hour_window_start, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(token.token_id)
        .bind(token.org_id)
        .bind(&token.name)
        .bind(&token.role)
        .bind(&token.token_hash)
        .bind(&token.scopes)
        .bind(token.rate_limit_per_hour)
        .bind(token.requests_this_hour)
        .bind(token.hour_window_start)
        .bind(token.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<ApiToken>, anyhow::Error> {
        sqlx::query_as::<_, ApiToken>("SELECT * FROM api_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }

    async fn find_active_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<ApiToken>, anyhow::Error> {
        sqlx::query_as::<_, ApiToken>(
            "SELECT * FROM api_tokens WHERE token_hash = $1 AND revoked_at IS NULL",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))
    }

    async fn find_by_id(&self, token_id: Uuid) -> Result<Option<ApiToken>, anyhow::Error> {
        sqlx::query_as::<_, ApiToken>("SELECT * FROM api_tokens WHERE token_id = $1")
            .bind(token_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }

    async fn record_usage(
        &self,
        token_id: Uuid,
        requests_this_hour: i64,
        hour_window_start: DateTime<Utc>,
        last_used_at: Option<DateTime<Utc>>,
    ) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            UPDATE api_tokens
            SET requests_this_hour = $2,
                hour_window_start = $3,
                last_used_at = COALESCE($4, last_used_at)
            WHERE token_id = $1
            "#,
        )
        .bind(token_id)
        .bind(requests_this_hour)
        .bind(hour_window_start)
        .bind(last_used_at)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }
}

#[async_trait]
impl SecurityEventStore for PostgresStores {
    async fn insert(&self, event: &SecurityEvent) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            INSERT INTO security_events
                (event_id, org_id, event_type, severity, description,
                 entity_type, entity_id, user_id, meta, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(event.event_id)
        .bind(event.org_id)
        .bind(&event.event_type)
        .bind(&event.severity)
        .bind(&event.description)
        .bind(&event.entity_type)
        .bind(&event.entity_id)
        .bind(event.user_id)
        .bind(&event.meta)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    async fn list(
        &self,
        filter: &SecurityEventFilter,
    ) -> Result<Vec<SecurityEvent>, anyhow::Error> {
        sqlx::query_as::<_, SecurityEvent>(
            r#"
            SELECT * FROM security_events
            WHERE ($1::uuid IS NULL OR org_id = $1)
              AND ($2::text IS NULL OR severity = $2)
              AND ($3::bool IS NULL OR (resolved_at IS NOT NULL) = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.org_id)
        .bind(&filter.severity)
        .bind(filter.resolved)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))
    }

    async fn find_by_id(&self, event_id: Uuid) -> Result<Option<SecurityEvent>, anyhow::Error> {
        sqlx::query_as::<_, SecurityEvent>("SELECT * FROM security_events WHERE event_id = $1")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }

    async fn find_recent(
        &self,
        org_id: Uuid,
        event_type: &str,
        user_id: Option<Uuid>,
        since: DateTime<Utc>,
    ) -> Result<Option<SecurityEvent>, anyhow::Error> {
        sqlx::query_as::<_, SecurityEvent>(
            r#"
            SELECT * FROM security_events
            WHERE org_id = $1
              AND event_type = $2
              AND ($3::uuid IS NULL OR user_id = $3)
              AND created_at >= $4
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(org_id)
        .bind(event_type)
        .bind(user_id)
        .bind(since)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))
    }

    async fn resolve(
        &self,
        event_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<SecurityEvent>, anyhow::Error> {
        sqlx::query_as::<_, SecurityEvent>(
            r#"
            UPDATE security_events
            SET resolved_at = COALESCE(resolved_at, $2)
            WHERE event_id = $1
            RETURNING *
            "#,
        )
        .bind(event_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))
    }
}

#[async_trait]
impl ActivityLog for PostgresStores {
    async fn append(&self, entry: &ActivityEntry) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            INSERT INTO activity_log
                (entry_id, org_id, actor_user_id, entity_type, entity_id,
                 action, before, after, ip_address, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.entry_id)
        .bind(entry.org_id)
        .bind(entry.actor_user_id)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.action)
        .bind(&entry.before)
        .bind(&entry.after)
        .bind(&entry.ip_address)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    async fn count_actions_since(
        &self,
        org_id: Uuid,
        actor_user_id: Uuid,
        action: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, anyhow::Error> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM activity_log
            WHERE org_id = $1 AND actor_user_id = $2 AND action = $3 AND created_at >= $4
            "#,
        )
        .bind(org_id)
        .bind(actor_user_id)
        .bind(action)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(count.0)
    }
}

#[async_trait]
impl Directory for PostgresStores {
    async fn find_user_by_email(
        &self,
        org_id: Uuid,
        email: &str,
    ) -> Result<Option<DirectoryUser>, anyhow::Error> {
        sqlx::query_as::<_, DirectoryUser>(
            r#"
            SELECT u.user_id, u.email, u.name, u.password_hash, u.state_code, u.created_at
            FROM users u
            JOIN memberships m ON m.user_id = u.user_id
            WHERE m.org_id = $1 AND LOWER(u.email) = LOWER($2)
            "#,
        )
        .bind(org_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))
    }

    async fn find_user_by_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<DirectoryUser>, anyhow::Error> {
        sqlx::query_as::<_, DirectoryUser>(
            r#"
            SELECT user_id, email, name, password_hash, state_code, created_at
            FROM users WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))
    }

    async fn find_membership(
        &self,
        org_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, anyhow::Error> {
        sqlx::query_as::<_, Membership>(
            "SELECT org_id, user_id, role, state_code FROM memberships WHERE org_id = $1 AND user_id = $2",
        )
        .bind(org_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!(e))
    }
}
