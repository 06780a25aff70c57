//! Password-reset token repository
//!
//! Tokens are single use. Consumption is one conditional UPDATE so two concurrent
//! consumers of the same token can never both succeed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::instrument;

use crate::domain::{PrincipalId, ResetTokenId};
use crate::errors::{Error, Result};
use crate::storage::DbPool;

/// Persisted reset token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetToken {
    pub id: ResetTokenId,
    pub principal_id: PrincipalId,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ResetToken {
    /// Unused and not yet expired at `now`.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.used && self.expires_at > now
    }
}

#[derive(Debug, Clone, FromRow)]
struct ResetTokenRow {
    pub id: i64,
    pub principal_id: i64,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<ResetTokenRow> for ResetToken {
    fn from(row: ResetTokenRow) -> Self {
        Self {
            id: ResetTokenId::new(row.id),
            principal_id: PrincipalId::new(row.principal_id),
            token: row.token,
            expires_at: row.expires_at,
            used: row.used,
            used_at: row.used_at,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
pub trait ResetTokenRepository: Send + Sync {
    async fn create(
        &self,
        principal_id: PrincipalId,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<ResetToken>;

    async fn find(&self, token: &str) -> Result<Option<ResetToken>>;

    /// Mark the token used if it is still usable, returning its principal.
    async fn consume(&self, token: &str) -> Result<Option<PrincipalId>>;

    /// Mark every outstanding token of the principal used.
    async fn invalidate_all(&self, principal_id: PrincipalId) -> Result<u64>;

    /// Delete expired tokens and tokens used before `used_before`.
    async fn purge(&self, used_before: DateTime<Utc>) -> Result<u64>;
}

#[derive(Debug, Clone)]
pub struct SqlxResetTokenRepository {
    pool: DbPool,
}

impl SqlxResetTokenRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResetTokenRepository for SqlxResetTokenRepository {
    #[instrument(skip(self, token), fields(principal_id = %principal_id), name = "db_create_reset_token")]
    async fn create(
        &self,
        principal_id: PrincipalId,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<ResetToken> {
        let row = sqlx::query_as::<_, ResetTokenRow>(
            "INSERT INTO password_reset_tokens (principal_id, token, expires_at) VALUES ($1, $2, $3) \
             RETURNING id, principal_id, token, expires_at, used, used_at, created_at",
        )
        .bind(principal_id.get())
        .bind(token)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::Database {
            source: e,
            context: format!("Failed to create reset token for principal {}", principal_id),
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self, token), name = "db_find_reset_token")]
    async fn find(&self, token: &str) -> Result<Option<ResetToken>> {
        let row = sqlx::query_as::<_, ResetTokenRow>(
            "SELECT id, principal_id, token, expires_at, used, used_at, created_at \
             FROM password_reset_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Database {
            source: e,
            context: "Failed to look up reset token".to_string(),
        })?;

        Ok(row.map(ResetToken::from))
    }

    #[instrument(skip(self, token), name = "db_consume_reset_token")]
    async fn consume(&self, token: &str) -> Result<Option<PrincipalId>> {
        let principal_id = sqlx::query_scalar::<_, i64>(
            "UPDATE password_reset_tokens SET used = TRUE, used_at = NOW() \
             WHERE token = $1 AND used = FALSE AND expires_at > NOW() \
             RETURNING principal_id",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Database {
            source: e,
            context: "Failed to consume reset token".to_string(),
        })?;

        Ok(principal_id.map(PrincipalId::new))
    }

    #[instrument(skip(self), fields(principal_id = %principal_id), name = "db_invalidate_reset_tokens")]
    async fn invalidate_all(&self, principal_id: PrincipalId) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE password_reset_tokens SET used = TRUE, used_at = NOW() \
             WHERE principal_id = $1 AND used = FALSE",
        )
        .bind(principal_id.get())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database {
            source: e,
            context: format!("Failed to invalidate reset tokens for principal {}", principal_id),
        })?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self), name = "db_purge_reset_tokens")]
    async fn purge(&self, used_before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM password_reset_tokens \
             WHERE expires_at < NOW() OR (used = TRUE AND used_at < $1)",
        )
        .bind(used_before)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database {
            source: e,
            context: "Failed to purge reset tokens".to_string(),
        })?;

        Ok(result.rows_affected())
    }
}
