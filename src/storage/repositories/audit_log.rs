//! Audit log repository
//!
//! Append-only record of mutating operations. The core writes to it and never reads
//! it back.

use async_trait::async_trait;
use serde_json::Value;
use tracing::instrument;

use crate::domain::PrincipalId;
use crate::errors::{Error, Result};
use crate::storage::DbPool;

pub mod actions {
    pub const LOGIN: &str = "login";
    pub const LOGIN_FAILED: &str = "login_failed";
    pub const LOGOUT: &str = "logout";
    pub const CREATE_USER: &str = "create_user";
    pub const UPDATE_USER: &str = "update_user";
    pub const DELETE_USER: &str = "delete_user";
    pub const CHANGE_PASSWORD: &str = "change_password";
    pub const BLOCK_USER: &str = "block_user";
    pub const UNBLOCK_USER: &str = "unblock_user";
    pub const PASSWORD_RESET_REQUESTED: &str = "password_reset_requested";
    pub const PASSWORD_RESET: &str = "password_reset";
}

/// Audit event descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub actor_id: Option<PrincipalId>,
    pub action: String,
    pub target_id: Option<PrincipalId>,
    pub details: Value,
}

impl AuditEvent {
    pub fn new(
        actor_id: Option<PrincipalId>,
        action: &str,
        target_id: Option<PrincipalId>,
        details: Value,
    ) -> Self {
        Self { actor_id, action: action.to_string(), target_id, details }
    }

    /// An action a principal performed on their own account.
    pub fn on_self(principal_id: PrincipalId, action: &str, details: Value) -> Self {
        Self::new(Some(principal_id), action, Some(principal_id), details)
    }
}

#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct SqlxAuditLogRepository {
    pool: DbPool,
}

impl SqlxAuditLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogRepository for SqlxAuditLogRepository {
    #[instrument(skip(self, event), fields(action = %event.action), name = "db_record_audit_event")]
    async fn record(&self, event: AuditEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_log (actor_id, action, target_id, details) VALUES ($1, $2, $3, $4)",
        )
        .bind(event.actor_id.map(PrincipalId::get))
        .bind(&event.action)
        .bind(event.target_id.map(PrincipalId::get))
        .bind(&event.details)
        .execute(&self.pool)
        .await
        .map_err(|err| Error::Database {
            source: err,
            context: format!("Failed to write audit event '{}'", event.action),
        })?;

        Ok(())
    }
}

/// Record an event, logging instead of propagating a storage failure.
pub async fn record_or_warn(repo: &dyn AuditLogRepository, event: AuditEvent) {
    let action = event.action.clone();
    if let Err(err) = repo.record(event).await {
        tracing::warn!(error = %err, action = %action, "Failed to write audit event");
    }
}
