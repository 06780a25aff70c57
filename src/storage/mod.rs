//! # Storage and Persistence
//!
//! Database connectivity and the persistence collaborators of the auth core: principal,
//! reset-token and audit-log repositories.

pub mod memory;
pub mod migrations;
pub mod pool;
pub mod repositories;

#[cfg(all(test, feature = "postgres_tests"))]
pub(crate) mod test_support;

use std::sync::Arc;

use tracing::Instrument;

pub use crate::config::DatabaseConfig;

pub use migrations::{
    get_migration_version, list_applied_migrations, pending_migrations,
    run_migrations as run_db_migrations, MigrationInfo,
};
pub use pool::{create_pool, get_pool_stats, DbPool, PoolStats};
pub use repositories::{
    AuditEvent, AuditLogRepository, ListParams, PrincipalRepository, ResetToken,
    ResetTokenRepository, SortField, SqlxAuditLogRepository, SqlxPrincipalRepository,
    SqlxResetTokenRepository,
};

use crate::errors::{Error, Result};

/// The repository set shared by services and handlers.
#[derive(Clone)]
pub struct Repositories {
    pub principals: Arc<dyn PrincipalRepository>,
    pub reset_tokens: Arc<dyn ResetTokenRepository>,
    pub audit: Arc<dyn AuditLogRepository>,
}

impl Repositories {
    /// PostgreSQL-backed repositories sharing one pool.
    pub fn postgres(pool: DbPool) -> Self {
        Self {
            principals: Arc::new(SqlxPrincipalRepository::new(pool.clone())),
            reset_tokens: Arc::new(SqlxResetTokenRepository::new(pool.clone())),
            audit: Arc::new(SqlxAuditLogRepository::new(pool)),
        }
    }

    /// Process-local repositories; state is lost on exit.
    pub fn in_memory() -> Self {
        Self {
            principals: Arc::new(memory::InMemoryPrincipalRepository::new()),
            reset_tokens: Arc::new(memory::InMemoryResetTokenRepository::new()),
            audit: Arc::new(memory::InMemoryAuditLogRepository::new()),
        }
    }
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}

/// Run database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    migrations::run_migrations(pool).await
}

/// Check database connectivity
pub async fn check_connection(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .instrument(crate::db_span!("check_connection"))
        .await
        .map_err(|e| Error::Database {
            source: e,
            context: "Database connectivity check failed".to_string(),
        })?;

    Ok(())
}
