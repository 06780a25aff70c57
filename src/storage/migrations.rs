//! # Database Migration Management
//!
//! SQL migrations under `migrations/` are embedded into the binary at compile time and
//! applied on startup when `auto_migrate` is enabled, or on demand through `warden-cli`.

use crate::errors::{Error, Result};
use crate::storage::DbPool;
use serde::{Deserialize, Serialize};
use sqlx::migrate::Migrator;
use sqlx::Row;
use tracing::info;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Migration information structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationInfo {
    pub version: i64,
    pub description: String,
    pub installed_on: chrono::DateTime<chrono::Utc>,
    pub success: bool,
}

/// Run all pending database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    info!(embedded = MIGRATOR.iter().count(), "Starting database migration process");

    MIGRATOR.run(pool).await.map_err(|e| {
        Error::internal(format!("Failed to apply database migrations: {}", e))
    })?;

    let version = get_migration_version(pool).await?;
    info!(version = ?version, "Database migrations complete");
    Ok(())
}

/// Latest successfully applied migration version, if any
pub async fn get_migration_version(pool: &DbPool) -> Result<Option<i64>> {
    if !migration_table_exists(pool).await? {
        return Ok(None);
    }

    sqlx::query_scalar::<_, Option<i64>>(
        "SELECT MAX(version) FROM _sqlx_migrations WHERE success = true",
    )
    .fetch_one(pool)
    .await
    .map_err(|e| Error::Database {
        source: e,
        context: "Failed to read migration version".to_string(),
    })
}

/// Every migration recorded in the tracking table
pub async fn list_applied_migrations(pool: &DbPool) -> Result<Vec<MigrationInfo>> {
    if !migration_table_exists(pool).await? {
        return Ok(Vec::new());
    }

    let rows = sqlx::query(
        "SELECT version, description, installed_on, success FROM _sqlx_migrations ORDER BY version",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| Error::Database {
        source: e,
        context: "Failed to list applied migrations".to_string(),
    })?;

    rows.into_iter()
        .map(|row| -> Result<MigrationInfo> {
            Ok(MigrationInfo {
                version: row.try_get("version")?,
                description: row.try_get("description")?,
                installed_on: row.try_get("installed_on")?,
                success: row.try_get("success")?,
            })
        })
        .collect()
}

/// Embedded migrations that have not been applied yet: (version, description)
pub async fn pending_migrations(pool: &DbPool) -> Result<Vec<(i64, String)>> {
    let applied: Vec<i64> =
        list_applied_migrations(pool).await?.into_iter().map(|m| m.version).collect();

    Ok(MIGRATOR
        .iter()
        .filter(|m| !applied.contains(&m.version))
        .map(|m| (m.version, m.description.to_string()))
        .collect())
}

async fn migration_table_exists(pool: &DbPool) -> Result<bool> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = '_sqlx_migrations')",
    )
    .fetch_one(pool)
    .await
    .map_err(|e| Error::Database {
        source: e,
        context: "Failed to check migration table".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_migrations_are_ordered() {
        let versions: Vec<i64> = MIGRATOR.iter().map(|m| m.version).collect();
        assert_eq!(versions.len(), 3);
        let mut sorted = versions.clone();
        sorted.sort();
        assert_eq!(versions, sorted);
    }
}
