//! Helpers for PostgreSQL-backed repository tests.

use crate::auth::models::Role;
use crate::auth::principal::NewPrincipal;
use crate::config::DatabaseConfig;
use crate::storage::{create_pool, DbPool};

/// Pool against `DATABASE_URL` with migrations applied.
pub async fn test_pool() -> DbPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres_tests");
    let config = DatabaseConfig { url, auto_migrate: true, ..Default::default() };
    create_pool(&config).await.expect("connect to test database")
}

/// A unique-per-run principal payload.
pub fn new_principal(prefix: &str) -> NewPrincipal {
    NewPrincipal {
        username: format!("{}-{}", prefix, &uuid::Uuid::new_v4().simple().to_string()[..8]),
        full_name: "Test Principal".into(),
        role: Role::Standard,
        password_hash: None,
        require_password_change: false,
        disable_password_change: false,
        show_in_selection: true,
        accessible_users: Vec::new(),
        available_organizations: Vec::new(),
        emails: Vec::new(),
        phones: Vec::new(),
        avatar_url: None,
        position: None,
        department: None,
        comment: None,
        timezone: None,
        created_by: None,
    }
}
