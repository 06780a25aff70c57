//! Principal repository
//!
//! CRUD, presence and credential operations over the `principals` table. Every epoch
//! change happens inside the same UPDATE statement as the field change that caused it
//! (`token_version = token_version + 1`), never as a read-modify-write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, QueryBuilder};
use std::str::FromStr;
use tracing::instrument;

use crate::auth::models::Role;
use crate::auth::principal::{ListPrincipalsQuery, NewPrincipal, Principal, PrincipalChanges};
use crate::domain::{OrganizationId, PrincipalId};
use crate::errors::{Error, Result};
use crate::storage::DbPool;

const PRINCIPAL_COLUMNS: &str = "id, username, full_name, role, password_hash, is_first_login, \
    require_password_change, disable_password_change, show_in_selection, accessible_users, \
    available_organizations, emails, phones, avatar_url, position, department, comment, timezone, \
    is_active, token_version, blocked_reason, blocked_at, blocked_by, is_online, last_seen, \
    created_by, updated_by, created_at, updated_at";

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, FromRow)]
struct PrincipalRow {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub role: String,
    pub password_hash: Option<String>,
    pub is_first_login: bool,
    pub require_password_change: bool,
    pub disable_password_change: bool,
    pub show_in_selection: bool,
    pub accessible_users: Vec<i64>,
    pub available_organizations: Vec<i64>,
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub avatar_url: Option<String>,
    pub position: Option<String>,
    pub department: Option<String>,
    pub comment: Option<String>,
    pub timezone: Option<String>,
    pub is_active: bool,
    pub token_version: i32,
    pub blocked_reason: Option<String>,
    pub blocked_at: Option<DateTime<Utc>>,
    pub blocked_by: Option<i64>,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_by: Option<i64>,
    pub updated_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sortable columns. Free-text sort input is mapped onto this allow-list and never
/// reaches the query as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    Id,
    Username,
    FullName,
    Role,
    #[default]
    CreatedAt,
    LastSeen,
    IsOnline,
}

impl SortField {
    /// Unknown or missing values fall back to `created_at`.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("id") => SortField::Id,
            Some("username") => SortField::Username,
            Some("full_name") => SortField::FullName,
            Some("role") => SortField::Role,
            Some("last_seen") => SortField::LastSeen,
            Some("is_online") => SortField::IsOnline,
            _ => SortField::CreatedAt,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            SortField::Id => "id",
            SortField::Username => "username",
            SortField::FullName => "full_name",
            SortField::Role => "role",
            SortField::CreatedAt => "created_at",
            SortField::LastSeen => "last_seen",
            SortField::IsOnline => "is_online",
        }
    }
}

/// Normalized listing parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    pub page: i64,
    pub page_size: i64,
    pub sort: SortField,
    pub descending: bool,
    /// Restrict the listing to these principals.
    pub only: Option<Vec<PrincipalId>>,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort: SortField::default(),
            descending: false,
            only: None,
        }
    }
}

impl ListParams {
    pub fn from_query(query: &ListPrincipalsQuery) -> Self {
        Self {
            page: query.page.filter(|p| *p >= 1).unwrap_or(1),
            page_size: query
                .page_size
                .filter(|s| *s >= 1)
                .map(|s| s.min(MAX_PAGE_SIZE))
                .unwrap_or(DEFAULT_PAGE_SIZE),
            sort: SortField::parse(query.sort_by.as_deref()),
            descending: query.sort_desc.unwrap_or(false),
            only: None,
        }
    }

    pub fn restricted_to(mut self, ids: Vec<PrincipalId>) -> Self {
        self.only = Some(ids);
        self
    }

    /// Rows to skip. Saturates for absurd page numbers, which then read as an empty page.
    pub fn offset(&self) -> i64 {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }
}

#[async_trait]
pub trait PrincipalRepository: Send + Sync {
    /// Insert a new principal. A taken username yields a conflict.
    async fn create(&self, principal: NewPrincipal) -> Result<Principal>;

    async fn get(&self, id: PrincipalId) -> Result<Option<Principal>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<Principal>>;

    /// Case-insensitive match against any configured contact address.
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>>;

    /// Apply a change set atomically, returning the updated principal or `None` if it
    /// does not exist.
    async fn update(
        &self,
        id: PrincipalId,
        changes: PrincipalChanges,
        actor: Option<PrincipalId>,
    ) -> Result<Option<Principal>>;

    /// Store a new credential hash, clear the first-login and require-change flags and
    /// increment the epoch in one statement.
    async fn set_password(&self, id: PrincipalId, password_hash: String)
        -> Result<Option<Principal>>;

    /// Mark present with a refreshed last-seen timestamp.
    async fn mark_active(&self, id: PrincipalId) -> Result<()>;

    async fn mark_offline(&self, id: PrincipalId) -> Result<()>;

    /// Mark every present principal last seen before `cutoff` as not present.
    async fn mark_idle_offline(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// One page of principals plus the total matching count.
    async fn list(&self, params: &ListParams) -> Result<(Vec<Principal>, i64)>;

    /// Physically delete; returns whether a row was removed.
    async fn delete(&self, id: PrincipalId) -> Result<bool>;

    async fn count(&self) -> Result<i64>;
}

#[derive(Debug, Clone)]
pub struct SqlxPrincipalRepository {
    pool: DbPool,
}

impl SqlxPrincipalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn row_to_principal(&self, row: PrincipalRow) -> Result<Principal> {
        let role = Role::from_str(&row.role).map_err(|_| {
            Error::internal(format!("Unknown role '{}' stored for principal {}", row.role, row.id))
        })?;

        Ok(Principal {
            id: PrincipalId::new(row.id),
            username: row.username,
            full_name: row.full_name,
            role,
            password_hash: row.password_hash,
            is_first_login: row.is_first_login,
            require_password_change: row.require_password_change,
            disable_password_change: row.disable_password_change,
            show_in_selection: row.show_in_selection,
            accessible_users: row.accessible_users.into_iter().map(PrincipalId::new).collect(),
            available_organizations: row
                .available_organizations
                .into_iter()
                .map(OrganizationId::new)
                .collect(),
            emails: row.emails,
            phones: row.phones,
            avatar_url: row.avatar_url,
            position: row.position,
            department: row.department,
            comment: row.comment,
            timezone: row.timezone,
            is_active: row.is_active,
            token_version: row.token_version,
            blocked_reason: row.blocked_reason,
            blocked_at: row.blocked_at,
            blocked_by: row.blocked_by.map(PrincipalId::new),
            is_online: row.is_online,
            last_seen: row.last_seen,
            created_by: row.created_by.map(PrincipalId::new),
            updated_by: row.updated_by.map(PrincipalId::new),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    fn rows_to_principals(&self, rows: Vec<PrincipalRow>) -> Result<Vec<Principal>> {
        rows.into_iter().map(|row| self.row_to_principal(row)).collect()
    }

    fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, params: &ListParams) {
        if let Some(only) = &params.only {
            let ids: Vec<i64> = only.iter().map(|id| id.get()).collect();
            builder.push(" WHERE id = ANY(").push_bind(ids).push(")");
        }
    }
}

/// Map a write failure, turning a unique violation into a username conflict.
fn map_write_error(err: sqlx::Error, context: &str) -> Error {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return Error::conflict("Username is already taken", "principal");
        }
    }
    Error::Database { source: err, context: context.to_string() }
}

fn ids(values: Vec<PrincipalId>) -> Vec<i64> {
    values.into_iter().map(PrincipalId::get).collect()
}

fn org_ids(values: Vec<OrganizationId>) -> Vec<i64> {
    values.into_iter().map(OrganizationId::get).collect()
}

#[async_trait]
impl PrincipalRepository for SqlxPrincipalRepository {
    #[instrument(skip(self, principal), fields(username = %principal.username), name = "db_create_principal")]
    async fn create(&self, principal: NewPrincipal) -> Result<Principal> {
        let sql = format!(
            "INSERT INTO principals (username, full_name, role, password_hash, is_first_login, \
             require_password_change, disable_password_change, show_in_selection, accessible_users, \
             available_organizations, emails, phones, avatar_url, position, department, comment, \
             timezone, created_by, updated_by) \
             VALUES ($1, $2, $3, $4, TRUE, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $17) \
             RETURNING {}",
            PRINCIPAL_COLUMNS
        );

        let row = sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(&principal.username)
            .bind(&principal.full_name)
            .bind(principal.role.as_str())
            .bind(&principal.password_hash)
            .bind(principal.require_password_change)
            .bind(principal.disable_password_change)
            .bind(principal.show_in_selection)
            .bind(ids(principal.accessible_users))
            .bind(org_ids(principal.available_organizations))
            .bind(&principal.emails)
            .bind(&principal.phones)
            .bind(&principal.avatar_url)
            .bind(&principal.position)
            .bind(&principal.department)
            .bind(&principal.comment)
            .bind(&principal.timezone)
            .bind(principal.created_by.map(PrincipalId::get))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "Failed to create principal"))?;

        self.row_to_principal(row)
    }

    #[instrument(skip(self), fields(principal_id = %id), name = "db_get_principal")]
    async fn get(&self, id: PrincipalId) -> Result<Option<Principal>> {
        let sql = format!("SELECT {} FROM principals WHERE id = $1", PRINCIPAL_COLUMNS);
        let row = sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Database {
                source: e,
                context: format!("Failed to get principal by ID: {}", id),
            })?;

        row.map(|r| self.row_to_principal(r)).transpose()
    }

    #[instrument(skip(self), name = "db_get_principal_by_username")]
    async fn get_by_username(&self, username: &str) -> Result<Option<Principal>> {
        let sql = format!("SELECT {} FROM principals WHERE username = $1", PRINCIPAL_COLUMNS);
        let row = sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Database {
                source: e,
                context: "Failed to get principal by username".to_string(),
            })?;

        row.map(|r| self.row_to_principal(r)).transpose()
    }

    #[instrument(skip(self, email), name = "db_find_principal_by_email")]
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>> {
        let sql = format!(
            "SELECT {} FROM principals \
             WHERE EXISTS (SELECT 1 FROM unnest(emails) AS e WHERE lower(e) = lower($1)) \
             ORDER BY id LIMIT 1",
            PRINCIPAL_COLUMNS
        );
        let row = sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Database {
                source: e,
                context: "Failed to find principal by email".to_string(),
            })?;

        row.map(|r| self.row_to_principal(r)).transpose()
    }

    #[instrument(
        skip(self, changes),
        fields(principal_id = %id, bump_epoch = changes.bump_epoch),
        name = "db_update_principal"
    )]
    async fn update(
        &self,
        id: PrincipalId,
        changes: PrincipalChanges,
        actor: Option<PrincipalId>,
    ) -> Result<Option<Principal>> {
        let mut builder =
            QueryBuilder::<Postgres>::new("UPDATE principals SET updated_at = NOW(), updated_by = ");
        builder.push_bind(actor.map(PrincipalId::get));

        if let Some(value) = changes.username {
            builder.push(", username = ").push_bind(value);
        }
        if let Some(value) = changes.full_name {
            builder.push(", full_name = ").push_bind(value);
        }
        if let Some(value) = changes.role {
            builder.push(", role = ").push_bind(value.as_str());
        }
        if let Some(value) = changes.password_hash {
            builder.push(", password_hash = ").push_bind(value);
        }
        if let Some(value) = changes.is_first_login {
            builder.push(", is_first_login = ").push_bind(value);
        }
        if let Some(value) = changes.require_password_change {
            builder.push(", require_password_change = ").push_bind(value);
        }
        if let Some(value) = changes.disable_password_change {
            builder.push(", disable_password_change = ").push_bind(value);
        }
        if let Some(value) = changes.show_in_selection {
            builder.push(", show_in_selection = ").push_bind(value);
        }
        if let Some(value) = changes.accessible_users {
            builder.push(", accessible_users = ").push_bind(ids(value));
        }
        if let Some(value) = changes.available_organizations {
            builder.push(", available_organizations = ").push_bind(org_ids(value));
        }
        if let Some(value) = changes.emails {
            builder.push(", emails = ").push_bind(value);
        }
        if let Some(value) = changes.phones {
            builder.push(", phones = ").push_bind(value);
        }
        if let Some(value) = changes.avatar_url {
            builder.push(", avatar_url = ").push_bind(value);
        }
        if let Some(value) = changes.position {
            builder.push(", position = ").push_bind(value);
        }
        if let Some(value) = changes.department {
            builder.push(", department = ").push_bind(value);
        }
        if let Some(value) = changes.comment {
            builder.push(", comment = ").push_bind(value);
        }
        if let Some(value) = changes.timezone {
            builder.push(", timezone = ").push_bind(value);
        }
        if let Some(value) = changes.is_active {
            builder.push(", is_active = ").push_bind(value);
        }
        if let Some(value) = changes.blocked_reason {
            builder.push(", blocked_reason = ").push_bind(value);
        }
        if let Some(value) = changes.blocked_at {
            builder.push(", blocked_at = ").push_bind(value);
        }
        if let Some(value) = changes.blocked_by {
            builder.push(", blocked_by = ").push_bind(value.map(PrincipalId::get));
        }
        if changes.bump_epoch {
            builder.push(", token_version = token_version + 1");
        }

        builder.push(" WHERE id = ").push_bind(id.get());
        builder.push(" RETURNING ").push(PRINCIPAL_COLUMNS);

        let row = builder
            .build_query_as::<PrincipalRow>()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "Failed to update principal"))?;

        row.map(|r| self.row_to_principal(r)).transpose()
    }

    #[instrument(skip(self, password_hash), fields(principal_id = %id), name = "db_set_principal_password")]
    async fn set_password(
        &self,
        id: PrincipalId,
        password_hash: String,
    ) -> Result<Option<Principal>> {
        let sql = format!(
            "UPDATE principals SET password_hash = $1, is_first_login = FALSE, \
             require_password_change = FALSE, token_version = token_version + 1, \
             updated_at = NOW(), updated_by = $2 WHERE id = $2 RETURNING {}",
            PRINCIPAL_COLUMNS
        );

        let row = sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(password_hash)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Database {
                source: e,
                context: format!("Failed to store credential for principal {}", id),
            })?;

        row.map(|r| self.row_to_principal(r)).transpose()
    }

    #[instrument(skip(self), fields(principal_id = %id), name = "db_mark_principal_active")]
    async fn mark_active(&self, id: PrincipalId) -> Result<()> {
        sqlx::query("UPDATE principals SET is_online = TRUE, last_seen = NOW() WHERE id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database {
                source: e,
                context: format!("Failed to refresh presence for principal {}", id),
            })?;
        Ok(())
    }

    #[instrument(skip(self), fields(principal_id = %id), name = "db_mark_principal_offline")]
    async fn mark_offline(&self, id: PrincipalId) -> Result<()> {
        sqlx::query("UPDATE principals SET is_online = FALSE WHERE id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database {
                source: e,
                context: format!("Failed to clear presence for principal {}", id),
            })?;
        Ok(())
    }

    #[instrument(skip(self), name = "db_mark_idle_principals_offline")]
    async fn mark_idle_offline(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE principals SET is_online = FALSE \
             WHERE is_online = TRUE AND (last_seen IS NULL OR last_seen < $1)",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database {
            source: e,
            context: "Failed to sweep idle principals".to_string(),
        })?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(page = params.page, page_size = params.page_size), name = "db_list_principals")]
    async fn list(&self, params: &ListParams) -> Result<(Vec<Principal>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM principals");
        Self::push_filter(&mut count, params);
        let total: i64 =
            count.build_query_scalar().fetch_one(&self.pool).await.map_err(|e| {
                Error::Database { source: e, context: "Failed to count principals".to_string() }
            })?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT ");
        select.push(PRINCIPAL_COLUMNS).push(" FROM principals");
        Self::push_filter(&mut select, params);
        select
            .push(" ORDER BY ")
            .push(params.sort.column())
            .push(if params.descending { " DESC NULLS LAST" } else { " ASC NULLS LAST" })
            .push(", id ASC LIMIT ")
            .push_bind(params.page_size)
            .push(" OFFSET ")
            .push_bind(params.offset());

        let rows = select
            .build_query_as::<PrincipalRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Database {
                source: e,
                context: "Failed to list principals".to_string(),
            })?;

        Ok((self.rows_to_principals(rows)?, total))
    }

    #[instrument(skip(self), fields(principal_id = %id), name = "db_delete_principal")]
    async fn delete(&self, id: PrincipalId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM principals WHERE id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database {
                source: e,
                context: format!("Failed to delete principal {}", id),
            })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), name = "db_count_principals")]
    async fn count(&self) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM principals")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Database {
                source: e,
                context: "Failed to count principals".to_string(),
            })
    }
}


#[cfg(all(test, feature = "postgres_tests"))]
mod postgres_tests {
    use super::*;
    use crate::storage::test_support::{new_principal, test_pool};

    #[tokio::test]
    async fn epoch_bump_is_atomic_with_field_change() {
        let repo = SqlxPrincipalRepository::new(test_pool().await);
        let created = repo.create(new_principal("epoch-atomic")).await.unwrap();

        let changes =
            PrincipalChanges { role: Some(Role::Moderator), bump_epoch: true, ..Default::default() };
        let updated = repo.update(created.id, changes, None).await.unwrap().unwrap();

        assert_eq!(updated.role, Role::Moderator);
        assert_eq!(updated.token_version, created.token_version + 1);
        repo.delete(created.id).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_username_is_conflict() {
        let repo = SqlxPrincipalRepository::new(test_pool().await);
        let payload = new_principal("dup-name");
        let created = repo.create(payload.clone()).await.unwrap();

        let err = repo.create(payload).await.unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
        repo.delete(created.id).await.unwrap();
    }

    #[tokio::test]
    async fn set_password_clears_first_login_and_bumps_epoch() {
        let repo = SqlxPrincipalRepository::new(test_pool().await);
        let created = repo.create(new_principal("set-password")).await.unwrap();
        assert!(created.is_first_login);

        let updated = repo.set_password(created.id, "hash".into()).await.unwrap().unwrap();
        assert!(!updated.is_first_login);
        assert!(!updated.require_password_change);
        assert_eq!(updated.token_version, created.token_version + 1);
        repo.delete(created.id).await.unwrap();
    }
}
