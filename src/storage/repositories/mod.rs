//! Repository modules for data access
//!
//! Each repository is an `async_trait` object with a PostgreSQL implementation; the
//! in-memory counterparts live in `storage::memory`.

pub mod audit_log;
pub mod principal;
pub mod reset_token;

pub use audit_log::{actions, record_or_warn, AuditEvent, AuditLogRepository, SqlxAuditLogRepository};
pub use principal::{
    ListParams, PrincipalRepository, SortField, SqlxPrincipalRepository, DEFAULT_PAGE_SIZE,
    MAX_PAGE_SIZE,
};
pub use reset_token::{ResetToken, ResetTokenRepository, SqlxResetTokenRepository};
