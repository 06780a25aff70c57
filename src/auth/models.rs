//! Role model, request-scoped principal context and Session Guard errors.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;

use crate::domain::PrincipalId;
use crate::errors::Error;

/// Message attached to a blocked principal without a recorded reason.
pub const DEFAULT_BLOCKED_REASON: &str = "Your account is blocked";

/// Message attached to a force logout caused by an epoch mismatch.
pub const REVOKED_REASON: &str = "Your account settings have been changed by administrator";

/// Three-tier role model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Moderator,
    /// A standard principal. Stored and serialized as `user`.
    #[serde(rename = "user")]
    Standard,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Moderator => "moderator",
            Role::Standard => "user",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "moderator" => Ok(Role::Moderator),
            "user" | "standard" => Ok(Role::Standard),
            other => Err(RoleParseError(other.to_string())),
        }
    }
}

/// Error returned when role parsing fails.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid role: {0}")]
pub struct RoleParseError(pub String);

/// Identity and role attached to a request once the Session Guard accepts it.
///
/// Handlers receive it explicitly through `Extension<AuthenticatedPrincipal>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct AuthenticatedPrincipal {
    pub id: PrincipalId,
    pub role: Role,
}

impl AuthenticatedPrincipal {
    pub fn new(id: PrincipalId, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }
}

/// Errors returned by the Session Guard pipeline.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unauthorized: bearer token missing")]
    MissingBearer,
    #[error("unauthorized: malformed bearer token")]
    MalformedBearer,
    #[error("unauthorized: invalid token")]
    InvalidToken,
    #[error("unauthorized: principal not found")]
    PrincipalNotFound,
    /// The principal is inactive. Clients must discard their token.
    #[error("blocked: {reason}")]
    Blocked { reason: String },
    /// The token's epoch no longer matches. Clients must discard their token.
    #[error("revoked: {reason}")]
    Revoked { reason: String },
    #[error("forbidden: insufficient role")]
    Forbidden,
    #[error(transparent)]
    Persistence(#[from] Error),
}

impl AuthError {
    /// Whether the rejection instructs the client to drop its session token
    pub fn is_force_logout(&self) -> bool {
        matches!(self, AuthError::Blocked { .. } | AuthError::Revoked { .. })
    }

    /// Label used for metrics
    pub fn status_label(&self) -> &'static str {
        match self {
            AuthError::MissingBearer => "missing_bearer",
            AuthError::MalformedBearer => "malformed",
            AuthError::InvalidToken => "invalid_token",
            AuthError::PrincipalNotFound => "not_found",
            AuthError::Blocked { .. } => "blocked",
            AuthError::Revoked { .. } => "revoked",
            AuthError::Forbidden => "forbidden",
            AuthError::Persistence(_) => "error",
        }
    }
}
