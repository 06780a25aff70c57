//! Session Guard
//!
//! Turns an `Authorization` header into an [`AuthenticatedPrincipal`] by running the
//! ordered checks: bearer extraction, token verification, principal load, active flag,
//! epoch comparison. The epoch is compared against the freshly loaded principal, so a
//! signature-valid token is still rejected once its epoch is stale.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::auth::jwt::TokenCodec;
use crate::auth::models::{AuthError, AuthenticatedPrincipal, Role, REVOKED_REASON};
use crate::auth::presence::PresenceTracker;
use crate::observability::metrics;
use crate::storage::repositories::PrincipalRepository;

const BEARER_PREFIX: &str = "Bearer ";

/// Extract the token from an `Authorization` header value.
pub fn bearer_token(header: &str) -> Result<&str, AuthError> {
    let header = header.trim();
    if header.is_empty() {
        return Err(AuthError::MissingBearer);
    }

    let token = header.strip_prefix(BEARER_PREFIX).ok_or(AuthError::MalformedBearer)?.trim();
    if token.is_empty() {
        return Err(AuthError::MalformedBearer);
    }
    Ok(token)
}

#[derive(Clone)]
pub struct SessionGuard {
    codec: Arc<TokenCodec>,
    principals: Arc<dyn PrincipalRepository>,
    presence: PresenceTracker,
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard").field("codec", &self.codec).finish_non_exhaustive()
    }
}

impl SessionGuard {
    pub fn new(
        codec: Arc<TokenCodec>,
        principals: Arc<dyn PrincipalRepository>,
        presence: PresenceTracker,
    ) -> Self {
        Self { codec, principals, presence }
    }

    /// Authenticate an `Authorization` header value.
    #[instrument(skip(self, header), name = "session_guard.authenticate")]
    pub async fn authenticate(&self, header: &str) -> Result<AuthenticatedPrincipal, AuthError> {
        let result = self.evaluate(header).await;

        match &result {
            Ok(_) => metrics::record_authentication("success").await,
            Err(err) => {
                metrics::record_authentication(err.status_label()).await;
                if err.is_force_logout() {
                    metrics::record_force_logout(err.status_label()).await;
                }
            }
        }

        result
    }

    async fn evaluate(&self, header: &str) -> Result<AuthenticatedPrincipal, AuthError> {
        let token = bearer_token(header)?;
        let claims = self.codec.verify(token).map_err(|_| AuthError::InvalidToken)?;
        let id = claims.principal_id().map_err(|_| AuthError::InvalidToken)?;

        let principal = self.principals.get(id).await?.ok_or(AuthError::PrincipalNotFound)?;

        if !principal.is_active {
            return Err(AuthError::Blocked { reason: principal.blocked_message() });
        }

        if principal.token_version != claims.token_version {
            debug!(
                principal_id = %id,
                token_epoch = claims.token_version,
                current_epoch = principal.token_version,
                "token epoch is stale"
            );
            return Err(AuthError::Revoked { reason: REVOKED_REASON.to_string() });
        }

        self.presence.touch(id);
        Ok(AuthenticatedPrincipal::new(id, principal.role))
    }

    /// Second stage: role membership for restricted endpoints.
    pub fn authorize_roles(
        principal: &AuthenticatedPrincipal,
        allowed: &[Role],
    ) -> Result<(), AuthError> {
        if principal.has_any_role(allowed) {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }
}
