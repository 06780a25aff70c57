//! Login service for username/password authentication.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument, warn};

use crate::auth::credential_store::CredentialStore;
use crate::auth::jwt::TokenCodec;
use crate::auth::principal::{LoginRequest, Principal};
use crate::domain::PrincipalId;
use crate::errors::{AuthErrorType, Error, Result};
use crate::observability::metrics;
use crate::storage::repositories::{actions, record_or_warn, AuditEvent};

/// A successful login: the principal and a freshly issued session token.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub principal: Principal,
    pub token: String,
}

/// Service for handling username/password sessions.
#[derive(Clone, Debug)]
pub struct LoginService {
    store: CredentialStore,
    codec: Arc<TokenCodec>,
}

fn login_status(err: &Error) -> &'static str {
    match err {
        Error::Auth { error_type: AuthErrorType::AccountBlocked, .. } => "blocked",
        Error::Auth { .. } => "invalid_credentials",
        _ => "error",
    }
}

impl LoginService {
    pub fn new(store: CredentialStore, codec: Arc<TokenCodec>) -> Self {
        Self { store, codec }
    }

    /// Authenticate, issue a token carrying the current epoch and mark the principal
    /// present.
    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginOutcome> {
        let principal = match self.store.authenticate(&request.username, &request.password).await
        {
            Ok(principal) => principal,
            Err(err) => {
                let status = login_status(&err);
                metrics::record_login(status).await;
                if !err.is_internal() {
                    let target = self
                        .store
                        .principals()
                        .get_by_username(&request.username)
                        .await
                        .ok()
                        .flatten()
                        .map(|p| p.id);
                    record_or_warn(
                        self.store.audit().as_ref(),
                        AuditEvent::new(
                            target,
                            actions::LOGIN_FAILED,
                            target,
                            json!({ "username": request.username, "reason": status }),
                        ),
                    )
                    .await;
                }
                return Err(err);
            }
        };

        let token = self.codec.issue(&principal)?;

        if let Err(e) = self.store.principals().mark_active(principal.id).await {
            warn!(principal_id = %principal.id, error = %e, "failed to mark principal present");
        }

        record_or_warn(
            self.store.audit().as_ref(),
            AuditEvent::on_self(principal.id, actions::LOGIN, json!({})),
        )
        .await;
        metrics::record_login("success").await;
        info!(principal_id = %principal.id, role = %principal.role, "principal logged in");

        Ok(LoginOutcome { principal, token })
    }

    /// Mark the principal not present. The token stays valid until expiry.
    #[instrument(skip(self), fields(principal_id = %id))]
    pub async fn logout(&self, id: PrincipalId) -> Result<()> {
        self.store.principals().mark_offline(id).await?;
        record_or_warn(
            self.store.audit().as_ref(),
            AuditEvent::on_self(id, actions::LOGOUT, json!({})),
        )
        .await;
        info!(principal_id = %id, "principal logged out");
        Ok(())
    }

    /// Issue a token for the principal's current state.
    pub fn issue(&self, principal: &Principal) -> Result<String> {
        self.codec.issue(principal)
    }
}
