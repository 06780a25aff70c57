//! Reset-token lifecycle and the forgot/reset credential flows.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::auth::credential_store::CredentialStore;
use crate::auth::principal::Principal;
use crate::auth::user_validation::validate_password;
use crate::domain::PrincipalId;
use crate::errors::{Error, Result};
use crate::notify::{Notifier, PasswordResetNotice};
use crate::observability::metrics;
use crate::storage::repositories::{actions, record_or_warn, AuditEvent, ResetTokenRepository};

/// Random bytes per reset token (256 bits).
const RESET_TOKEN_BYTES: usize = 32;

/// Returned by the forgot-credential flow whatever happened.
pub const FORGOT_PASSWORD_MESSAGE: &str =
    "If this account exists, a password reset link has been sent";

const INVALID_RESET_TOKEN: &str = "Invalid or expired reset token";

fn generate_secret() -> String {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Clone)]
pub struct PasswordResetService {
    store: CredentialStore,
    reset_tokens: Arc<dyn ResetTokenRepository>,
    notifier: Arc<dyn Notifier>,
    validity: Duration,
    reset_url_base: String,
}

impl std::fmt::Debug for PasswordResetService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordResetService")
            .field("validity", &self.validity)
            .field("reset_url_base", &self.reset_url_base)
            .finish_non_exhaustive()
    }
}

impl PasswordResetService {
    pub fn new(
        store: CredentialStore,
        reset_tokens: Arc<dyn ResetTokenRepository>,
        notifier: Arc<dyn Notifier>,
        validity: Duration,
        reset_url_base: impl Into<String>,
    ) -> Self {
        Self { store, reset_tokens, notifier, validity, reset_url_base: reset_url_base.into() }
    }

    /// Create and persist a fresh reset token for `principal_id`.
    #[instrument(skip(self), fields(principal_id = %principal_id))]
    pub async fn generate(&self, principal_id: PrincipalId, validity: Duration) -> Result<String> {
        let token = generate_secret();
        self.reset_tokens.create(principal_id, &token, Utc::now() + validity).await?;
        Ok(token)
    }

    /// Whether `token` can still be used. Unknown, used and expired tokens all report
    /// `(false, None)`.
    pub async fn validate(&self, token: &str) -> Result<(bool, Option<PrincipalId>)> {
        match self.reset_tokens.find(token).await? {
            Some(record) if record.is_usable(Utc::now()) => Ok((true, Some(record.principal_id))),
            _ => Ok((false, None)),
        }
    }

    /// Mark `token` used. Returns the bound principal when the token was usable.
    pub async fn consume(&self, token: &str) -> Result<Option<PrincipalId>> {
        self.reset_tokens.consume(token).await
    }

    pub fn reset_link(&self, token: &str) -> String {
        format!("{}?token={}", self.reset_url_base, token)
    }

    async fn lookup(&self, username_or_email: &str) -> Result<Option<Principal>> {
        let principals = self.store.principals();
        if let Some(principal) = principals.get_by_username(username_or_email).await? {
            return Ok(Some(principal));
        }
        principals.find_by_email(username_or_email).await
    }

    /// Start the forgot-credential flow.
    ///
    /// Always returns [`FORGOT_PASSWORD_MESSAGE`] unless storage fails. Delivery runs in
    /// the background and its outcome is only logged.
    #[instrument(skip(self, username_or_email))]
    pub async fn forgot_password(&self, username_or_email: &str) -> Result<&'static str> {
        let identity = username_or_email.trim();
        if identity.is_empty() {
            return Ok(FORGOT_PASSWORD_MESSAGE);
        }

        let principal = match self.lookup(identity).await? {
            Some(principal) if principal.is_active => principal,
            Some(principal) => {
                debug!(principal_id = %principal.id, "reset requested for inactive principal");
                return Ok(FORGOT_PASSWORD_MESSAGE);
            }
            None => {
                debug!("reset requested for unknown identity");
                return Ok(FORGOT_PASSWORD_MESSAGE);
            }
        };

        let token = self.generate(principal.id, self.validity).await?;
        record_or_warn(
            self.store.audit().as_ref(),
            AuditEvent::new(None, actions::PASSWORD_RESET_REQUESTED, Some(principal.id), json!({})),
        )
        .await;
        metrics::record_password_reset("requested").await;

        match principal.primary_email() {
            Some(address) => {
                let notice = PasswordResetNotice {
                    address: address.to_string(),
                    username: principal.username.clone(),
                    reset_link: self.reset_link(&token),
                };
                let notifier = self.notifier.clone();
                let principal_id = principal.id;
                tokio::spawn(async move {
                    if let Err(e) = notifier.send_password_reset(&notice).await {
                        warn!(principal_id = %principal_id, error = %e, "password reset notice failed");
                    }
                });
            }
            None => {
                warn!(principal_id = %principal.id, "principal has no email; reset notice not sent")
            }
        }

        info!(principal_id = %principal.id, "password reset token issued");
        Ok(FORGOT_PASSWORD_MESSAGE)
    }

    /// Complete a reset: consume the token, replace the credential, then invalidate every
    /// other outstanding token for the same principal.
    #[instrument(skip(self, token, new_password))]
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<Principal> {
        // Checked before consuming so a weak password does not burn the token
        validate_password(new_password)?;

        let Some(principal_id) = self.consume(token).await? else {
            metrics::record_password_reset("invalid_token").await;
            return Err(Error::validation_field(INVALID_RESET_TOKEN, "token"));
        };

        // A token outliving its principal reads as any other dead token
        let principal = match self.store.reset_credential(principal_id, new_password).await {
            Err(Error::NotFound { .. }) => {
                debug!(principal_id = %principal_id, "reset token bound to a deleted principal");
                metrics::record_password_reset("invalid_token").await;
                return Err(Error::validation_field(INVALID_RESET_TOKEN, "token"));
            }
            other => other?,
        };

        let invalidated = self.reset_tokens.invalidate_all(principal_id).await?;
        record_or_warn(
            self.store.audit().as_ref(),
            AuditEvent::on_self(principal_id, actions::PASSWORD_RESET, json!({})),
        )
        .await;
        metrics::record_password_reset("completed").await;
        info!(
            principal_id = %principal_id,
            token_version = principal.token_version,
            invalidated_tokens = invalidated,
            "password reset completed"
        );

        Ok(principal)
    }
}
