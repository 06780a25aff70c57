//! Credential Store
//!
//! Owns credential verification and every write to a principal record, including the
//! decision of when a write must invalidate outstanding sessions by incrementing the
//! principal's epoch.

use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::auth::hashing;
use crate::auth::principal::{
    CreatePrincipalRequest, NewPrincipal, Principal, PrincipalChanges, UpdatePrincipalRequest,
};
use crate::auth::user_validation::validate_password;
use crate::domain::PrincipalId;
use crate::errors::{AuthErrorType, Error, Result};
use crate::storage::repositories::{
    actions, record_or_warn, AuditEvent, AuditLogRepository, ListParams, PrincipalRepository,
};

/// Verified when the identity is unknown so both failure paths cost one Argon2 run.
static DUMMY_HASH: LazyLock<String> = LazyLock::new(|| {
    hashing::hash_password("dummy_startup_value")
        .unwrap_or_else(|_| "$argon2id$v=19$m=768,t=1,p=1$dW5rbm93bg$dW5rbm93bg".to_string())
});

const INVALID_CREDENTIALS: &str = "Invalid username or password";

fn invalid_credentials() -> Error {
    Error::auth(INVALID_CREDENTIALS, AuthErrorType::InvalidCredentials)
}

fn principal_not_found(id: PrincipalId) -> Error {
    Error::not_found("principal", id.to_string())
}

/// Side effects of a mutation beyond the field writes themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MutationEffects {
    pub epoch_bumped: bool,
    pub blocked: bool,
    pub unblocked: bool,
}

/// Translate a permitted update request into a single change set.
///
/// Password hashing happens here so that the repository only ever sees hashes.
pub fn plan_mutation(
    request: UpdatePrincipalRequest,
    actor: PrincipalId,
    now: DateTime<Utc>,
) -> Result<(PrincipalChanges, MutationEffects)> {
    if request.password.is_some() && request.reset_password == Some(true) {
        return Err(Error::validation(
            "password and reset_password cannot be combined in one request",
        ));
    }

    let mut effects = MutationEffects::default();
    let mut changes = PrincipalChanges {
        username: request.username,
        full_name: request.full_name,
        disable_password_change: request.disable_password_change,
        show_in_selection: request.show_in_selection,
        accessible_users: request.accessible_users,
        available_organizations: request.available_organizations,
        emails: request.emails,
        phones: request.phones,
        avatar_url: request.avatar_url,
        position: request.position,
        department: request.department,
        comment: request.comment,
        timezone: request.timezone,
        ..Default::default()
    };

    if let Some(role) = request.role {
        changes.role = Some(role);
        effects.epoch_bumped = true;
    }

    if let Some(password) = request.password {
        changes.password_hash = Some(Some(hashing::hash_password(&password)?));
        effects.epoch_bumped = true;
    } else if request.reset_password == Some(true) {
        changes.password_hash = Some(None);
        changes.is_first_login = Some(true);
        changes.require_password_change = Some(true);
        effects.epoch_bumped = true;
    }

    if let Some(require) = request.require_password_change {
        changes.require_password_change = Some(require);
        if require {
            changes.is_first_login = Some(true);
            effects.epoch_bumped = true;
        }
    }

    match request.is_active {
        Some(false) => {
            changes.is_active = Some(false);
            changes.blocked_at = Some(Some(now));
            changes.blocked_by = Some(Some(actor));
            changes.blocked_reason =
                Some(request.blocked_reason.filter(|reason| !reason.trim().is_empty()));
            effects.epoch_bumped = true;
            effects.blocked = true;
        }
        Some(true) => {
            changes.is_active = Some(true);
            changes.blocked_at = Some(None);
            changes.blocked_by = Some(None);
            changes.blocked_reason = Some(None);
            effects.unblocked = true;
        }
        None => {
            if let Some(reason) = request.blocked_reason {
                changes.blocked_reason = Some(Some(reason));
            }
        }
    }

    changes.bump_epoch = effects.epoch_bumped;
    Ok((changes, effects))
}

/// Credential verification and principal persistence.
#[derive(Clone)]
pub struct CredentialStore {
    principals: Arc<dyn PrincipalRepository>,
    audit: Arc<dyn AuditLogRepository>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore").finish_non_exhaustive()
    }
}

impl CredentialStore {
    pub fn new(principals: Arc<dyn PrincipalRepository>, audit: Arc<dyn AuditLogRepository>) -> Self {
        Self { principals, audit }
    }

    pub fn principals(&self) -> &Arc<dyn PrincipalRepository> {
        &self.principals
    }

    pub fn audit(&self) -> &Arc<dyn AuditLogRepository> {
        &self.audit
    }

    /// Check a submitted credential.
    ///
    /// Unknown identity and wrong credential produce the same external error; the
    /// distinction is only logged.
    #[instrument(skip(self, credential), fields(username = %username))]
    pub async fn authenticate(&self, username: &str, credential: &str) -> Result<Principal> {
        let Some(principal) = self.principals.get_by_username(username).await? else {
            if let Err(e) = hashing::verify_password(credential, &DUMMY_HASH) {
                warn!(error = %e, "dummy hash verification failed unexpectedly");
            }
            warn!(username = %username, "login attempt for non-existent principal");
            return Err(invalid_credentials());
        };

        if !principal.is_active {
            warn!(principal_id = %principal.id, "login attempt for blocked principal");
            return Err(Error::auth(principal.blocked_message(), AuthErrorType::AccountBlocked));
        }

        if principal.awaiting_first_credential() {
            info!(principal_id = %principal.id, "first login without a stored credential");
            return Ok(principal);
        }

        let Some(stored_hash) = principal.password_hash.as_deref() else {
            warn!(principal_id = %principal.id, "login attempt for principal without credential");
            return Err(invalid_credentials());
        };

        if !hashing::verify_password(credential, stored_hash)? {
            warn!(principal_id = %principal.id, "login attempt with incorrect password");
            return Err(invalid_credentials());
        }

        Ok(principal)
    }

    /// Self-service credential change. Always increments the epoch on success.
    #[instrument(skip(self, old, new, confirm), fields(principal_id = %id))]
    pub async fn change_credential(
        &self,
        id: PrincipalId,
        old: &str,
        new: &str,
        confirm: &str,
    ) -> Result<Principal> {
        if new != confirm {
            return Err(Error::validation_field(
                "New password and confirmation do not match",
                "confirm_password",
            ));
        }
        validate_password(new)?;

        let principal = self.principals.get(id).await?.ok_or_else(|| principal_not_found(id))?;

        if principal.disable_password_change {
            return Err(Error::forbidden("Password change is disabled for this account"));
        }

        if !principal.awaiting_first_credential() {
            let verified = match principal.password_hash.as_deref() {
                Some(stored) => hashing::verify_password(old, stored)?,
                None => false,
            };
            if !verified {
                warn!(principal_id = %id, "credential change with incorrect current password");
                return Err(Error::validation_field("Current password is incorrect", "old_password"));
            }
        }

        let new_hash = hashing::hash_password(new)?;
        let updated = self
            .principals
            .set_password(id, new_hash)
            .await?
            .ok_or_else(|| principal_not_found(id))?;

        record_or_warn(
            self.audit.as_ref(),
            AuditEvent::on_self(id, actions::CHANGE_PASSWORD, json!({ "self_service": true })),
        )
        .await;
        info!(principal_id = %id, token_version = updated.token_version, "credential changed");

        Ok(updated)
    }

    /// Replace the credential as part of a completed reset. Increments the epoch.
    #[instrument(skip(self, new), fields(principal_id = %id))]
    pub async fn reset_credential(&self, id: PrincipalId, new: &str) -> Result<Principal> {
        validate_password(new)?;
        let new_hash = hashing::hash_password(new)?;
        self.principals.set_password(id, new_hash).await?.ok_or_else(|| principal_not_found(id))
    }

    /// Apply the fields that survived Access Policy filtering.
    #[instrument(skip(self, request), fields(target_id = %target, actor_id = %actor))]
    pub async fn apply_mutation(
        &self,
        target: PrincipalId,
        request: UpdatePrincipalRequest,
        actor: PrincipalId,
    ) -> Result<Principal> {
        request.validate()?;

        let fields: Vec<&'static str> =
            request.present_fields().iter().map(|field| field.as_str()).collect();
        let (changes, effects) = plan_mutation(request, actor, Utc::now())?;

        let updated = self
            .principals
            .update(target, changes, Some(actor))
            .await?
            .ok_or_else(|| principal_not_found(target))?;

        record_or_warn(
            self.audit.as_ref(),
            AuditEvent::new(
                Some(actor),
                actions::UPDATE_USER,
                Some(target),
                json!({ "fields": fields, "sessions_revoked": effects.epoch_bumped }),
            ),
        )
        .await;

        if effects.blocked {
            record_or_warn(
                self.audit.as_ref(),
                AuditEvent::new(
                    Some(actor),
                    actions::BLOCK_USER,
                    Some(target),
                    json!({ "reason": updated.blocked_reason }),
                ),
            )
            .await;
        } else if effects.unblocked {
            record_or_warn(
                self.audit.as_ref(),
                AuditEvent::new(Some(actor), actions::UNBLOCK_USER, Some(target), json!({})),
            )
            .await;
        }

        info!(
            target_id = %target,
            sessions_revoked = effects.epoch_bumped,
            token_version = updated.token_version,
            "principal updated"
        );
        Ok(updated)
    }

    /// Provision a new principal. Without an initial password it awaits its first
    /// credential.
    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn create(
        &self,
        request: CreatePrincipalRequest,
        actor: Option<PrincipalId>,
    ) -> Result<Principal> {
        request.validate()?;

        let password_hash = match request.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => Some(hashing::hash_password(password)?),
            None => None,
        };
        let require_password_change = request.require_password_change || password_hash.is_none();

        let principal = self
            .principals
            .create(NewPrincipal {
                username: request.username,
                full_name: request.full_name.trim().to_string(),
                role: request.role,
                password_hash,
                require_password_change,
                disable_password_change: request.disable_password_change,
                show_in_selection: request.show_in_selection,
                accessible_users: request.accessible_users,
                available_organizations: request.available_organizations,
                emails: request.emails,
                phones: request.phones,
                avatar_url: request.avatar_url,
                position: request.position,
                department: request.department,
                comment: request.comment,
                timezone: request.timezone,
                created_by: actor,
            })
            .await?;

        record_or_warn(
            self.audit.as_ref(),
            AuditEvent::new(
                actor,
                actions::CREATE_USER,
                Some(principal.id),
                json!({ "username": principal.username, "role": principal.role }),
            ),
        )
        .await;
        info!(principal_id = %principal.id, role = %principal.role, "principal created");

        Ok(principal)
    }

    pub async fn get(&self, id: PrincipalId) -> Result<Principal> {
        self.principals.get(id).await?.ok_or_else(|| principal_not_found(id))
    }

    pub async fn list(&self, params: &ListParams) -> Result<(Vec<Principal>, i64)> {
        self.principals.list(params).await
    }

    /// Physically delete a principal. Its reset tokens go with it.
    #[instrument(skip(self), fields(target_id = %target, actor_id = %actor))]
    pub async fn delete(&self, target: PrincipalId, actor: PrincipalId) -> Result<()> {
        if target == actor {
            return Err(Error::forbidden("You cannot delete your own account"));
        }

        let principal = self.get(target).await?;
        if !self.principals.delete(target).await? {
            return Err(principal_not_found(target));
        }

        record_or_warn(
            self.audit.as_ref(),
            AuditEvent::new(
                Some(actor),
                actions::DELETE_USER,
                Some(target),
                json!({ "username": principal.username }),
            ),
        )
        .await;
        info!(target_id = %target, "principal deleted");
        Ok(())
    }

    /// Mark principals idle since before `cutoff` as not present. Never touches the epoch.
    #[instrument(skip(self))]
    pub async fn sweep_idle(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.principals.mark_idle_offline(cutoff).await
    }
}
