//! Principal domain model and its request/response DTOs.
//!
//! `UpdatePrincipalRequest` tracks field presence explicitly: an absent key leaves the
//! stored value untouched, `null` clears a clearable text field, and any string
//! (including `""`) is written as-is.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::models::Role;
use crate::domain::{OrganizationId, PrincipalId};

/// Stored representation of a principal, including credential state.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub id: PrincipalId,
    pub username: String,
    pub full_name: String,
    pub role: Role,
    pub password_hash: Option<String>,
    pub is_first_login: bool,
    pub require_password_change: bool,
    pub disable_password_change: bool,
    pub show_in_selection: bool,
    pub accessible_users: Vec<PrincipalId>,
    pub available_organizations: Vec<OrganizationId>,
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
    pub blocked_by: Option<PrincipalId>,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_by: Option<PrincipalId>,
    pub updated_by: Option<PrincipalId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Principal {
    /// Provisioned but not yet activated: no stored credential and both
    /// first-login and require-change set.
    pub fn awaiting_first_credential(&self) -> bool {
        self.password_hash.is_none() && self.is_first_login && self.require_password_change
    }

    /// Whether the given principal is on this principal's accessible-target list.
    pub fn can_access(&self, target: PrincipalId) -> bool {
        self.accessible_users.contains(&target)
    }

    /// Reason shown to a blocked principal.
    pub fn blocked_message(&self) -> String {
        self.blocked_reason
            .as_deref()
            .filter(|reason| !reason.trim().is_empty())
            .unwrap_or(crate::auth::models::DEFAULT_BLOCKED_REASON)
            .to_string()
    }

    /// First configured contact address, if any.
    pub fn primary_email(&self) -> Option<&str> {
        self.emails.iter().map(String::as_str).find(|email| !email.trim().is_empty())
    }
}

/// Insert payload for a new principal.
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub username: String,
    pub full_name: String,
    pub role: Role,
    pub password_hash: Option<String>,
    pub require_password_change: bool,
    pub disable_password_change: bool,
    pub show_in_selection: bool,
    pub accessible_users: Vec<PrincipalId>,
    pub available_organizations: Vec<OrganizationId>,
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub avatar_url: Option<String>,
    pub position: Option<String>,
    pub department: Option<String>,
    pub comment: Option<String>,
    pub timezone: Option<String>,
    pub created_by: Option<PrincipalId>,
}

/// Change set applied by the repository in a single statement.
///
/// `None` leaves a column untouched. For nullable columns `Some(None)` writes NULL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrincipalChanges {
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub password_hash: Option<Option<String>>,
    pub is_first_login: Option<bool>,
    pub require_password_change: Option<bool>,
    pub disable_password_change: Option<bool>,
    pub show_in_selection: Option<bool>,
    pub accessible_users: Option<Vec<PrincipalId>>,
    pub available_organizations: Option<Vec<OrganizationId>>,
    pub emails: Option<Vec<String>>,
    pub phones: Option<Vec<String>>,
    pub avatar_url: Option<Option<String>>,
    pub position: Option<Option<String>>,
    pub department: Option<Option<String>>,
    pub comment: Option<Option<String>>,
    pub timezone: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub blocked_reason: Option<Option<String>>,
    pub blocked_at: Option<Option<DateTime<Utc>>>,
    pub blocked_by: Option<Option<PrincipalId>>,
    /// Increment `token_version` in the same statement.
    pub bump_epoch: bool,
}

/// Fields of an update request, keyed by their JSON names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrincipalField {
    FullName,
    Username,
    Password,
    ResetPassword,
    Role,
    AvatarUrl,
    RequirePasswordChange,
    DisablePasswordChange,
    ShowInSelection,
    AvailableOrganizations,
    AccessibleUsers,
    Emails,
    Phones,
    Position,
    Department,
    Comment,
    Timezone,
    IsActive,
    BlockedReason,
}

impl PrincipalField {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalField::FullName => "full_name",
            PrincipalField::Username => "username",
            PrincipalField::Password => "password",
            PrincipalField::ResetPassword => "reset_password",
            PrincipalField::Role => "role",
            PrincipalField::AvatarUrl => "avatar_url",
            PrincipalField::RequirePasswordChange => "require_password_change",
            PrincipalField::DisablePasswordChange => "disable_password_change",
            PrincipalField::ShowInSelection => "show_in_selection",
            PrincipalField::AvailableOrganizations => "available_organizations",
            PrincipalField::AccessibleUsers => "accessible_users",
            PrincipalField::Emails => "emails",
            PrincipalField::Phones => "phones",
            PrincipalField::Position => "position",
            PrincipalField::Department => "department",
            PrincipalField::Comment => "comment",
            PrincipalField::Timezone => "timezone",
            PrincipalField::IsActive => "is_active",
            PrincipalField::BlockedReason => "blocked_reason",
        }
    }
}

impl Display for PrincipalField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Distinguishes an explicit `null` (`Some(None)`) from an absent key (`None`, via
/// `#[serde(default)]`).
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Request to update an existing principal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdatePrincipalRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// `true` removes the stored credential and returns the principal to the
    /// provisioned state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_password: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub avatar_url: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_password_change: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_password_change: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_in_selection: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_organizations: Option<Vec<OrganizationId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessible_users: Option<Vec<PrincipalId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emails: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phones: Option<Vec<String>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub position: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub department: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub comment: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub timezone: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    /// Recorded when the same request deactivates the principal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
}

impl UpdatePrincipalRequest {
    /// Every field whose key was present in the request.
    pub fn present_fields(&self) -> Vec<PrincipalField> {
        let mut fields = Vec::new();
        let mut mark = |present: bool, field: PrincipalField| {
            if present {
                fields.push(field);
            }
        };

        mark(self.full_name.is_some(), PrincipalField::FullName);
        mark(self.username.is_some(), PrincipalField::Username);
        mark(self.password.is_some(), PrincipalField::Password);
        mark(self.reset_password.is_some(), PrincipalField::ResetPassword);
        mark(self.role.is_some(), PrincipalField::Role);
        mark(self.avatar_url.is_some(), PrincipalField::AvatarUrl);
        mark(self.require_password_change.is_some(), PrincipalField::RequirePasswordChange);
        mark(self.disable_password_change.is_some(), PrincipalField::DisablePasswordChange);
        mark(self.show_in_selection.is_some(), PrincipalField::ShowInSelection);
        mark(self.available_organizations.is_some(), PrincipalField::AvailableOrganizations);
        mark(self.accessible_users.is_some(), PrincipalField::AccessibleUsers);
        mark(self.emails.is_some(), PrincipalField::Emails);
        mark(self.phones.is_some(), PrincipalField::Phones);
        mark(self.position.is_some(), PrincipalField::Position);
        mark(self.department.is_some(), PrincipalField::Department);
        mark(self.comment.is_some(), PrincipalField::Comment);
        mark(self.timezone.is_some(), PrincipalField::Timezone);
        mark(self.is_active.is_some(), PrincipalField::IsActive);
        mark(self.blocked_reason.is_some(), PrincipalField::BlockedReason);

        fields
    }

    pub fn is_empty(&self) -> bool {
        self.present_fields().is_empty()
    }

    /// Drop every field not in `allowed`.
    pub fn retain(mut self, allowed: &[PrincipalField]) -> Self {
        for field in self.present_fields() {
            if !allowed.contains(&field) {
                self.clear(field);
            }
        }
        self
    }

    fn clear(&mut self, field: PrincipalField) {
        match field {
            PrincipalField::FullName => self.full_name = None,
            PrincipalField::Username => self.username = None,
            PrincipalField::Password => self.password = None,
            PrincipalField::ResetPassword => self.reset_password = None,
            PrincipalField::Role => self.role = None,
            PrincipalField::AvatarUrl => self.avatar_url = None,
            PrincipalField::RequirePasswordChange => self.require_password_change = None,
            PrincipalField::DisablePasswordChange => self.disable_password_change = None,
            PrincipalField::ShowInSelection => self.show_in_selection = None,
            PrincipalField::AvailableOrganizations => self.available_organizations = None,
            PrincipalField::AccessibleUsers => self.accessible_users = None,
            PrincipalField::Emails => self.emails = None,
            PrincipalField::Phones => self.phones = None,
            PrincipalField::Position => self.position = None,
            PrincipalField::Department => self.department = None,
            PrincipalField::Comment => self.comment = None,
            PrincipalField::Timezone => self.timezone = None,
            PrincipalField::IsActive => self.is_active = None,
            PrincipalField::BlockedReason => self.blocked_reason = None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Request to create a new principal.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatePrincipalRequest {
    pub username: String,
    pub full_name: String,
    /// Leave unset to provision the principal without a credential.
    #[serde(default)]
    pub password: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub require_password_change: bool,
    #[serde(default)]
    pub disable_password_change: bool,
    #[serde(default = "default_true")]
    pub show_in_selection: bool,
    #[serde(default)]
    pub accessible_users: Vec<PrincipalId>,
    #[serde(default)]
    pub available_organizations: Vec<OrganizationId>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

/// Principal as exposed over the API. Never carries credential material.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PrincipalResponse {
    pub id: PrincipalId,
    pub username: String,
    pub full_name: String,
    pub role: Role,
    pub is_first_login: bool,
    pub require_password_change: bool,
    pub disable_password_change: bool,
    pub show_in_selection: bool,
    pub accessible_users: Vec<PrincipalId>,
    pub available_organizations: Vec<OrganizationId>,
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub avatar_url: Option<String>,
    pub position: Option<String>,
    pub department: Option<String>,
    pub comment: Option<String>,
    pub timezone: Option<String>,
    pub is_active: bool,
    pub blocked_reason: Option<String>,
    pub blocked_at: Option<DateTime<Utc>>,
    pub blocked_by: Option<PrincipalId>,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_by: Option<PrincipalId>,
    pub updated_by: Option<PrincipalId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Principal> for PrincipalResponse {
    fn from(principal: Principal) -> Self {
        Self {
            id: principal.id,
            username: principal.username,
            full_name: principal.full_name,
            role: principal.role,
            is_first_login: principal.is_first_login,
            require_password_change: principal.require_password_change,
            disable_password_change: principal.disable_password_change,
            show_in_selection: principal.show_in_selection,
            accessible_users: principal.accessible_users,
            available_organizations: principal.available_organizations,
            emails: principal.emails,
            phones: principal.phones,
            avatar_url: principal.avatar_url,
            position: principal.position,
            department: principal.department,
            comment: principal.comment,
            timezone: principal.timezone,
            is_active: principal.is_active,
            blocked_reason: principal.blocked_reason,
            blocked_at: principal.blocked_at,
            blocked_by: principal.blocked_by,
            is_online: principal.is_online,
            last_seen: principal.last_seen,
            created_by: principal.created_by,
            updated_by: principal.updated_by,
            created_at: principal.created_at,
            updated_at: principal.updated_at,
        }
    }
}

/// Paginated principal listing.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PrincipalListResponse {
    pub principals: Vec<PrincipalResponse>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

/// Query parameters for listing principals.
#[derive(Debug, Clone, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListPrincipalsQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    /// One of: id, username, full_name, role, created_at, last_seen, is_online
    pub sort_by: Option<String>,
    pub sort_desc: Option<bool>,
}

/// Login credentials.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Successful login.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub user: PrincipalResponse,
    pub token: String,
    pub require_password_change: bool,
}

/// Self-service credential change.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub old_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

/// Response to a successful credential change. The token carries the new epoch.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChangePasswordResponse {
    pub message: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    pub username_or_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ValidateResetTokenRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ValidateResetTokenResponse {
    pub valid: bool,
}

/// Generic acknowledgement body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_null_and_empty_are_distinct() {
        let absent: UpdatePrincipalRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.comment, None);
        assert!(absent.is_empty());

        let cleared: UpdatePrincipalRequest = serde_json::from_str(r#"{"comment": null}"#).unwrap();
        assert_eq!(cleared.comment, Some(None));

        let empty: UpdatePrincipalRequest = serde_json::from_str(r#"{"comment": ""}"#).unwrap();
        assert_eq!(empty.comment, Some(Some(String::new())));
    }

    #[test]
    fn empty_list_counts_as_present() {
        let request: UpdatePrincipalRequest =
            serde_json::from_str(r#"{"available_organizations": []}"#).unwrap();
        assert_eq!(request.present_fields(), vec![PrincipalField::AvailableOrganizations]);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = serde_json::from_str::<UpdatePrincipalRequest>(r#"{"token_version": 9}"#);
        assert!(result.is_err());
    }

    #[test]
    fn retain_keeps_only_allowed_fields() {
        let request: UpdatePrincipalRequest = serde_json::from_str(
            r#"{"full_name": "New", "available_organizations": [3], "role": "user"}"#,
        )
        .unwrap();

        let filtered = request.retain(&[PrincipalField::AvailableOrganizations]);
        assert_eq!(filtered.present_fields(), vec![PrincipalField::AvailableOrganizations]);
        assert_eq!(filtered.available_organizations, Some(vec![OrganizationId::new(3)]));
        assert_eq!(filtered.full_name, None);
        assert_eq!(filtered.role, None);
    }

    #[test]
    fn awaiting_first_credential_requires_all_three_conditions() {
        let mut principal = fixtures::principal(1, Role::Standard);
        principal.password_hash = None;
        principal.is_first_login = true;
        principal.require_password_change = true;
        assert!(principal.awaiting_first_credential());

        principal.require_password_change = false;
        assert!(!principal.awaiting_first_credential());

        principal.require_password_change = true;
        principal.password_hash = Some("hash".into());
        assert!(!principal.awaiting_first_credential());
    }

    #[test]
    fn blocked_message_defaults_when_reason_missing() {
        let mut principal = fixtures::principal(1, Role::Standard);
        assert_eq!(principal.blocked_message(), "Your account is blocked");
        principal.blocked_reason = Some("Left the company".into());
        assert_eq!(principal.blocked_message(), "Left the company");
    }

    #[test]
    fn response_omits_credential_material() {
        let principal = fixtures::principal(5, Role::Admin);
        let json = serde_json::to_value(PrincipalResponse::from(principal)).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("token_version").is_none());
        assert_eq!(json["role"], "admin");
    }
}
