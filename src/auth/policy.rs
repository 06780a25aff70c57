//! Access Policy
//!
//! Every role rule lives here: which fields of an update each role may submit for
//! itself or for another principal, and which principals it may see. The functions are
//! pure; callers load the actor and pass it in.

use crate::auth::models::Role;
use crate::auth::principal::{Principal, PrincipalField, UpdatePrincipalRequest};
use crate::domain::PrincipalId;
use crate::errors::{Error, Result};

/// The principal performing an operation, with the data the policy needs.
#[derive(Debug, Clone, Copy)]
pub struct Actor<'a> {
    pub id: PrincipalId,
    pub role: Role,
    pub accessible_targets: &'a [PrincipalId],
}

impl<'a> Actor<'a> {
    pub fn from_principal(principal: &'a Principal) -> Self {
        Self {
            id: principal.id,
            role: principal.role,
            accessible_targets: &principal.accessible_users,
        }
    }

    fn can_reach(&self, target: PrincipalId) -> bool {
        self.accessible_targets.contains(&target)
    }
}

/// Which principals an actor may list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    All,
    Only(Vec<PrincipalId>),
}

/// Fields a moderator may set on an accessible target.
const MODERATOR_DELEGATED_FIELDS: &[PrincipalField] = &[PrincipalField::AvailableOrganizations];

fn self_edit_violation(field: PrincipalField) -> Option<String> {
    let message = match field {
        PrincipalField::Role => "role: you cannot change your own role",
        PrincipalField::Username => "username: you cannot change your own username",
        PrincipalField::Password => {
            "password: use the change-password endpoint to change your own password"
        }
        PrincipalField::ResetPassword => "reset_password: you cannot reset your own password",
        PrincipalField::AvailableOrganizations => {
            "available_organizations: you cannot change your own organizations"
        }
        PrincipalField::AccessibleUsers => {
            "accessible_users: only an administrator can assign accessible users"
        }
        _ => return None,
    };
    Some(message.to_string())
}

fn reject_fields(request: &UpdatePrincipalRequest, denied: &[PrincipalField]) -> Result<()> {
    let violations: Vec<String> = request
        .present_fields()
        .into_iter()
        .filter(|field| denied.contains(field))
        .filter_map(self_edit_violation)
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(Error::forbidden_fields(
            format!("You cannot change these fields: {}", violations.join("; ")),
            violations,
        ))
    }
}

/// Decide which part of `request` the actor may apply to `target`.
///
/// Returns the permitted subset, or a forbidden error when the actor may not touch the
/// target at all or submitted a field it may never set.
pub fn authorize_update(
    actor: &Actor<'_>,
    target: PrincipalId,
    request: UpdatePrincipalRequest,
) -> Result<UpdatePrincipalRequest> {
    let editing_self = actor.id == target;

    match (actor.role, editing_self) {
        (Role::Admin, _) => Ok(request),
        (Role::Moderator, true) => {
            reject_fields(
                &request,
                &[
                    PrincipalField::Role,
                    PrincipalField::Username,
                    PrincipalField::Password,
                    PrincipalField::ResetPassword,
                    PrincipalField::AccessibleUsers,
                ],
            )?;
            Ok(request)
        }
        (Role::Moderator, false) => {
            if !actor.can_reach(target) {
                return Err(Error::forbidden("You do not have access to this user"));
            }
            if request.role == Some(Role::Admin) {
                return Err(Error::forbidden("Moderators cannot assign the admin role"));
            }
            Ok(request.retain(MODERATOR_DELEGATED_FIELDS))
        }
        (Role::Standard, true) => {
            reject_fields(
                &request,
                &[
                    PrincipalField::Role,
                    PrincipalField::Username,
                    PrincipalField::Password,
                    PrincipalField::ResetPassword,
                    PrincipalField::AvailableOrganizations,
                    PrincipalField::AccessibleUsers,
                ],
            )?;
            Ok(request)
        }
        (Role::Standard, false) => Err(Error::forbidden("You can only edit your own profile")),
    }
}

/// Which principals the actor may list.
pub fn list_visibility(actor: &Actor<'_>) -> Result<Visibility> {
    match actor.role {
        Role::Admin => Ok(Visibility::All),
        Role::Moderator => Ok(Visibility::Only(actor.accessible_targets.to_vec())),
        Role::Standard => Err(Error::forbidden("You are not allowed to list users")),
    }
}

/// Whether the actor may read `target`.
pub fn can_view(actor: &Actor<'_>, target: PrincipalId) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Moderator => actor.id == target || actor.can_reach(target),
        Role::Standard => actor.id == target,
    }
}

/// Creating and deleting principals is reserved to administrators.
pub fn require_admin(actor: &Actor<'_>, action: &str) -> Result<()> {
    if actor.role == Role::Admin {
        Ok(())
    } else {
        Err(Error::forbidden(format!("Only administrators can {}", action)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrganizationId;

    const MODERATOR_ID: PrincipalId = PrincipalId::new(7);
    const ACCESSIBLE: [PrincipalId; 1] = [PrincipalId::new(11)];

    fn moderator() -> Actor<'static> {
        Actor { id: MODERATOR_ID, role: Role::Moderator, accessible_targets: &ACCESSIBLE }
    }

    fn actor(id: i64, role: Role) -> Actor<'static> {
        Actor { id: PrincipalId::new(id), role, accessible_targets: &[] }
    }

    fn request(json: &str) -> UpdatePrincipalRequest {
        serde_json::from_str(json).unwrap()
    }

    fn violations(err: Error) -> Vec<String> {
        match err {
            Error::Forbidden { violations, .. } => violations,
            other => panic!("expected forbidden, got {other:?}"),
        }
    }

    #[test]
    fn admin_keeps_every_field_on_any_target() {
        let admin = actor(1, Role::Admin);
        let body = request(r#"{"role": "moderator", "username": "x1y", "full_name": "N"}"#);

        assert_eq!(authorize_update(&admin, PrincipalId::new(9), body.clone()).unwrap(), body);
        assert_eq!(authorize_update(&admin, admin.id, body.clone()).unwrap(), body);
    }

    #[test]
    fn moderator_on_inaccessible_target_is_rejected_before_fields() {
        let err =
            authorize_update(&moderator(), PrincipalId::new(12), request("{}")).unwrap_err();
        assert!(matches!(err, Error::Forbidden { .. }));
    }

    #[test]
    fn moderator_on_accessible_target_keeps_only_organizations() {
        let body = request(
            r#"{"full_name": "New", "available_organizations": [5], "role": "moderator"}"#,
        );

        let permitted = authorize_update(&moderator(), PrincipalId::new(11), body).unwrap();
        assert_eq!(permitted.present_fields(), vec![PrincipalField::AvailableOrganizations]);
        assert_eq!(permitted.available_organizations, Some(vec![OrganizationId::new(5)]));
    }

    #[test]
    fn moderator_cannot_grant_admin_even_on_accessible_target() {
        let err = authorize_update(&moderator(), PrincipalId::new(11), request(r#"{"role": "admin"}"#))
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden { .. }));
    }

    #[test]
    fn moderator_self_edit_reports_each_denied_field() {
        let body = request(r#"{"role": "admin", "username": "mod7", "password": "x", "comment": "hi"}"#);
        let found = violations(authorize_update(&moderator(), MODERATOR_ID, body).unwrap_err());

        assert_eq!(found.len(), 3);
        assert!(found[0].starts_with("username"));
        assert!(found[1].starts_with("password"));
        assert!(found[2].starts_with("role"));
    }

    #[test]
    fn moderator_self_edit_passes_other_fields() {
        let body = request(r#"{"comment": "hi", "available_organizations": [1]}"#);
        let permitted = authorize_update(&moderator(), MODERATOR_ID, body.clone()).unwrap();
        assert_eq!(permitted, body);
    }

    #[test]
    fn standard_self_edit_rejects_organizations() {
        let me = actor(3, Role::Standard);
        let found = violations(
            authorize_update(&me, me.id, request(r#"{"available_organizations": []}"#)).unwrap_err(),
        );
        assert_eq!(found.len(), 1);
        assert!(found[0].starts_with("available_organizations"));

        let body = request(r#"{"full_name": "Me", "phones": ["+77011234567"]}"#);
        assert_eq!(authorize_update(&me, me.id, body.clone()).unwrap(), body);
    }

    #[test]
    fn self_edit_never_extends_accessible_users() {
        let body = request(r#"{"accessible_users": [12, 13], "comment": "hi"}"#);

        let found =
            violations(authorize_update(&moderator(), MODERATOR_ID, body.clone()).unwrap_err());
        assert_eq!(found.len(), 1);
        assert!(found[0].starts_with("accessible_users"));

        let me = actor(3, Role::Standard);
        let found = violations(authorize_update(&me, me.id, body).unwrap_err());
        assert_eq!(found.len(), 1);
        assert!(found[0].starts_with("accessible_users"));
    }

    #[test]
    fn standard_cannot_touch_others() {
        let me = actor(3, Role::Standard);
        let err = authorize_update(&me, PrincipalId::new(4), request("{}")).unwrap_err();
        assert!(matches!(err, Error::Forbidden { .. }));
    }

    #[test]
    fn listing_follows_role_tiers() {
        assert_eq!(list_visibility(&actor(1, Role::Admin)).unwrap(), Visibility::All);
        assert_eq!(
            list_visibility(&moderator()).unwrap(),
            Visibility::Only(vec![PrincipalId::new(11)])
        );
        assert!(list_visibility(&actor(3, Role::Standard)).is_err());
    }

    #[test]
    fn viewing_follows_role_tiers() {
        assert!(can_view(&actor(1, Role::Admin), PrincipalId::new(50)));
        assert!(can_view(&moderator(), PrincipalId::new(11)));
        assert!(can_view(&moderator(), MODERATOR_ID));
        assert!(!can_view(&moderator(), PrincipalId::new(12)));
        assert!(can_view(&actor(3, Role::Standard), PrincipalId::new(3)));
        assert!(!can_view(&actor(3, Role::Standard), PrincipalId::new(4)));
    }

    #[test]
    fn only_admins_manage_principals() {
        assert!(require_admin(&actor(1, Role::Admin), "create users").is_ok());
        assert!(require_admin(&moderator(), "create users").is_err());
    }
}
