//! In-memory repositories
//!
//! Process-local implementations of the repository traits, used by tests and the
//! `--in-memory` development mode. Each operation runs under a single write lock, which
//! gives the same atomicity the SQL implementations get from single statements.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::auth::principal::{NewPrincipal, Principal, PrincipalChanges};
use crate::domain::{PrincipalId, ResetTokenId};
use crate::errors::{Error, Result};
use crate::storage::repositories::{
    AuditEvent, AuditLogRepository, ListParams, PrincipalRepository, ResetToken,
    ResetTokenRepository, SortField,
};

#[derive(Debug, Default)]
pub struct InMemoryPrincipalRepository {
    principals: RwLock<BTreeMap<PrincipalId, Principal>>,
    next_id: AtomicI64,
}

impl InMemoryPrincipalRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> PrincipalId {
        PrincipalId::new(self.next_id.fetch_add(1, AtomicOrdering::SeqCst) + 1)
    }
}

fn username_conflict() -> Error {
    Error::conflict("Username is already taken", "principal")
}

fn compare(a: &Principal, b: &Principal, sort: SortField, descending: bool) -> Ordering {
    let directed = |ordering: Ordering| if descending { ordering.reverse() } else { ordering };
    let primary = match sort {
        SortField::Id => directed(a.id.cmp(&b.id)),
        SortField::Username => directed(a.username.cmp(&b.username)),
        SortField::FullName => directed(a.full_name.cmp(&b.full_name)),
        SortField::Role => directed(a.role.as_str().cmp(b.role.as_str())),
        SortField::CreatedAt => directed(a.created_at.cmp(&b.created_at)),
        SortField::IsOnline => directed(a.is_online.cmp(&b.is_online)),
        // NULLS LAST in both directions
        SortField::LastSeen => match (a.last_seen, b.last_seen) {
            (Some(x), Some(y)) => directed(x.cmp(&y)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    };
    primary.then(a.id.cmp(&b.id))
}

fn apply_changes(principal: &mut Principal, changes: PrincipalChanges) {
    macro_rules! set {
        ($($field:ident),* $(,)?) => {
            $(if let Some(value) = changes.$field {
                principal.$field = value;
            })*
        };
    }

    set!(
        username,
        full_name,
        role,
        password_hash,
        is_first_login,
        require_password_change,
        disable_password_change,
        show_in_selection,
        accessible_users,
        available_organizations,
        emails,
        phones,
        avatar_url,
        position,
        department,
        comment,
        timezone,
        is_active,
        blocked_reason,
        blocked_at,
        blocked_by,
    );

    if changes.bump_epoch {
        principal.token_version += 1;
    }
}

#[async_trait]
impl PrincipalRepository for InMemoryPrincipalRepository {
    async fn create(&self, new: NewPrincipal) -> Result<Principal> {
        let mut principals = self.principals.write().await;
        if principals.values().any(|p| p.username == new.username) {
            return Err(username_conflict());
        }

        let now = Utc::now();
        let principal = Principal {
            id: self.allocate_id(),
            username: new.username,
            full_name: new.full_name,
            role: new.role,
            password_hash: new.password_hash,
            is_first_login: true,
            require_password_change: new.require_password_change,
            disable_password_change: new.disable_password_change,
            show_in_selection: new.show_in_selection,
            accessible_users: new.accessible_users,
            available_organizations: new.available_organizations,
            emails: new.emails,
            phones: new.phones,
            avatar_url: new.avatar_url,
            position: new.position,
            department: new.department,
            comment: new.comment,
            timezone: new.timezone,
            is_active: true,
            token_version: 1,
            blocked_reason: None,
            blocked_at: None,
            blocked_by: None,
            is_online: false,
            last_seen: None,
            created_by: new.created_by,
            updated_by: new.created_by,
            created_at: now,
            updated_at: now,
        };

        principals.insert(principal.id, principal.clone());
        Ok(principal)
    }

    async fn get(&self, id: PrincipalId) -> Result<Option<Principal>> {
        Ok(self.principals.read().await.get(&id).cloned())
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<Principal>> {
        Ok(self.principals.read().await.values().find(|p| p.username == username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>> {
        let email = email.trim();
        Ok(self
            .principals
            .read()
            .await
            .values()
            .find(|p| p.emails.iter().any(|e| e.eq_ignore_ascii_case(email)))
            .cloned())
    }

    async fn update(
        &self,
        id: PrincipalId,
        changes: PrincipalChanges,
        actor: Option<PrincipalId>,
    ) -> Result<Option<Principal>> {
        let mut principals = self.principals.write().await;

        if let Some(username) = &changes.username {
            if principals.values().any(|p| p.id != id && &p.username == username) {
                return Err(username_conflict());
            }
        }

        let Some(principal) = principals.get_mut(&id) else {
            return Ok(None);
        };

        apply_changes(principal, changes);
        principal.updated_by = actor;
        principal.updated_at = Utc::now();
        Ok(Some(principal.clone()))
    }

    async fn set_password(
        &self,
        id: PrincipalId,
        password_hash: String,
    ) -> Result<Option<Principal>> {
        let mut principals = self.principals.write().await;
        let Some(principal) = principals.get_mut(&id) else {
            return Ok(None);
        };

        principal.password_hash = Some(password_hash);
        principal.is_first_login = false;
        principal.require_password_change = false;
        principal.token_version += 1;
        principal.updated_by = Some(id);
        principal.updated_at = Utc::now();
        Ok(Some(principal.clone()))
    }

    async fn mark_active(&self, id: PrincipalId) -> Result<()> {
        if let Some(principal) = self.principals.write().await.get_mut(&id) {
            principal.is_online = true;
            principal.last_seen = Some(Utc::now());
        }
        Ok(())
    }

    async fn mark_offline(&self, id: PrincipalId) -> Result<()> {
        if let Some(principal) = self.principals.write().await.get_mut(&id) {
            principal.is_online = false;
        }
        Ok(())
    }

    async fn mark_idle_offline(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut swept = 0;
        for principal in self.principals.write().await.values_mut() {
            let idle = principal.last_seen.map_or(true, |seen| seen < cutoff);
            if principal.is_online && idle {
                principal.is_online = false;
                swept += 1;
            }
        }
        Ok(swept)
    }

    async fn list(&self, params: &ListParams) -> Result<(Vec<Principal>, i64)> {
        let principals = self.principals.read().await;
        let mut matching: Vec<&Principal> = principals
            .values()
            .filter(|p| params.only.as_ref().map_or(true, |only| only.contains(&p.id)))
            .collect();
        matching.sort_by(|a, b| compare(a, b, params.sort, params.descending));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(usize::try_from(params.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(params.page_size).unwrap_or(0))
            .cloned()
            .collect();

        Ok((page, total))
    }

    async fn delete(&self, id: PrincipalId) -> Result<bool> {
        Ok(self.principals.write().await.remove(&id).is_some())
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.principals.read().await.len() as i64)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryResetTokenRepository {
    tokens: RwLock<Vec<ResetToken>>,
    next_id: AtomicI64,
}

impl InMemoryResetTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResetTokenRepository for InMemoryResetTokenRepository {
    async fn create(
        &self,
        principal_id: PrincipalId,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<ResetToken> {
        let mut tokens = self.tokens.write().await;
        if tokens.iter().any(|t| t.token == token) {
            return Err(Error::conflict("Reset token already exists", "reset_token"));
        }

        let record = ResetToken {
            id: ResetTokenId::new(self.next_id.fetch_add(1, AtomicOrdering::SeqCst) + 1),
            principal_id,
            token: token.to_string(),
            expires_at,
            used: false,
            used_at: None,
            created_at: Utc::now(),
        };
        tokens.push(record.clone());
        Ok(record)
    }

    async fn find(&self, token: &str) -> Result<Option<ResetToken>> {
        Ok(self.tokens.read().await.iter().find(|t| t.token == token).cloned())
    }

    async fn consume(&self, token: &str) -> Result<Option<PrincipalId>> {
        let now = Utc::now();
        let mut tokens = self.tokens.write().await;
        let Some(record) = tokens.iter_mut().find(|t| t.token == token && t.is_usable(now))
        else {
            return Ok(None);
        };

        record.used = true;
        record.used_at = Some(now);
        Ok(Some(record.principal_id))
    }

    async fn invalidate_all(&self, principal_id: PrincipalId) -> Result<u64> {
        let now = Utc::now();
        let mut invalidated = 0;
        for record in self.tokens.write().await.iter_mut() {
            if record.principal_id == principal_id && !record.used {
                record.used = true;
                record.used_at = Some(now);
                invalidated += 1;
            }
        }
        Ok(invalidated)
    }

    async fn purge(&self, used_before: DateTime<Utc>) -> Result<u64> {
        let now = Utc::now();
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|t| {
            let expired = t.expires_at < now;
            let stale = t.used && t.used_at.is_some_and(|at| at < used_before);
            !(expired || stale)
        });
        Ok((before - tokens.len()) as u64)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAuditLogRepository {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded event, oldest first.
    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }

    /// Recorded action names, oldest first.
    pub async fn actions(&self) -> Vec<String> {
        self.events.lock().await.iter().map(|e| e.action.clone()).collect()
    }
}

#[async_trait]
impl AuditLogRepository for InMemoryAuditLogRepository {
    async fn record(&self, event: AuditEvent) -> Result<()> {
        self.events.lock().await.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::Role;
    use chrono::Duration;

    fn new_principal(username: &str) -> NewPrincipal {
        NewPrincipal {
            username: username.to_string(),
            full_name: format!("{} name", username),
            role: Role::Standard,
            password_hash: None,
            require_password_change: false,
            disable_password_change: false,
            show_in_selection: true,
            accessible_users: Vec::new(),
            available_organizations: Vec::new(),
            emails: vec![format!("{}@example.org", username)],
            phones: Vec::new(),
            avatar_url: None,
            position: None,
            department: None,
            comment: None,
            timezone: None,
            created_by: None,
        }
    }

    #[tokio::test]
    async fn create_assigns_ids_and_rejects_duplicate_usernames() {
        let repo = InMemoryPrincipalRepository::new();
        let first = repo.create(new_principal("alice")).await.unwrap();
        let second = repo.create(new_principal("bob")).await.unwrap();

        assert_eq!(first.id, PrincipalId::new(1));
        assert_eq!(second.id, PrincipalId::new(2));
        assert!(first.is_first_login);
        assert_eq!(first.token_version, 1);

        let err = repo.create(new_principal("alice")).await.unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[tokio::test]
    async fn update_bumps_epoch_only_when_asked() {
        let repo = InMemoryPrincipalRepository::new();
        let principal = repo.create(new_principal("carol")).await.unwrap();

        let changes =
            PrincipalChanges { comment: Some(Some("note".into())), ..Default::default() };
        let updated = repo.update(principal.id, changes, None).await.unwrap().unwrap();
        assert_eq!(updated.token_version, 1);
        assert_eq!(updated.comment.as_deref(), Some("note"));

        let changes =
            PrincipalChanges { role: Some(Role::Moderator), bump_epoch: true, ..Default::default() };
        let updated = repo.update(principal.id, changes, None).await.unwrap().unwrap();
        assert_eq!(updated.token_version, 2);
    }

    #[tokio::test]
    async fn update_rejects_username_collision() {
        let repo = InMemoryPrincipalRepository::new();
        repo.create(new_principal("dave")).await.unwrap();
        let erin = repo.create(new_principal("erin")).await.unwrap();

        let changes = PrincipalChanges { username: Some("dave".into()), ..Default::default() };
        let err = repo.update(erin.id, changes, None).await.unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[tokio::test]
    async fn find_by_email_ignores_case() {
        let repo = InMemoryPrincipalRepository::new();
        let frank = repo.create(new_principal("frank")).await.unwrap();

        let found = repo.find_by_email(" FRANK@example.org ").await.unwrap();
        assert_eq!(found.map(|p| p.id), Some(frank.id));
    }

    #[tokio::test]
    async fn idle_sweep_leaves_recent_principals_present() {
        let repo = InMemoryPrincipalRepository::new();
        let idle = repo.create(new_principal("idle")).await.unwrap();
        let recent = repo.create(new_principal("recent")).await.unwrap();
        repo.mark_active(idle.id).await.unwrap();
        repo.mark_active(recent.id).await.unwrap();

        let swept = repo.mark_idle_offline(Utc::now() - Duration::minutes(10)).await.unwrap();
        assert_eq!(swept, 0);

        let swept = repo.mark_idle_offline(Utc::now() + Duration::seconds(1)).await.unwrap();
        assert_eq!(swept, 2);
        assert!(!repo.get(idle.id).await.unwrap().unwrap().is_online);
    }

    #[tokio::test]
    async fn list_filters_sorts_and_pages() {
        let repo = InMemoryPrincipalRepository::new();
        for name in ["mike", "anna", "zoe", "bert"] {
            repo.create(new_principal(name)).await.unwrap();
        }

        let params = ListParams { page_size: 2, sort: SortField::Username, ..Default::default() };
        let (page, total) = repo.list(&params).await.unwrap();
        assert_eq!(total, 4);
        let names: Vec<_> = page.iter().map(|p| p.username.as_str()).collect();
        assert_eq!(names, vec!["anna", "bert"]);

        let params = ListParams {
            sort: SortField::Username,
            descending: true,
            ..Default::default()
        }
        .restricted_to(vec![PrincipalId::new(1), PrincipalId::new(3)]);
        let (page, total) = repo.list(&params).await.unwrap();
        assert_eq!(total, 2);
        let names: Vec<_> = page.iter().map(|p| p.username.as_str()).collect();
        assert_eq!(names, vec!["zoe", "mike"]);
    }

    #[tokio::test]
    async fn reset_token_consumes_once_and_bulk_invalidates() {
        let repo = InMemoryResetTokenRepository::new();
        let owner = PrincipalId::new(4);
        let expires = Utc::now() + Duration::hours(1);
        repo.create(owner, "first", expires).await.unwrap();
        repo.create(owner, "second", expires).await.unwrap();

        assert_eq!(repo.consume("first").await.unwrap(), Some(owner));
        assert_eq!(repo.consume("first").await.unwrap(), None);

        assert_eq!(repo.invalidate_all(owner).await.unwrap(), 1);
        assert_eq!(repo.consume("second").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_reset_token_cannot_be_consumed_and_is_purged() {
        let repo = InMemoryResetTokenRepository::new();
        repo.create(PrincipalId::new(1), "old", Utc::now() - Duration::minutes(1)).await.unwrap();

        assert_eq!(repo.consume("old").await.unwrap(), None);
        assert_eq!(repo.purge(Utc::now() - Duration::days(7)).await.unwrap(), 1);
        assert!(repo.find("old").await.unwrap().is_none());
    }
}
