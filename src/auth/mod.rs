//! Authentication and authorization module entry point.
//!
//! Token codec, Session Guard, Access Policy, Credential Store and the reset-token
//! lifecycle, plus the axum middleware and background tasks built on them.

pub mod cleanup_service;
pub mod credential_store;
mod hashing;
pub mod jwt;
pub mod login_service;
pub mod middleware;
pub mod models;
pub mod password_reset;
pub mod policy;
pub mod presence;
pub mod principal;
pub mod session_guard;
pub mod user_validation;

pub use cleanup_service::{CleanupService, SweepReport};
pub use credential_store::{plan_mutation, CredentialStore, MutationEffects};
pub use jwt::{Claims, TokenCodec};
pub use login_service::{LoginOutcome, LoginService};
pub use models::{AuthError, AuthenticatedPrincipal, Role};
pub use password_reset::{PasswordResetService, FORGOT_PASSWORD_MESSAGE};
pub use policy::{authorize_update, Actor, Visibility};
pub use presence::{spawn_presence_worker, PresenceTracker};
pub use principal::{Principal, PrincipalField, UpdatePrincipalRequest};
pub use session_guard::SessionGuard;
