use std::sync::Arc;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    set_header::SetResponseHeaderLayer,
};
use tracing::warn;

use crate::auth::{
    middleware::{authenticate, require_roles, RoleState},
    CredentialStore, LoginService, PasswordResetService, PresenceTracker, Role, SessionGuard,
    TokenCodec,
};
use crate::config::{AuthConfig, ServerConfig};
use crate::notify::Notifier;
use crate::observability::trace_http_requests;
use crate::storage::{DbPool, Repositories};

use super::{
    docs,
    handlers::{auth, health, principals},
};

/// Shared services handed to every handler.
#[derive(Clone, Debug)]
pub struct ApiState {
    pub store: CredentialStore,
    pub login: LoginService,
    pub password_reset: PasswordResetService,
    pub guard: Arc<SessionGuard>,
    /// Absent when running on in-memory repositories.
    pub pool: Option<DbPool>,
}

impl ApiState {
    pub fn new(
        repositories: &Repositories,
        codec: Arc<TokenCodec>,
        presence: PresenceTracker,
        notifier: Arc<dyn Notifier>,
        auth_config: &AuthConfig,
        pool: Option<DbPool>,
    ) -> Self {
        let store =
            CredentialStore::new(repositories.principals.clone(), repositories.audit.clone());
        let login = LoginService::new(store.clone(), codec.clone());
        let password_reset = PasswordResetService::new(
            store.clone(),
            repositories.reset_tokens.clone(),
            notifier,
            chrono::Duration::hours(auth_config.reset_token_ttl_hours),
            auth_config.reset_url_base.clone(),
        );
        let guard = Arc::new(SessionGuard::new(codec, repositories.principals.clone(), presence));

        Self { store, login, password_reset, guard, pool }
    }
}

const SECURITY_HEADERS: &[(&str, &str)] = &[
    ("x-frame-options", "DENY"),
    ("x-content-type-options", "nosniff"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    ("content-security-policy", "default-src 'self'; frame-ancestors 'none'"),
];

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

pub fn build_router(state: ApiState, server: &ServerConfig) -> Router {
    let auth_layer = middleware::from_fn_with_state(state.guard.clone(), authenticate);

    let role_layer = |roles: Vec<Role>| {
        let allowed: RoleState = Arc::new(roles);
        middleware::from_fn_with_state(allowed, require_roles)
    };

    let secured_api = Router::new()
        .route("/api/v1/auth/me", get(auth::me_handler))
        .route("/api/v1/auth/logout", post(auth::logout_handler))
        .route("/api/v1/auth/change-password", post(auth::change_password_handler))
        .route(
            "/api/v1/principals/{id}",
            get(principals::get_principal_handler).patch(principals::update_principal_handler),
        )
        .merge(
            Router::new()
                .route("/api/v1/principals", get(principals::list_principals_handler))
                .route_layer(role_layer(vec![Role::Admin, Role::Moderator])),
        )
        .merge(
            Router::new()
                .route("/api/v1/principals", post(principals::create_principal_handler))
                .route(
                    "/api/v1/principals/{id}",
                    axum::routing::delete(principals::delete_principal_handler),
                )
                .route_layer(role_layer(vec![Role::Admin])),
        )
        .route_layer(auth_layer);

    let public_api = Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/auth/login", post(auth::login_handler))
        .route("/api/v1/auth/forgot-password", post(auth::forgot_password_handler))
        .route("/api/v1/auth/reset-password", post(auth::reset_password_handler))
        .route("/api/v1/auth/reset-password/validate", post(auth::validate_reset_token_handler));

    let mut router = Router::new()
        .merge(secured_api)
        .merge(public_api)
        .with_state(state)
        .merge(docs::docs_router());

    for &(name, value) in SECURITY_HEADERS {
        router = router.layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        ));
    }

    router.layer(cors_layer(server)).layer(middleware::from_fn(trace_http_requests))
}
