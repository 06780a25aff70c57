//! Axum middleware for the Session Guard and its role stage.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Extension, State},
    http::{header::AUTHORIZATION, Method, Request},
    middleware::Next,
    response::Response,
};
use tracing::{field, info_span, warn, Instrument};

use crate::api::error::ApiError;
use crate::auth::models::{AuthenticatedPrincipal, Role};
use crate::auth::session_guard::SessionGuard;

pub type SessionGuardState = Arc<SessionGuard>;
pub type RoleState = Arc<Vec<Role>>;

/// Authenticate the request and attach the [`AuthenticatedPrincipal`] as an extension.
pub async fn authenticate(
    State(guard): State<SessionGuardState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let correlation_id = uuid::Uuid::new_v4();
    let span = info_span!(
        "auth_middleware.authenticate",
        http.method = %request.method(),
        http.path = %request.uri().path(),
        principal_id = field::Empty,
        role = field::Empty,
        correlation_id = %correlation_id
    );

    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();

    match guard.authenticate(&header).instrument(span.clone()).await {
        Ok(principal) => {
            span.record("principal_id", field::display(principal.id));
            span.record("role", field::display(principal.role));
            request.extensions_mut().insert(principal);
            Ok(next.run(request).instrument(span).await)
        }
        Err(err) => {
            span.in_scope(|| {
                warn!(
                    %correlation_id,
                    error = %err,
                    force_logout = err.is_force_logout(),
                    "authentication failed"
                )
            });
            Err(ApiError::from(err))
        }
    }
}

/// Reject principals whose role is not in the allowed set.
pub async fn require_roles(
    State(allowed): State<RoleState>,
    Extension(principal): Extension<AuthenticatedPrincipal>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if let Err(err) = SessionGuard::authorize_roles(&principal, &allowed) {
        let allowed_summary =
            allowed.iter().map(Role::as_str).collect::<Vec<_>>().join(" ");
        warn!(
            principal_id = %principal.id,
            role = %principal.role,
            allowed = %allowed_summary,
            path = %request.uri().path(),
            "role check failed"
        );
        return Err(ApiError::from(err));
    }

    Ok(next.run(request).await)
}
