use axum::{routing::get, Json, Router};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::handlers::health::health_handler,
        crate::api::handlers::auth::login_handler,
        crate::api::handlers::auth::me_handler,
        crate::api::handlers::auth::logout_handler,
        crate::api::handlers::auth::change_password_handler,
        crate::api::handlers::auth::forgot_password_handler,
        crate::api::handlers::auth::reset_password_handler,
        crate::api::handlers::auth::validate_reset_token_handler,
        crate::api::handlers::principals::list_principals_handler,
        crate::api::handlers::principals::get_principal_handler,
        crate::api::handlers::principals::create_principal_handler,
        crate::api::handlers::principals::update_principal_handler,
        crate::api::handlers::principals::delete_principal_handler
    ),
    components(
        schemas(
            crate::api::handlers::health::HealthResponse,
            crate::storage::PoolStats,
            crate::auth::models::Role,
            crate::auth::principal::LoginRequest,
            crate::auth::principal::LoginResponse,
            crate::auth::principal::ChangePasswordRequest,
            crate::auth::principal::ChangePasswordResponse,
            crate::auth::principal::ForgotPasswordRequest,
            crate::auth::principal::ResetPasswordRequest,
            crate::auth::principal::ValidateResetTokenRequest,
            crate::auth::principal::ValidateResetTokenResponse,
            crate::auth::principal::MessageResponse,
            crate::auth::principal::CreatePrincipalRequest,
            crate::auth::principal::UpdatePrincipalRequest,
            crate::auth::principal::PrincipalResponse,
            crate::auth::principal::PrincipalListResponse
        )
    ),
    tags(
        (name = "health", description = "Liveness and database reachability"),
        (name = "auth", description = "Login, logout and credential self-service"),
        (name = "principals", description = "Principal management under the Access Policy")
    ),
    security(
        ("bearerAuth" = [])
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(
                HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build(),
            ),
        );
    }
}

pub fn docs_router() -> Router {
    Router::new().route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_includes_all_endpoints() {
        let openapi = ApiDoc::openapi();
        let paths = &openapi.paths.paths;

        for path in [
            "/health",
            "/api/v1/auth/login",
            "/api/v1/auth/me",
            "/api/v1/auth/logout",
            "/api/v1/auth/change-password",
            "/api/v1/auth/forgot-password",
            "/api/v1/auth/reset-password",
            "/api/v1/auth/reset-password/validate",
            "/api/v1/principals",
            "/api/v1/principals/{id}",
        ] {
            assert!(paths.contains_key(path), "Missing {path}");
        }
    }

    #[test]
    fn openapi_declares_bearer_scheme() {
        let openapi = ApiDoc::openapi();
        let components = openapi.components.expect("components");
        assert!(components.security_schemes.contains_key("bearerAuth"));
        assert!(components.schemas.contains_key("UpdatePrincipalRequest"));
    }
}
