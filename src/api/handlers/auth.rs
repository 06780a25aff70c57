//! Login, session and credential self-service endpoints.

use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use tracing::instrument;

use crate::api::error::ApiError;
use crate::api::routes::ApiState;
use crate::auth::models::AuthenticatedPrincipal;
use crate::auth::principal::{
    ChangePasswordRequest, ChangePasswordResponse, ForgotPasswordRequest, LoginRequest,
    LoginResponse, MessageResponse, PrincipalResponse, ResetPasswordRequest,
    ValidateResetTokenRequest, ValidateResetTokenResponse,
};

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid username or password"),
        (status = 403, description = "Account is blocked")
    ),
    tag = "auth"
)]
#[instrument(skip(state, payload))]
pub async fn login_handler(
    State(state): State<ApiState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(payload) = payload?;
    let outcome = state.login.login(&payload).await?;

    let require_password_change = outcome.principal.require_password_change;
    Ok(Json(LoginResponse {
        user: outcome.principal.into(),
        token: outcome.token,
        require_password_change,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current principal", body = PrincipalResponse),
        (status = 401, description = "Not authenticated or session revoked")
    ),
    security(("bearerAuth" = [])),
    tag = "auth"
)]
pub async fn me_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthenticatedPrincipal>,
) -> Result<Json<PrincipalResponse>, ApiError> {
    let principal = state.store.get(context.id).await?;
    Ok(Json(principal.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse)
    ),
    security(("bearerAuth" = [])),
    tag = "auth"
)]
#[instrument(skip(state), fields(principal_id = %context.id))]
pub async fn logout_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthenticatedPrincipal>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.login.logout(context.id).await?;
    Ok(Json(MessageResponse::new("Logged out successfully")))
}

/// Change the caller's own password.
///
/// Every other session of the caller is revoked; the returned token carries the new
/// epoch so the calling session continues.
#[utoipa::path(
    post,
    path = "/api/v1/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = ChangePasswordResponse),
        (status = 400, description = "Password rejected"),
        (status = 403, description = "Password change disabled for this account")
    ),
    security(("bearerAuth" = [])),
    tag = "auth"
)]
#[instrument(skip(state, payload), fields(principal_id = %context.id))]
pub async fn change_password_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthenticatedPrincipal>,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<ChangePasswordResponse>, ApiError> {
    let Json(payload) = payload?;
    let updated = state
        .store
        .change_credential(
            context.id,
            &payload.old_password,
            &payload.new_password,
            &payload.confirm_password,
        )
        .await?;
    let token = state.login.issue(&updated)?;

    Ok(Json(ChangePasswordResponse { message: "Password changed successfully".into(), token }))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Identical response whether or not the account exists", body = MessageResponse)
    ),
    tag = "auth"
)]
#[instrument(skip(state, payload))]
pub async fn forgot_password_handler(
    State(state): State<ApiState>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(payload) = payload?;
    let message = state.password_reset.forgot_password(&payload.username_or_email).await?;
    Ok(Json(MessageResponse::new(message)))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 400, description = "Token invalid, used or expired, or password rejected")
    ),
    tag = "auth"
)]
#[instrument(skip(state, payload))]
pub async fn reset_password_handler(
    State(state): State<ApiState>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(payload) = payload?;
    state.password_reset.reset_password(&payload.token, &payload.new_password).await?;
    Ok(Json(MessageResponse::new("Password has been reset successfully")))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/reset-password/validate",
    request_body = ValidateResetTokenRequest,
    responses(
        (status = 200, description = "Whether the token can still be used", body = ValidateResetTokenResponse)
    ),
    tag = "auth"
)]
pub async fn validate_reset_token_handler(
    State(state): State<ApiState>,
    payload: Result<Json<ValidateResetTokenRequest>, JsonRejection>,
) -> Result<Json<ValidateResetTokenResponse>, ApiError> {
    let Json(payload) = payload?;
    let (valid, _) = state.password_reset.validate(&payload.token).await?;
    Ok(Json(ValidateResetTokenResponse { valid }))
}
