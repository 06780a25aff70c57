use axum::{extract::rejection::JsonRejection, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tracing::error;

use crate::auth::models::AuthError;
use crate::errors::{AuthErrorType, Error};

#[derive(Debug)]
pub enum ApiError {
    BadRequest { message: String, errors: Vec<String> },
    Conflict(String),
    NotFound(String),
    Unauthorized(String),
    Forbidden { message: String, errors: Vec<String> },
    /// Login refused because the account is deactivated.
    Blocked(String),
    /// The client must discard its session token.
    ForceLogout { status: StatusCode, reason: String, blocked: bool },
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden { .. } | ApiError::Blocked(_) => StatusCode::FORBIDDEN,
            ApiError::ForceLogout { status, .. } => *status,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn bad_request<S: Into<String>>(msg: S) -> Self {
        ApiError::BadRequest { message: msg.into(), errors: Vec::new() }
    }

    pub fn service_unavailable<S: Into<String>>(msg: S) -> Self {
        ApiError::ServiceUnavailable(msg.into())
    }

    pub fn unauthorized<S: Into<String>>(msg: S) -> Self {
        ApiError::Unauthorized(msg.into())
    }

    pub fn forbidden<S: Into<String>>(msg: S) -> Self {
        ApiError::Forbidden { message: msg.into(), errors: Vec::new() }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    force_logout: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    blocked: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<String>,
}

impl ErrorBody {
    fn new(error: &'static str, message: String) -> Self {
        Self { error, message, force_logout: false, reason: None, blocked: false, errors: Vec::new() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = match self {
            ApiError::BadRequest { message, errors } => {
                ErrorBody { errors, ..ErrorBody::new("bad_request", message) }
            }
            ApiError::Conflict(message) => ErrorBody::new("conflict", message),
            ApiError::NotFound(message) => ErrorBody::new("not_found", message),
            ApiError::Unauthorized(message) => ErrorBody::new("unauthorized", message),
            ApiError::Forbidden { message, errors } => {
                ErrorBody { errors, ..ErrorBody::new("forbidden", message) }
            }
            ApiError::Blocked(message) => {
                ErrorBody { blocked: true, ..ErrorBody::new("account_blocked", message) }
            }
            ApiError::ForceLogout { reason, blocked, .. } => ErrorBody {
                force_logout: true,
                reason: Some(reason.clone()),
                blocked,
                ..ErrorBody::new(if blocked { "account_blocked" } else { "session_revoked" }, reason)
            },
            ApiError::ServiceUnavailable(message) => ErrorBody::new("service_unavailable", message),
            ApiError::Internal(message) => ErrorBody::new("internal_error", message),
        };

        (status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        if err.is_internal() {
            error!(error = %err, source = ?std::error::Error::source(&err), "request failed");
            return ApiError::Internal("Internal server error".to_string());
        }

        match err {
            Error::Validation { message, details, .. } => {
                ApiError::BadRequest { message, errors: details }
            }
            Error::Serialization { context, .. } => ApiError::bad_request(context),
            Error::Auth { message, error_type } => match error_type {
                AuthErrorType::AccountBlocked => ApiError::Blocked(message),
                AuthErrorType::InsufficientPermissions => ApiError::forbidden(message),
                AuthErrorType::InvalidToken
                | AuthErrorType::MissingToken
                | AuthErrorType::InvalidCredentials => ApiError::Unauthorized(message),
            },
            Error::Forbidden { message, violations } => {
                ApiError::Forbidden { message, errors: violations }
            }
            Error::NotFound { resource_type, id } => {
                ApiError::NotFound(format!("{} '{}' not found", resource_type, id))
            }
            Error::Conflict { message, .. } => ApiError::Conflict(message),
            Error::Config { message, .. } | Error::Internal { message, .. } => {
                ApiError::Internal(message)
            }
            Error::Database { context, .. } | Error::Io { context, .. } => {
                ApiError::Internal(context)
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingBearer
            | AuthError::MalformedBearer
            | AuthError::InvalidToken
            | AuthError::PrincipalNotFound => ApiError::unauthorized(err.to_string()),
            AuthError::Blocked { reason } => {
                ApiError::ForceLogout { status: StatusCode::FORBIDDEN, reason, blocked: true }
            }
            AuthError::Revoked { reason } => {
                ApiError::ForceLogout { status: StatusCode::UNAUTHORIZED, reason, blocked: false }
            }
            AuthError::Forbidden => ApiError::forbidden("Forbidden: insufficient permissions"),
            AuthError::Persistence(inner) => {
                error!(error = %inner, "session lookup failed");
                ApiError::service_unavailable("auth service unavailable")
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}
