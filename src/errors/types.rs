//! # Error Types
//!
//! Error types shared by the credential store, access policy, reset-token lifecycle and
//! the HTTP layer.

use std::fmt;

/// Custom result type for Warden operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Warden
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Database and storage errors
    #[error("Database error: {context}")]
    Database {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// Validation errors, optionally with an itemized list of unmet rules
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        details: Vec<String>,
    },

    /// Authentication errors
    #[error("Authentication error: {message}")]
    Auth {
        message: String,
        error_type: AuthErrorType,
    },

    /// Authenticated, but not allowed to perform the operation
    #[error("Forbidden: {message}")]
    Forbidden {
        message: String,
        violations: Vec<String>,
    },

    /// Internal server errors
    #[error("Internal server error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Resource not found errors
    #[error("Resource not found: {resource_type} with ID '{id}'")]
    NotFound {
        resource_type: String,
        id: String,
    },

    /// Resource conflict errors (e.g., username already taken)
    #[error("Resource conflict: {message}")]
    Conflict {
        message: String,
        resource_type: String,
    },
}

/// Authentication error subtypes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthErrorType {
    InvalidToken,
    MissingToken,
    InvalidCredentials,
    AccountBlocked,
    InsufficientPermissions,
}

impl fmt::Display for AuthErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthErrorType::InvalidToken => write!(f, "invalid_token"),
            AuthErrorType::MissingToken => write!(f, "missing_token"),
            AuthErrorType::InvalidCredentials => write!(f, "invalid_credentials"),
            AuthErrorType::AccountBlocked => write!(f, "account_blocked"),
            AuthErrorType::InsufficientPermissions => write!(f, "insufficient_permissions"),
        }
    }
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None, details: Vec::new() }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()), details: Vec::new() }
    }

    /// Create a validation error carrying every unmet rule
    pub fn validation_details<S: Into<String>>(message: S, details: Vec<String>) -> Self {
        Self::Validation { message: message.into(), field: None, details }
    }

    /// Create an authentication error
    pub fn auth<S: Into<String>>(message: S, error_type: AuthErrorType) -> Self {
        Self::Auth { message: message.into(), error_type }
    }

    /// Create a forbidden error
    pub fn forbidden<S: Into<String>>(message: S) -> Self {
        Self::Forbidden { message: message.into(), violations: Vec::new() }
    }

    /// Create a forbidden error listing each rejected field
    pub fn forbidden_fields<S: Into<String>>(message: S, violations: Vec<String>) -> Self {
        Self::Forbidden { message: message.into(), violations }
    }

    /// Create an internal server error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.into() }
    }

    /// Create a conflict error
    pub fn conflict<M: Into<String>, R: Into<String>>(message: M, resource_type: R) -> Self {
        Self::Conflict { message: message.into(), resource_type: resource_type.into() }
    }

    /// Get the HTTP status code that should be returned for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 500,
            Error::Database { .. } => 500,
            Error::Io { .. } => 500,
            Error::Serialization { .. } => 400,
            Error::Validation { .. } => 400,
            Error::Auth { error_type, .. } => match error_type {
                AuthErrorType::AccountBlocked | AuthErrorType::InsufficientPermissions => 403,
                _ => 401,
            },
            Error::Forbidden { .. } => 403,
            Error::Internal { .. } => 500,
            Error::NotFound { .. } => 404,
            Error::Conflict { .. } => 409,
        }
    }

    /// Whether the failure came from storage or another infrastructure dependency
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Error::Config { .. } | Error::Database { .. } | Error::Io { .. } | Error::Internal { .. }
        )
    }
}

// Error conversions for common external error types
impl From<sqlx::Error> for Error {
    fn from(error: sqlx::Error) -> Self {
        Self::Database { source: error, context: "Database operation failed".to_string() }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, field_errors)| {
                field_errors.iter().map(move |e| {
                    let message =
                        e.message.as_ref().map_or_else(|| e.code.to_string(), |m| m.to_string());
                    format!("{}: {}", field, message)
                })
            })
            .collect();
        details.sort();

        Self::validation_details(format!("Validation failed: {}", details.join("; ")), details)
    }
}
