//! Validation helpers for principal-related requests.

use std::borrow::Cow;

use lazy_static::lazy_static;
use regex::Regex;
use validator::{Validate, ValidationError, ValidationErrors};

use super::principal::{CreatePrincipalRequest, UpdatePrincipalRequest};
use crate::errors::{Error, Result};

lazy_static! {
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$")
            .expect("EMAIL_REGEX should be a valid regex pattern");

    static ref PHONE_REGEX: Regex =
        Regex::new(r"^\+?[1-9]\d{9,14}$").expect("PHONE_REGEX should be a valid regex pattern");

    static ref PHONE_NOISE_REGEX: Regex =
        Regex::new(r"[^\d+]").expect("PHONE_NOISE_REGEX should be a valid regex pattern");

    static ref USERNAME_REGEX: Regex =
        Regex::new(r"^[a-zA-Z0-9._-]+$").expect("USERNAME_REGEX should be a valid regex pattern");
}

/// Minimum password length requirement
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum password length to prevent DoS
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Punctuation accepted as the required special character.
pub const PASSWORD_SPECIAL_CHARS: &str = "!@#$%^&*()_+-=[]{}|;:'\",.<>?/\\`~";

const MIN_USERNAME_LENGTH: usize = 3;
const MAX_USERNAME_LENGTH: usize = 50;

/// Every strength rule the password fails, in a stable order.
pub fn password_violations(password: &str) -> Vec<&'static str> {
    let mut violations = Vec::new();
    let length = password.chars().count();

    if length < MIN_PASSWORD_LENGTH {
        violations.push("Password must be at least 8 characters long");
    }
    if length > MAX_PASSWORD_LENGTH {
        violations.push("Password must not exceed 128 characters");
    }
    if !password.chars().any(char::is_uppercase) {
        violations.push("Password must contain at least one uppercase letter");
    }
    if !password.chars().any(char::is_lowercase) {
        violations.push("Password must contain at least one lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        violations.push("Password must contain at least one digit");
    }
    if !password.chars().any(|c| PASSWORD_SPECIAL_CHARS.contains(c)) {
        violations.push("Password must contain at least one special character (!@#$%^&* etc.)");
    }

    violations
}

/// Enforce the password strength policy, reporting every unmet rule.
pub fn validate_password(password: &str) -> Result<()> {
    let violations = password_violations(password);
    if violations.is_empty() {
        return Ok(());
    }

    Err(Error::validation_details(
        "Password does not meet security requirements",
        violations.into_iter().map(str::to_string).collect(),
    ))
}

/// Validate email format
pub fn validate_email(email: &str) -> std::result::Result<(), ValidationError> {
    if EMAIL_REGEX.is_match(email.trim()) {
        Ok(())
    } else {
        Err(with_message("invalid_email", format!("Invalid email address: {}", email)))
    }
}

/// Validate phone format. Spaces, dashes and brackets are ignored.
pub fn validate_phone(phone: &str) -> std::result::Result<(), ValidationError> {
    let cleaned = PHONE_NOISE_REGEX.replace_all(phone, "");
    if PHONE_REGEX.is_match(&cleaned) {
        Ok(())
    } else {
        Err(with_message("invalid_phone", format!("Invalid phone number: {}", phone)))
    }
}

/// Validate username length and character set
pub fn validate_username(username: &str) -> std::result::Result<(), ValidationError> {
    let length = username.chars().count();
    if length < MIN_USERNAME_LENGTH {
        return Err(with_message(
            "username_too_short",
            "Username must be at least 3 characters long".to_string(),
        ));
    }
    if length > MAX_USERNAME_LENGTH {
        return Err(with_message(
            "username_too_long",
            "Username must not exceed 50 characters".to_string(),
        ));
    }
    if !USERNAME_REGEX.is_match(username) {
        return Err(with_message(
            "username_invalid_chars",
            "Username may only contain latin letters, digits, dots, dashes and underscores"
                .to_string(),
        ));
    }
    Ok(())
}

/// Validate display name (non-empty, reasonable length)
pub fn validate_full_name(name: &str) -> std::result::Result<(), ValidationError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(with_message("full_name_empty", "Full name cannot be empty".to_string()));
    }

    if trimmed.chars().count() > 255 {
        return Err(with_message("full_name_too_long", "Full name is too long".to_string()));
    }

    Ok(())
}

fn with_message(code: &'static str, message: String) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Owned(message));
    error
}

fn validate_contacts(
    errors: &mut ValidationErrors,
    emails: Option<&[String]>,
    phones: Option<&[String]>,
) {
    for email in emails.unwrap_or_default() {
        if let Err(err) = validate_email(email) {
            errors.add("emails", err);
        }
    }
    for phone in phones.unwrap_or_default() {
        if let Err(err) = validate_phone(phone) {
            errors.add("phones", err);
        }
    }
}

impl Validate for CreatePrincipalRequest {
    fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(err) = validate_username(&self.username) {
            errors.add("username", err);
        }

        if let Err(err) = validate_full_name(&self.full_name) {
            errors.add("full_name", err);
        }

        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            for violation in password_violations(password) {
                errors.add("password", with_message("weak_password", violation.to_string()));
            }
        }

        validate_contacts(&mut errors, Some(&self.emails), Some(&self.phones));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Validate for UpdatePrincipalRequest {
    fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Some(username) = &self.username {
            if let Err(err) = validate_username(username) {
                errors.add("username", err);
            }
        }

        if let Some(full_name) = &self.full_name {
            if let Err(err) = validate_full_name(full_name) {
                errors.add("full_name", err);
            }
        }

        if let Some(password) = &self.password {
            for violation in password_violations(password) {
                errors.add("password", with_message("weak_password", violation.to_string()));
            }
        }

        validate_contacts(&mut errors, self.emails.as_deref(), self.phones.as_deref());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
