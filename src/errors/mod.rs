//! # Error Handling
//!
//! Crate-wide error taxonomy for Warden, built on `thiserror`.

pub mod types;

pub use types::{AuthErrorType, Error, Result};
