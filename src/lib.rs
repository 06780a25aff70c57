//! # Warden
//!
//! Authentication and authorization core for a multi-user service: bearer-token
//! sessions that can be revoked server-side, a three-tier role model with moderator
//! allow-lists, field-level write authorization, and a single-use password-reset flow.
//!
//! ## Architecture
//!
//! ```text
//! REST API (axum) → Session Guard → Access Policy → Credential Store → PostgreSQL
//!                        ↓                                ↓
//!                   Token Codec                  Reset-Token Lifecycle → Notifier
//! ```
//!
//! Every token carries the principal's invalidation epoch. The Session Guard reloads the
//! principal on each request and rejects tokens whose epoch is stale, so changing a role,
//! blocking an account or replacing a credential logs out every existing session.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod notify;
pub mod observability;
pub mod storage;

// Re-export commonly used types and traits
pub use config::AppConfig;
pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
