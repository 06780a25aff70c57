//! # Configuration Management
//!
//! Environment-driven configuration for the Warden server and CLI.

pub mod settings;

pub use settings::{
    AppConfig, AuthConfig, DatabaseConfig, NotifyConfig, ObservabilityConfig, ServerConfig,
    DEV_JWT_SECRET,
};
