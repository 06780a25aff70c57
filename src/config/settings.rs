//! # Configuration Settings
//!
//! Defines the configuration structure for Warden. Every section can be built from the
//! process environment (after `.env` has been loaded) and validated as a whole.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Development-only signing secret. `AppConfig::validate` refuses to run with it.
pub const DEV_JWT_SECRET: &str = "warden-development-secret-change-me-before-deploying";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    /// HTTP server configuration
    #[validate(nested)]
    pub server: ServerConfig,

    /// Database configuration
    #[validate(nested)]
    pub database: DatabaseConfig,

    /// Authentication configuration
    #[validate(nested)]
    pub auth: AuthConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,

    /// Outbound notification configuration
    #[validate(nested)]
    pub notify: NotifyConfig,
}

impl AppConfig {
    /// Build the full configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            database: DatabaseConfig::from_env(),
            auth: AuthConfig::from_env(),
            observability: ObservabilityConfig::from_env(),
            notify: NotifyConfig::from_env(),
        }
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;
        self.validate_custom(true)?;
        Ok(())
    }

    /// Validate everything except the database section, for in-memory runs
    pub fn validate_without_database(&self) -> Result<()> {
        self.server.validate().map_err(Error::from)?;
        self.auth.validate().map_err(Error::from)?;
        self.observability.validate().map_err(Error::from)?;
        self.notify.validate().map_err(Error::from)?;
        self.validate_custom(false)
    }

    fn validate_custom(&self, check_database: bool) -> Result<()> {
        if check_database && !self.database.is_postgresql() {
            return Err(Error::validation(
                "Database URL must start with 'postgres://' or 'postgresql://'",
            ));
        }

        if self.auth.jwt_secret.len() < 32 {
            return Err(Error::validation("JWT secret must be at least 32 characters long"));
        }

        if self.auth.jwt_secret == DEV_JWT_SECRET {
            return Err(Error::validation(
                "JWT_SECRET is still the development default; set a real secret",
            ));
        }

        if let Some(webhook) = &self.notify.webhook_url {
            url::Url::parse(webhook).map_err(|e| {
                Error::validation_field(format!("Invalid notification webhook URL: {}", e), "notify")
            })?;
        }

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    /// Server bind address
    #[validate(length(min = 1, message = "Host cannot be empty"))]
    pub host: String,

    /// Server port
    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    /// CORS allowed origins (empty = allow all)
    pub allowed_origins: Vec<String>,

    /// Grace period for in-flight requests on shutdown
    #[validate(range(
        min = 1,
        max = 120,
        message = "Shutdown grace period must be between 1 and 120 seconds"
    ))]
    pub shutdown_grace_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec![],
            shutdown_grace_seconds: 5,
        }
    }
}

impl ServerConfig {
    /// Get the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the shutdown grace period as Duration
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    /// Create ServerConfig from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = std::env::var("WARDEN_HOST").unwrap_or(defaults.host);

        let port = std::env::var("WARDEN_PORT")
            .or_else(|_| std::env::var("PORT"))
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(defaults.port);

        let allowed_origins = std::env::var("WARDEN_ALLOWED_ORIGINS")
            .map(|raw| parse_list(&raw))
            .unwrap_or_default();

        let shutdown_grace_seconds = std::env::var("WARDEN_SHUTDOWN_GRACE_SECONDS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.shutdown_grace_seconds);

        Self { host, port, allowed_origins, shutdown_grace_seconds }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[validate(length(min = 1, message = "Database URL cannot be empty"))]
    pub url: String,

    /// Maximum number of connections in the pool
    #[validate(range(min = 1, max = 100, message = "Max connections must be between 1 and 100"))]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[validate(range(min = 0, max = 50, message = "Min connections must be between 0 and 50"))]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[validate(range(
        min = 1,
        max = 60,
        message = "Connect timeout must be between 1 and 60 seconds"
    ))]
    pub connect_timeout_seconds: u64,

    /// Idle timeout in seconds (0 = no timeout)
    pub idle_timeout_seconds: u64,

    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost:5432/warden".to_string(),
            max_connections: 10,
            min_connections: 0,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 600, // 10 minutes
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Get idle timeout as Duration (None if 0)
    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_seconds))
        }
    }

    /// Check if this is a PostgreSQL configuration
    pub fn is_postgresql(&self) -> bool {
        self.url.starts_with("postgresql://") || self.url.starts_with("postgres://")
    }

    /// Create DatabaseConfig from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let url = std::env::var("DATABASE_URL").unwrap_or(defaults.url);

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(defaults.max_connections);

        let min_connections = std::env::var("DATABASE_MIN_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(defaults.min_connections);

        let connect_timeout_seconds = std::env::var("DATABASE_CONNECT_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.connect_timeout_seconds);

        let idle_timeout_seconds = std::env::var("DATABASE_IDLE_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.idle_timeout_seconds);

        let auto_migrate = std::env::var("DATABASE_AUTO_MIGRATE")
            .map(|s| parse_bool(&s))
            .unwrap_or(defaults.auto_migrate);

        Self {
            url,
            max_connections,
            min_connections,
            connect_timeout_seconds,
            idle_timeout_seconds,
            auto_migrate,
        }
    }
}

/// Authentication and session configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AuthConfig {
    /// HMAC secret for token signing/verification
    #[validate(length(min = 1, message = "JWT secret cannot be empty"))]
    pub jwt_secret: String,

    /// Session token lifetime in hours
    #[validate(range(min = 1, max = 720, message = "Token lifetime must be between 1 and 720 hours"))]
    pub token_ttl_hours: i64,

    /// Password-reset token lifetime in hours
    #[validate(range(min = 1, max = 72, message = "Reset token lifetime must be between 1 and 72 hours"))]
    pub reset_token_ttl_hours: i64,

    /// How long used reset tokens are kept before the sweep purges them
    #[validate(range(min = 1, max = 365, message = "Retention must be between 1 and 365 days"))]
    pub used_reset_token_retention_days: i64,

    /// Minutes without activity after which a principal is marked not-present
    #[validate(range(min = 1, max = 1440, message = "Idle threshold must be between 1 and 1440 minutes"))]
    pub idle_threshold_minutes: i64,

    /// Interval between idle sweeps in seconds
    #[validate(range(min = 1, max = 3600, message = "Sweep interval must be between 1 and 3600 seconds"))]
    pub sweep_interval_seconds: u64,

    /// Capacity of the presence refresh queue
    #[validate(range(min = 1, max = 1_000_000, message = "Presence queue capacity must be positive"))]
    pub presence_queue_capacity: usize,

    /// Base URL of the front-end reset page; the token is appended as a query parameter
    #[validate(length(min = 1, message = "Reset URL base cannot be empty"))]
    pub reset_url_base: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl_hours: 24,
            reset_token_ttl_hours: 1,
            used_reset_token_retention_days: 7,
            idle_threshold_minutes: 10,
            sweep_interval_seconds: 60,
            presence_queue_capacity: 1024,
            reset_url_base: "http://localhost:3000/reset-password".to_string(),
        }
    }
}

impl AuthConfig {
    /// Session token lifetime as a chrono Duration
    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.token_ttl_hours)
    }

    /// Idle threshold as a chrono Duration
    pub fn idle_threshold(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.idle_threshold_minutes)
    }

    /// Retention window for used reset tokens
    pub fn used_reset_token_retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.used_reset_token_retention_days)
    }

    /// Interval between idle sweeps
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    /// Create AuthConfig from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or(defaults.jwt_secret);

        let token_ttl_hours = std::env::var("WARDEN_TOKEN_TTL_HOURS")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(defaults.token_ttl_hours);

        let reset_token_ttl_hours = std::env::var("WARDEN_RESET_TOKEN_TTL_HOURS")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(defaults.reset_token_ttl_hours);

        let used_reset_token_retention_days =
            std::env::var("WARDEN_USED_RESET_TOKEN_RETENTION_DAYS")
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .unwrap_or(defaults.used_reset_token_retention_days);

        let idle_threshold_minutes = std::env::var("WARDEN_IDLE_THRESHOLD_MINUTES")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(defaults.idle_threshold_minutes);

        let sweep_interval_seconds = std::env::var("WARDEN_SWEEP_INTERVAL_SECONDS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.sweep_interval_seconds);

        let presence_queue_capacity = std::env::var("WARDEN_PRESENCE_QUEUE_CAPACITY")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(defaults.presence_queue_capacity);

        let reset_url_base =
            std::env::var("WARDEN_RESET_URL_BASE").unwrap_or(defaults.reset_url_base);

        Self {
            jwt_secret,
            token_ttl_hours,
            reset_token_ttl_hours,
            used_reset_token_retention_days,
            idle_threshold_minutes,
            sweep_interval_seconds,
            presence_queue_capacity,
            reset_url_base,
        }
    }
}

/// Observability configuration for logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Metrics exporter port (0 = disabled)
    pub metrics_port: u16,

    /// Service name attached to logs and metrics
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level (trace, debug, info, warn, error) when RUST_LOG is unset
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_port: 0,
            service_name: "warden".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}

impl ObservabilityConfig {
    /// Get metrics bind address (None if disabled)
    pub fn metrics_bind_address(&self) -> Option<String> {
        if self.metrics_port == 0 {
            None
        } else {
            Some(format!("0.0.0.0:{}", self.metrics_port))
        }
    }

    /// Create ObservabilityConfig from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let metrics_port = std::env::var("WARDEN_METRICS_PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(defaults.metrics_port);

        let service_name = std::env::var("WARDEN_SERVICE_NAME").unwrap_or(defaults.service_name);

        let log_level = std::env::var("WARDEN_LOG_LEVEL").unwrap_or(defaults.log_level);

        let json_logging = std::env::var("WARDEN_JSON_LOGS")
            .map(|s| parse_bool(&s))
            .unwrap_or(defaults.json_logging);

        Self { metrics_port, service_name, log_level, json_logging }
    }
}

/// Outbound notification configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct NotifyConfig {
    /// Mail relay webhook; password-reset mails are only logged when unset
    pub webhook_url: Option<String>,

    /// Request timeout for the webhook call
    #[validate(range(max = 60, message = "Webhook timeout must be at most 60 seconds"))]
    pub webhook_timeout_seconds: u64,
}

impl NotifyConfig {
    /// Create NotifyConfig from environment variables
    pub fn from_env() -> Self {
        let webhook_url =
            std::env::var("WARDEN_NOTIFY_WEBHOOK_URL").ok().filter(|s| !s.trim().is_empty());

        let webhook_timeout_seconds = std::env::var("WARDEN_NOTIFY_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(10);

        Self { webhook_url, webhook_timeout_seconds }
    }

    /// Webhook request timeout as Duration
    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_seconds.max(1))
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}
