//! # Structured Logging
//!
//! Span macros shared by the HTTP layer and the repositories. Every span carries a
//! fresh uuid so log lines of one request or query can be correlated.

/// Create a tracing span for request tracking.
///
/// ```rust,ignore
/// let span = request_span!("PATCH", "/api/v1/principals/11", principal_id = 7);
/// ```
#[macro_export]
macro_rules! request_span {
    ($method:expr, $path:expr) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            correlation_id = %uuid::Uuid::new_v4(),
            principal_id = tracing::field::Empty,
            role = tracing::field::Empty
        )
    };
    ($method:expr, $path:expr, $($field:tt)*) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            correlation_id = %uuid::Uuid::new_v4(),
            role = tracing::field::Empty,
            $($field)*
        )
    };
}

/// Create a tracing span for database operations.
#[macro_export]
macro_rules! db_span {
    ($operation:expr) => {
        tracing::debug_span!(
            "db_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "db_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Log configuration at startup. The signing secret is never logged.
pub fn log_config_info(config: &crate::config::AppConfig) {
    tracing::info!(
        server_address = %config.server.bind_address(),
        database_type = "postgresql",
        token_ttl_hours = config.auth.token_ttl_hours,
        reset_token_ttl_hours = config.auth.reset_token_ttl_hours,
        idle_threshold_minutes = config.auth.idle_threshold_minutes,
        sweep_interval_seconds = config.auth.sweep_interval_seconds,
        presence_queue_capacity = config.auth.presence_queue_capacity,
        notify_webhook = config.notify.webhook_url.is_some(),
        metrics_enabled = config.observability.metrics_port != 0,
        "Warden configuration"
    );
}
