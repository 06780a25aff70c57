//! # Metrics Collection
//!
//! Prometheus counters for authentication, session revocation, presence and password
//! resets. Recording is a no-op until `init_metrics` installs the exporter.

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use ::tracing::{info, warn};
use metrics::{counter, describe_counter, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Metrics recorder that tracks application metrics
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    /// Create a new metrics recorder instance
    pub fn new() -> Self {
        Self
    }

    /// Record a Session Guard outcome
    pub fn record_authentication(&self, status: &str) {
        counter!("auth_authentications_total").increment(1);
        let labels = [("status", status.to_string())];
        counter!("auth_authentications_total", &labels).increment(1);
    }

    /// Record a rejection that carried the force-logout signal
    pub fn record_force_logout(&self, reason: &str) {
        let labels = [("reason", reason.to_string())];
        counter!("auth_force_logouts_total", &labels).increment(1);
    }

    /// Record a login attempt outcome
    pub fn record_login(&self, status: &str) {
        let labels = [("status", status.to_string())];
        counter!("auth_logins_total", &labels).increment(1);
    }

    /// Record a presence refresh dropped because the queue was full
    pub fn record_presence_dropped(&self) {
        counter!("presence_events_dropped_total").increment(1);
    }

    /// Record a password-reset flow outcome
    pub fn record_password_reset(&self, status: &str) {
        let labels = [("status", status.to_string())];
        counter!("password_resets_total", &labels).increment(1);
    }

    /// Register baseline auth metrics so Prometheus exports appear before events occur.
    pub fn register_auth_metrics(&self) {
        describe_counter!(
            "auth_authentications_total",
            Unit::Count,
            "Session Guard outcomes grouped by status"
        );
        describe_counter!(
            "auth_force_logouts_total",
            Unit::Count,
            "Requests rejected with a force-logout signal, grouped by reason"
        );
        describe_counter!("auth_logins_total", Unit::Count, "Login attempts grouped by outcome");
        describe_counter!(
            "presence_events_dropped_total",
            Unit::Count,
            "Presence refreshes dropped because the queue was full"
        );
        describe_counter!(
            "password_resets_total",
            Unit::Count,
            "Password reset requests and completions grouped by status"
        );

        counter!("presence_events_dropped_total").absolute(0);

        const STATUSES: &[&str] = &[
            "success",
            "missing_bearer",
            "malformed",
            "invalid_token",
            "not_found",
            "blocked",
            "revoked",
            "error",
        ];
        for status in STATUSES {
            counter!("auth_authentications_total", "status" => *status).absolute(0);
        }

        for reason in ["blocked", "revoked"] {
            counter!("auth_force_logouts_total", "reason" => reason).absolute(0);
        }

        for status in ["success", "invalid_credentials", "blocked", "error"] {
            counter!("auth_logins_total", "status" => status).absolute(0);
        }

        for status in ["requested", "completed", "invalid_token"] {
            counter!("password_resets_total", "status" => status).absolute(0);
        }
    }
}

/// Global metrics recorder instance
static METRICS: once_cell::sync::Lazy<Arc<RwLock<Option<MetricsRecorder>>>> =
    once_cell::sync::Lazy::new(|| Arc::new(RwLock::new(None)));

/// Initialize metrics collection and Prometheus exporter
pub async fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let metrics_addr = match config.metrics_bind_address() {
        Some(addr) => addr,
        None => {
            warn!("Metrics disabled: no bind address configured");
            return Ok(());
        }
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        Error::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    let builder = PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name);

    builder
        .install()
        .map_err(|e| Error::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    let recorder = MetricsRecorder::new();
    {
        let mut metrics = METRICS.write().await;
        *metrics = Some(recorder.clone());
    }

    recorder.register_auth_metrics();

    info!(
        metrics_addr = %metrics_addr,
        service_name = %config.service_name,
        "Metrics collection initialized"
    );

    Ok(())
}

/// Get the global metrics recorder
pub async fn get_metrics() -> Option<MetricsRecorder> {
    METRICS.read().await.clone()
}

/// Record a Session Guard outcome via the global recorder
pub async fn record_authentication(status: &str) {
    if let Some(metrics) = get_metrics().await {
        metrics.record_authentication(status);
    }
}

/// Record a force-logout rejection via the global recorder
pub async fn record_force_logout(reason: &str) {
    if let Some(metrics) = get_metrics().await {
        metrics.record_force_logout(reason);
    }
}

/// Record a login attempt outcome via the global recorder
pub async fn record_login(status: &str) {
    if let Some(metrics) = get_metrics().await {
        metrics.record_login(status);
    }
}

/// Record a dropped presence refresh. Never awaits, so it is safe on the full-queue path.
pub fn record_presence_dropped() {
    counter!("presence_events_dropped_total").increment(1);
}

/// Record a password-reset outcome via the global recorder
pub async fn record_password_reset(status: &str) {
    if let Some(metrics) = get_metrics().await {
        metrics.record_password_reset(status);
    }
}
