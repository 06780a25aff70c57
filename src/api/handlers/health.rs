//! Health check endpoint for monitoring and readiness probes

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;

use crate::api::routes::ApiState;
use crate::storage::{self, get_pool_stats, PoolStats};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// "ok", or "degraded" when the database is unreachable
    #[schema(example = "ok")]
    pub status: String,
    /// "ok", "unavailable" or "in_memory"
    pub database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolStats>,
}

/// Health check endpoint
///
/// Unauthenticated. Returns 503 when the database cannot be reached.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    )
)]
pub async fn health_handler(State(state): State<ApiState>) -> (StatusCode, Json<HealthResponse>) {
    let Some(pool) = state.pool.as_ref() else {
        return (
            StatusCode::OK,
            Json(HealthResponse { status: "ok".into(), database: "in_memory".into(), pool: None }),
        );
    };

    match storage::check_connection(pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".into(),
                database: "ok".into(),
                pool: Some(get_pool_stats(pool)),
            }),
        ),
        Err(e) => {
            warn!(error = %e, "health check could not reach the database");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded".into(),
                    database: "unavailable".into(),
                    pool: Some(get_pool_stats(pool)),
                }),
            )
        }
    }
}
