//! # HTTP Request Tracing Middleware
//!
//! Wraps every request in a tracing span and records request counters and latency
//! histograms for Prometheus.

use axum::{extract::Request, middleware::Next, response::Response};
use metrics::{counter, histogram};
use std::time::Instant;
use tracing::{debug, Instrument};

/// Axum middleware that opens a span per request and records HTTP metrics.
pub async fn trace_http_requests(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let uri = request.uri().path().to_string();
    let start = Instant::now();

    let span = crate::request_span!(method, uri);

    let response = next.run(request).instrument(span.clone()).await;

    let status_code = response.status().as_u16();
    let elapsed = start.elapsed();
    span.in_scope(|| {
        debug!(status_code, elapsed_ms = elapsed.as_millis() as u64, "request completed")
    });

    let path_label = normalize_path_for_metrics(&uri);
    counter!(
        "http_requests_total",
        "method" => method.clone(),
        "path" => path_label.clone(),
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!(
        "http_request_duration_seconds",
        "method" => method,
        "path" => path_label
    )
    .record(elapsed.as_secs_f64());

    response
}

/// Replace principal ids in paths with `:id` to keep label cardinality bounded.
fn normalize_path_for_metrics(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').collect();

    segments
        .iter()
        .enumerate()
        .map(|(i, segment)| {
            let is_numeric = !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit());
            let prev_is_collection = i > 0 && segments.get(i - 1) == Some(&"principals");
            if is_numeric || (prev_is_collection && !segment.is_empty()) {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_for_metrics() {
        assert_eq!(normalize_path_for_metrics("/api/v1/principals/42"), "/api/v1/principals/:id");
        assert_eq!(normalize_path_for_metrics("/api/v1/principals"), "/api/v1/principals");
        assert_eq!(normalize_path_for_metrics("/api/v1/auth/login"), "/api/v1/auth/login");
        assert_eq!(normalize_path_for_metrics("/health"), "/health");
    }
}
