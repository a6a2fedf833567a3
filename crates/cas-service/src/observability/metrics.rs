//! Metrics definitions for the CAS service
//!
//! All metrics follow Prometheus naming conventions:
//! - `cas_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `ticket_type`: 5 values
//! - `status`: 2 values (success, error)
//! - `error_category`: see [`super::ErrorCategory`]
//! - `operation`: bounded by code (add, get, update, delete, consume, ...)
//! - `endpoint`: fixed route templates, see [`normalize_endpoint`]

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the global Prometheus recorder and return its render handle
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))
}

// ============================================================================
// Ticket Metrics
// ============================================================================

/// Metric: `cas_tickets_created_total`
/// Labels: `ticket_type`
pub fn record_ticket_created(ticket_type: &'static str) {
    counter!("cas_tickets_created_total", "ticket_type" => ticket_type).increment(1);
}

/// Metric: `cas_ticket_validations_total`
/// Labels: `status`, `error_category`
pub fn record_ticket_validation(status: &'static str, error_category: Option<&'static str>) {
    let category = error_category.unwrap_or("none");
    counter!("cas_ticket_validations_total", "status" => status, "error_category" => category)
        .increment(1);
}

// ============================================================================
// Registry Metrics
// ============================================================================

/// Record a registry backend call
///
/// Metric: `cas_registry_operation_duration_seconds`
/// Labels: `operation`, `status`
pub fn record_registry_operation(operation: &'static str, status: &'static str, duration: Duration) {
    histogram!("cas_registry_operation_duration_seconds", "operation" => operation, "status" => status)
        .record(duration.as_secs_f64());
}

/// Record a cleanup sweep
///
/// Metrics: `cas_registry_cleanup_runs_total{status}`,
/// `cas_registry_cleanup_removed_total`
pub fn record_registry_cleanup(status: &'static str, removed: usize) {
    counter!("cas_registry_cleanup_runs_total", "status" => status).increment(1);
    counter!("cas_registry_cleanup_removed_total").increment(removed as u64);
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record an HTTP request
///
/// Metrics: `cas_http_request_duration_seconds`, `cas_http_requests_total`
/// Labels: `method`, `endpoint`, `status` / `status_code`
pub fn record_http_request(method: &str, path: &str, status_code: u16, duration: Duration) {
    let endpoint = normalize_endpoint(path);
    let status = categorize_status_code(status_code);

    histogram!("cas_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("cas_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 503 | 504 => "timeout",
        _ => "error",
    }
}

/// Map a request path to a bounded label.
///
/// Ticket ids in paths are credentials; they never become label values.
pub fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        "/v1/tickets" => "/v1/tickets",
        "/p3/serviceValidate" => "/p3/serviceValidate",
        "/p3/proxyValidate" => "/p3/proxyValidate",
        "/proxy" => "/proxy",
        p if p.starts_with("/v1/tickets/") => "/v1/tickets/{tgt}",
        _ => "other",
    }
}

// ============================================================================
// Error Metrics
// ============================================================================

/// Record error by category
///
/// Metric: `cas_errors_total`
/// Labels: `operation`, `error_category`, `status_code`
pub fn record_error(operation: &'static str, error_category: &'static str, status_code: u16) {
    counter!("cas_errors_total",
        "operation" => operation,
        "error_category" => error_category,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}
