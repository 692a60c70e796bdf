//! Metrics collection and exposition.
//!
//! # Metrics
//! - `guard_requests_total` (counter): requests by method, status
//! - `guard_request_duration_seconds` (histogram): latency distribution
//! - `guard_gateway_decisions_total` (counter): redirect / deny / preflight / continue
//! - `guard_rate_limited_total` (counter): denied quota checks by action
//! - `guard_csrf_rejections_total` (counter): by reason
//! - `guard_signature_checks_total` (counter): webhook verifications by result
//!
//! # Design Decisions
//! - Recording without an installed exporter is a no-op, so tests need no setup
//! - Labels stay low-cardinality (no paths, keys or client addresses)

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let status = status.to_string();
    metrics::counter!("guard_requests_total", "method" => method.to_string(), "status" => status.clone())
        .increment(1);
    metrics::histogram!("guard_request_duration_seconds", "method" => method.to_string(), "status" => status)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_gateway_decision(outcome: &'static str) {
    metrics::counter!("guard_gateway_decisions_total", "outcome" => outcome).increment(1);
}

pub fn record_rate_limited(action: &'static str) {
    metrics::counter!("guard_rate_limited_total", "action" => action).increment(1);
}

pub fn record_csrf_rejection(reason: &'static str) {
    metrics::counter!("guard_csrf_rejections_total", "reason" => reason).increment(1);
}

pub fn record_signature_check(valid: bool) {
    let result = if valid { "valid" } else { "invalid" };
    metrics::counter!("guard_signature_checks_total", "result" => result).increment(1);
}
