//! Metric recording for probes and selection.
//!
//! Thin wrappers over the [`metrics`] facade; the Prometheus recorder itself
//! is installed by the server crate. All metrics carry the upstream URL as
//! the `endpoint` label.

use std::time::Duration;

use metrics::{counter, gauge, histogram};
use turnout_types::RateLimitSource;

/// Record how long a probe round-trip took, including failed ones.
pub fn record_probe_duration(endpoint: &str, duration: Duration) {
    histogram!("turnout_probe_duration_seconds", "endpoint" => endpoint.to_string())
        .record(duration.as_secs_f64());
}

/// Count a failed probe, categorized by [`ProbeFailure::reason`].
///
/// [`ProbeFailure::reason`]: turnout_types::ProbeFailure::reason
pub fn record_probe_failure(endpoint: &str, reason: &'static str) {
    counter!(
        "turnout_probe_errors_total",
        "endpoint" => endpoint.to_string(),
        "reason" => reason
    )
    .increment(1);
}

/// Count a detected rate limit, categorized by where it was observed.
pub fn record_rate_limit(endpoint: &str, source: RateLimitSource) {
    counter!(
        "turnout_rate_limits_total",
        "endpoint" => endpoint.to_string(),
        "source" => source.as_str()
    )
    .increment(1);
}

/// Update the last-observed probe latency gauge.
pub fn set_endpoint_latency(endpoint: &str, latency: Duration) {
    gauge!("turnout_endpoint_latency_seconds", "endpoint" => endpoint.to_string())
        .set(latency.as_secs_f64());
}

/// Update the last-observed chain head gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_endpoint_block_number(endpoint: &str, block_number: i64) {
    gauge!("turnout_endpoint_block_number", "endpoint" => endpoint.to_string())
        .set(block_number as f64);
}

/// Flag whether the endpoint is currently considered active.
pub fn set_endpoint_active(endpoint: &str, active: bool) {
    gauge!("turnout_endpoint_active", "endpoint" => endpoint.to_string())
        .set(if active { 1.0 } else { 0.0 });
}

/// Flag whether the endpoint is the published current best.
pub fn set_current_best(endpoint: &str, best: bool) {
    gauge!("turnout_endpoint_current_best", "endpoint" => endpoint.to_string())
        .set(if best { 1.0 } else { 0.0 });
}
