//! Prometheus metrics exporter.
//!
//! Installs the [`metrics`] Prometheus recorder and serves the scrape
//! endpoint. The probe and selection metrics are recorded by `turnout-pool`;
//! this module adds the data-plane request metrics.

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    extract::State,
    http::header::CONTENT_TYPE,
    response::IntoResponse,
    routing::get,
};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Handle to the installed Prometheus recorder.
///
/// Only one recorder can be installed per process; create this once at
/// startup and share it with the metrics router.
#[derive(Debug, Clone)]
pub struct GatewayMetrics {
    handle: PrometheusHandle,
}

impl GatewayMetrics {
    /// Install the Prometheus recorder as the global metrics recorder.
    ///
    /// # Errors
    ///
    /// Returns an error if a recorder has already been installed.
    pub fn new() -> eyre::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        Ok(Self { handle })
    }

    /// All collected metrics in Prometheus text exposition format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Handler for the `/metrics` endpoint.
pub async fn metrics_handler(State(metrics): State<Arc<GatewayMetrics>>) -> impl IntoResponse {
    ([(CONTENT_TYPE, "text/plain; version=0.0.4")], metrics.render())
}

/// Build the router for the metrics listener.
#[must_use]
pub fn metrics_router(metrics: Arc<GatewayMetrics>) -> Router {
    Router::new().route("/metrics", get(metrics_handler)).with_state(metrics)
}

/// Record one proxied request: count and duration, labeled by HTTP method,
/// response status and the upstream endpoint it was forwarded to.
pub fn record_http_request(method: &str, status_code: u16, endpoint: &str, duration: Duration) {
    counter!(
        "turnout_http_requests_total",
        "method" => method.to_string(),
        "status_code" => status_code.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .increment(1);
    histogram!(
        "turnout_http_request_duration_seconds",
        "method" => method.to_string(),
        "status_code" => status_code.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .record(duration.as_secs_f64());
}
