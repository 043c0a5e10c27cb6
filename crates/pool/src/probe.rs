//! The health prober.
//!
//! Performs a single `eth_blockNumber` round-trip against one endpoint and
//! updates its record. The record's write lock is held for the whole probe so
//! the selector never snapshots a torn update.

use std::time::{Duration, Instant};

use alloy_json_rpc::{Response, ResponsePayload};
use reqwest::{StatusCode, header::CONTENT_TYPE};
use tracing::{debug, warn};
use turnout_types::{ProbeFailure, RateLimitSource};

use crate::{
    endpoint::{Endpoint, EndpointStatus},
    metrics,
};

/// Probes one endpoint at a time with `eth_blockNumber`.
///
/// The prober owns the rate-limit backoff duration applied when a probe sees
/// HTTP 429; the request timeout is carried by the [`reqwest::Client`] it is
/// constructed with.
#[derive(Debug, Clone)]
pub struct Prober {
    client: reqwest::Client,
    rate_limit_backoff: Duration,
}

impl Prober {
    /// Create a prober using the given HTTP client and backoff window.
    #[must_use]
    pub const fn new(client: reqwest::Client, rate_limit_backoff: Duration) -> Self {
        Self { client, rate_limit_backoff }
    }

    /// Probe the endpoint and update its record.
    ///
    /// Holds the record's write lock for the full round-trip. If the endpoint
    /// is inside its backoff window no network I/O happens at all; an expired
    /// window is cleared before probing. Every failure collapses to
    /// `reachable = false` and is never propagated.
    pub async fn probe(&self, endpoint: &Endpoint) {
        let url = endpoint.url().as_str();
        let mut status = endpoint.status.write().await;

        if status.rate_limited {
            let now = Instant::now();
            if status.rate_limited_until.is_some_and(|until| now < until) {
                status.reachable = false;
                metrics::set_endpoint_active(url, false);
                return;
            }
            debug!(endpoint = %url, "backoff ended, retrying");
            status.rate_limited = false;
            status.rate_limited_until = None;
        }

        let body = match serde_json::to_vec(&probe_request()) {
            Ok(body) => body,
            Err(err) => {
                record_failure(&mut status, url, &ProbeFailure::RequestCreation(err.to_string()));
                return;
            }
        };

        let started = Instant::now();
        let result = self
            .client
            .post(endpoint.url().clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await;
        let elapsed = started.elapsed();
        metrics::record_probe_duration(url, elapsed);

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                record_failure(&mut status, url, &ProbeFailure::HttpDo(err.to_string()));
                return;
            }
        };

        // A response was obtained; the measured latency counts even if the
        // rest of the probe fails.
        status.latency = elapsed;
        metrics::set_endpoint_latency(url, elapsed);

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            warn!(endpoint = %url, "rate limit detected during probe");
            status.rate_limited = true;
            status.rate_limited_until = Some(Instant::now() + self.rate_limit_backoff);
            status.reachable = false;
            metrics::record_rate_limit(url, RateLimitSource::Check);
            metrics::set_endpoint_active(url, false);
            return;
        }

        if response.status() != StatusCode::OK {
            let failure = ProbeFailure::HttpStatus(response.status().as_u16());
            record_failure(&mut status, url, &failure);
            return;
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => {
                record_failure(&mut status, url, &ProbeFailure::ReadBody(err.to_string()));
                return;
            }
        };

        let parsed: Response = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(err) => {
                record_failure(&mut status, url, &ProbeFailure::JsonParse(err.to_string()));
                return;
            }
        };

        let block_number = match &parsed.payload {
            ResponsePayload::Success(raw) => match parse_block_number(raw.get()) {
                Ok(block_number) => block_number,
                Err(failure) => {
                    record_failure(&mut status, url, &failure);
                    return;
                }
            },
            ResponsePayload::Failure(err) => {
                let failure =
                    ProbeFailure::RpcError { code: err.code, message: err.message.to_string() };
                record_failure(&mut status, url, &failure);
                return;
            }
        };

        status.block_number = block_number;
        status.reachable = true;
        metrics::set_endpoint_block_number(url, block_number);
        metrics::set_endpoint_active(url, true);
        debug!(endpoint = %url, block = block_number, latency = ?elapsed, "probe succeeded");
    }
}

/// The fixed probe envelope.
fn probe_request() -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": "eth_blockNumber",
        "params": [],
        "id": 1
    })
}

/// Mark the record unreachable and account for the failure.
fn record_failure(status: &mut EndpointStatus, url: &str, failure: &ProbeFailure) {
    warn!(endpoint = %url, error = %failure, "probe failed");
    status.reachable = false;
    metrics::record_probe_failure(url, failure.reason());
    metrics::set_endpoint_active(url, false);
}

/// Parse a block number from the raw JSON `result` value.
///
/// Accepts hex (`0x…`) and decimal representations, auto-detecting the base.
/// Negative values are rejected.
fn parse_block_number(raw: &str) -> Result<i64, ProbeFailure> {
    let s = raw.trim().trim_matches('"');
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => s.parse::<i64>(),
    };
    match parsed {
        Ok(block_number) if block_number >= 0 => Ok(block_number),
        _ => Err(ProbeFailure::BlockParse(s.to_string())),
    }
}
