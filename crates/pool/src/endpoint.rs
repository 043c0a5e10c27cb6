//! The endpoint state table.
//!
//! One [`Endpoint`] per configured upstream URL, created at startup and never
//! added or removed at runtime. All mutable health state lives behind the
//! record's own lock so probes of different endpoints never serialize.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use reqwest::Url;
use tokio::sync::RwLock;
use tracing::warn;
use turnout_types::GatewayError;

/// Mutable health state of one upstream endpoint.
///
/// `block_number` and `latency` are meaningful only while `reachable` is
/// true; `rate_limited_until` is present iff `rate_limited` is set. A
/// rate-limited endpoint is never reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointStatus {
    /// Last observed chain head.
    pub block_number: i64,
    /// Round-trip time of the last probe.
    pub latency: Duration,
    /// Whether the last probe produced a well-formed block number.
    pub reachable: bool,
    /// Whether the endpoint is in rate-limit backoff.
    pub rate_limited: bool,
    /// When the backoff window ends.
    pub rate_limited_until: Option<Instant>,
}

impl Default for EndpointStatus {
    fn default() -> Self {
        Self {
            block_number: 0,
            latency: Duration::ZERO,
            reachable: false,
            rate_limited: false,
            rate_limited_until: None,
        }
    }
}

/// One configured upstream endpoint: an immutable URL plus its health record.
#[derive(Debug)]
pub struct Endpoint {
    url: Url,
    pub(crate) status: RwLock<EndpointStatus>,
}

impl Endpoint {
    /// Create a new endpoint record for the given URL.
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self { url, status: RwLock::new(EndpointStatus::default()) }
    }

    /// The upstream URL this record tracks.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Copy the current health state out from under the record lock.
    pub async fn snapshot(&self) -> EndpointStatus {
        self.status.read().await.clone()
    }

    /// Put the endpoint into rate-limit backoff for `backoff` from now.
    ///
    /// Used by the proxy frontend when a forwarded request comes back with
    /// HTTP 429; the prober flags throttling itself under the lock it already
    /// holds. Flagging is idempotent over the backoff window.
    pub async fn mark_rate_limited(&self, backoff: Duration) {
        let mut status = self.status.write().await;
        status.rate_limited = true;
        status.rate_limited_until = Some(Instant::now() + backoff);
        status.reachable = false;
    }
}

/// The fixed collection of endpoint records, in configuration order.
///
/// Configuration order matters: the first endpoint seeds the current-best
/// slot before any probe has run, and earlier endpoints win latency ties.
#[derive(Debug)]
pub struct EndpointPool {
    endpoints: Vec<Arc<Endpoint>>,
}

impl EndpointPool {
    /// Build the pool from configured URLs.
    ///
    /// Unparseable URLs are skipped with a warning, matching the lenient
    /// startup behavior of the gateway; only an entirely invalid list is
    /// fatal.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NoValidEndpoints`] if no URL parses.
    pub fn from_urls(urls: &[String]) -> Result<Self, GatewayError> {
        let mut endpoints = Vec::with_capacity(urls.len());
        for raw in urls {
            match Url::parse(raw) {
                Ok(url) => endpoints.push(Arc::new(Endpoint::new(url))),
                Err(err) => warn!(url = %raw, error = %err, "skipping invalid endpoint URL"),
            }
        }
        if endpoints.is_empty() {
            return Err(GatewayError::NoValidEndpoints);
        }
        Ok(Self { endpoints })
    }

    /// All endpoint records, in configuration order.
    #[must_use]
    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    /// The first configured endpoint.
    #[must_use]
    pub fn first(&self) -> Arc<Endpoint> {
        self.endpoints[0].clone()
    }

    /// Number of endpoints in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether the pool is empty. Never true for a constructed pool.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
