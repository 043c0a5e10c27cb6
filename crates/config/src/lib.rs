#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/turnout-rs/turnout/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use std::{net::SocketAddr, path::Path, time::Duration};

use eyre::{Context, bail, ensure};
use serde::{Deserialize, Serialize};

/// Default listen address for the client-facing proxy.
pub const DEFAULT_GATEWAY_PORT: &str = ":8545";
/// Default listen address for the metrics endpoint.
pub const DEFAULT_METRICS_PORT: &str = ":9090";
/// Default interval between selection passes.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);
/// Default per-probe and per-upstream HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
/// Default exclusion window after an HTTP 429.
pub const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(60);
/// Default number of blocks an endpoint may lag behind the observed tip.
pub const DEFAULT_BLOCK_TOLERANCE: i64 = 5;

/// Configuration for the turnout gateway, loaded from a YAML file.
///
/// Keys are camelCase in the file; durations are human-readable strings
/// (`500ms`, `30s`, `1m`). Every key except `rpcEndpoints` has a default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    /// Listen address for the client-facing proxy (`:8545` or `host:port`).
    pub gateway_port: String,
    /// Listen address for the Prometheus metrics endpoint.
    pub metrics_port: String,
    /// Interval between selection passes.
    #[serde(with = "humantime_serde")]
    pub check_interval: Duration,
    /// Per-probe and per-upstream HTTP timeout.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// How long an endpoint stays excluded after an HTTP 429.
    #[serde(with = "humantime_serde")]
    pub rate_limit_backoff: Duration,
    /// Maximum blocks behind the observed tip an endpoint may lag and remain
    /// eligible.
    pub block_tolerance: i64,
    /// Upstream JSON-RPC endpoint URLs, in priority order. At least one is
    /// required.
    pub rpc_endpoints: Vec<String>,
    /// Emit selection diagnostics at debug level.
    pub verbose: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            gateway_port: DEFAULT_GATEWAY_PORT.to_string(),
            metrics_port: DEFAULT_METRICS_PORT.to_string(),
            check_interval: DEFAULT_CHECK_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            rate_limit_backoff: DEFAULT_RATE_LIMIT_BACKOFF,
            block_tolerance: DEFAULT_BLOCK_TOLERANCE,
            rpc_endpoints: Vec::new(),
            verbose: false,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if
    /// validation fails.
    pub fn from_file(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed (including invalid
    /// duration strings) or if validation fails.
    pub fn parse(s: &str) -> eyre::Result<Self> {
        let config: Self = serde_yml::from_str(s).wrap_err("failed to parse YAML configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Checks that at least one upstream endpoint is configured, that the
    /// block tolerance is non-negative, and that both listen addresses are
    /// well-formed.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first validation failure.
    pub fn validate(&self) -> eyre::Result<()> {
        ensure!(!self.rpc_endpoints.is_empty(), "no rpcEndpoints found in configuration");
        ensure!(self.block_tolerance >= 0, "blockTolerance must be non-negative");
        self.gateway_addr().wrap_err("invalid gatewayPort")?;
        self.metrics_addr().wrap_err("invalid metricsPort")?;
        Ok(())
    }

    /// The socket address the proxy listener binds to.
    ///
    /// # Errors
    ///
    /// Returns an error if `gatewayPort` is not a valid listen address.
    pub fn gateway_addr(&self) -> eyre::Result<SocketAddr> {
        parse_listen_addr(&self.gateway_port)
    }

    /// The socket address the metrics listener binds to.
    ///
    /// # Errors
    ///
    /// Returns an error if `metricsPort` is not a valid listen address.
    pub fn metrics_addr(&self) -> eyre::Result<SocketAddr> {
        parse_listen_addr(&self.metrics_port)
    }
}

/// Parse a listen address, accepting the bare `:port` shorthand for "all
/// interfaces".
fn parse_listen_addr(s: &str) -> eyre::Result<SocketAddr> {
    if s.is_empty() {
        bail!("empty listen address");
    }
    let normalized =
        if s.starts_with(':') { format!("0.0.0.0{s}") } else { s.to_string() };
    normalized
        .parse()
        .wrap_err_with(|| format!("failed to parse listen address '{s}'"))
}
