//! Tracing initialization and startup configuration logging.

use eyre::{Context, Result};
use tracing::{debug, info};
use turnout_config::GatewayConfig;

/// Initialize the tracing subscriber.
///
/// The `RUST_LOG` syntax is accepted; an unparseable level falls back to
/// `info`.
///
/// # Errors
///
/// Returns an error if the tracing subscriber cannot be initialized.
pub(crate) fn init_tracing(level: &str) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .wrap_err("failed to create log filter")?;

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    Ok(())
}

/// Log a summary of the loaded configuration.
pub(crate) fn log_config(config: &GatewayConfig) {
    info!(
        gateway = %config.gateway_port,
        metrics = %config.metrics_port,
        "listen configuration"
    );
    info!(
        check_interval = ?config.check_interval,
        request_timeout = ?config.request_timeout,
        rate_limit_backoff = ?config.rate_limit_backoff,
        block_tolerance = config.block_tolerance,
        "checker configuration"
    );
    info!(count = config.rpc_endpoints.len(), "upstream endpoints configured");
    for url in &config.rpc_endpoints {
        debug!(%url, "endpoint");
    }
}
