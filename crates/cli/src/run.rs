//! Gateway assembly and server lifecycle.
//!
//! Wires the endpoint pool, prober, selector and scheduler together, starts
//! the proxy and metrics listeners, and shuts everything down gracefully on
//! SIGINT/SIGTERM with a bounded drain window.

use std::{future::IntoFuture, net::SocketAddr, sync::Arc};

use eyre::{Context, Result};
use tokio::sync::broadcast;
use tracing::{info, warn};
use turnout_config::GatewayConfig;
use turnout_pool::{CurrentBest, EndpointPool, Prober, Scheduler, Selector, selector_trigger};
use turnout_server::{GatewayMetrics, ProxyState, metrics_router, proxy_router};

/// How long in-flight requests get to finish after a shutdown signal.
const DRAIN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Run the gateway until a termination signal arrives.
///
/// # Errors
///
/// Returns an error on startup failure: no usable endpoints, an HTTP client
/// that cannot be built, unbindable listeners, or a metrics recorder that is
/// already installed.
pub(crate) async fn run(config: GatewayConfig) -> Result<()> {
    let pool = Arc::new(EndpointPool::from_urls(&config.rpc_endpoints)?);
    info!(count = pool.len(), initial = %pool.first().url(), "gateway initialized");

    let client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .wrap_err("failed to build HTTP client")?;

    let best = Arc::new(CurrentBest::new(pool.first()));
    let prober = Prober::new(client.clone(), config.rate_limit_backoff);
    let selector =
        Arc::new(Selector::new(pool, best.clone(), prober, config.block_tolerance));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let (trigger, trigger_rx) = selector_trigger();
    let scheduler =
        Scheduler::new(selector, config.check_interval, trigger_rx, shutdown_tx.subscribe());
    // The first pass completes here, before the listeners bind, so the
    // published endpoint reflects real measurements from the start.
    let scheduler_handle = scheduler.start().await;

    let state = Arc::new(ProxyState::new(best, client, config.rate_limit_backoff, trigger));
    let app = proxy_router(state);

    let gateway_addr = config.gateway_addr()?;
    let listener = tokio::net::TcpListener::bind(gateway_addr)
        .await
        .wrap_err_with(|| format!("failed to bind to {gateway_addr}"))?;
    info!(address = %gateway_addr, "gateway listening");

    let metrics_addr = config.metrics_addr()?;
    let metrics_listener = tokio::net::TcpListener::bind(metrics_addr)
        .await
        .wrap_err_with(|| format!("failed to bind metrics server to {metrics_addr}"))?;
    info!(address = %metrics_addr, "metrics listening");

    let metrics =
        Arc::new(GatewayMetrics::new().wrap_err("failed to initialize metrics recorder")?);
    let metrics_app = metrics_router(metrics);

    let mut metrics_shutdown = shutdown_tx.subscribe();
    let metrics_handle = tokio::spawn(async move {
        let shutdown = async move {
            metrics_shutdown.recv().await.ok();
        };
        axum::serve(metrics_listener, metrics_app).with_graceful_shutdown(shutdown).await.ok();
    });

    let shutdown = {
        let shutdown_tx = shutdown_tx.clone();
        async move {
            shutdown_signal().await;
            shutdown_tx.send(()).ok();
        }
    };

    let mut drain_rx = shutdown_tx.subscribe();
    let serve = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown)
        .into_future();
    tokio::select! {
        result = serve => result.wrap_err("server error")?,
        () = async {
            drain_rx.recv().await.ok();
            tokio::time::sleep(DRAIN_TIMEOUT).await;
        } => {
            warn!("drain window elapsed, forcing shutdown");
        }
    }

    scheduler_handle.await.ok();
    metrics_handle.await.ok();
    info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM on Unix).
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {
            info!("received SIGTERM, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            info!("received SIGINT, initiating graceful shutdown");
        }
    }
}

/// Wait for a shutdown signal (Ctrl+C on non-Unix platforms).
#[cfg(not(unix))]
async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    info!("received Ctrl+C, initiating graceful shutdown");
}
