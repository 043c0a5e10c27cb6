//! Best-endpoint selection.
//!
//! A selection pass probes every endpoint in parallel, snapshots the records,
//! filters to reachable non-rate-limited candidates within the block
//! tolerance of the observed tip, and publishes the lowest-latency survivor.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::{
    endpoint::{EndpointPool, EndpointStatus},
    metrics,
    probe::Prober,
    publisher::CurrentBest,
};

/// Runs selection passes over the endpoint pool.
#[derive(Debug)]
pub struct Selector {
    pool: Arc<EndpointPool>,
    best: Arc<CurrentBest>,
    prober: Prober,
    block_tolerance: i64,
}

impl Selector {
    /// Create a selector over the given pool and current-best slot.
    #[must_use]
    pub const fn new(
        pool: Arc<EndpointPool>,
        best: Arc<CurrentBest>,
        prober: Prober,
        block_tolerance: i64,
    ) -> Self {
        Self { pool, best, prober, block_tolerance }
    }

    /// The pool this selector probes.
    #[must_use]
    pub fn pool(&self) -> &Arc<EndpointPool> {
        &self.pool
    }

    /// Run one full selection pass: probe everything, then re-publish.
    ///
    /// Individual probe failures never abort the pass. When no endpoint
    /// qualifies the previously published endpoint stays in force, so the
    /// proxy always has a target it can at least attempt.
    pub async fn run_once(&self) {
        debug!("checking for the best RPC endpoint");

        let handles: Vec<_> = self
            .pool
            .endpoints()
            .iter()
            .map(|endpoint| {
                let endpoint = Arc::clone(endpoint);
                let prober = self.prober.clone();
                tokio::spawn(async move { prober.probe(&endpoint).await })
            })
            .collect();
        for result in join_all(handles).await {
            if let Err(err) = result {
                warn!(error = %err, "probe task failed");
            }
        }

        let mut snapshots = Vec::with_capacity(self.pool.len());
        for endpoint in self.pool.endpoints() {
            snapshots.push(endpoint.snapshot().await);
        }

        let Some(winner_idx) = choose(&snapshots, self.block_tolerance) else {
            warn!("no reachable, non-rate-limited endpoints; keeping current best");
            for endpoint in self.pool.endpoints() {
                metrics::set_current_best(endpoint.url().as_str(), false);
            }
            return;
        };

        let winner = self.pool.endpoints()[winner_idx].clone();
        let previous = self.best.get().await;
        self.best.publish(winner.clone()).await;

        let chosen = &snapshots[winner_idx];
        if Arc::ptr_eq(&previous, &winner) {
            debug!(
                endpoint = %winner.url(),
                block = chosen.block_number,
                latency = ?chosen.latency,
                "best endpoint reaffirmed"
            );
        } else {
            info!(
                endpoint = %winner.url(),
                block = chosen.block_number,
                latency = ?chosen.latency,
                "new best endpoint"
            );
        }

        for (idx, endpoint) in self.pool.endpoints().iter().enumerate() {
            metrics::set_current_best(endpoint.url().as_str(), idx == winner_idx);
        }
    }
}

/// Apply the selection policy to a set of record snapshots.
///
/// Returns the index of the chosen record, or `None` when no record is both
/// reachable and free of rate limiting. Candidates more than `tolerance`
/// blocks behind the highest observed head are filtered out; if that filter
/// empties the set the full candidate set is used instead. Latency ties go to
/// the earlier-configured record.
fn choose(snapshots: &[EndpointStatus], tolerance: i64) -> Option<usize> {
    let candidates: Vec<usize> = snapshots
        .iter()
        .enumerate()
        .filter(|(_, status)| status.reachable && !status.rate_limited)
        .map(|(idx, _)| idx)
        .collect();

    let highest = candidates.iter().map(|&idx| snapshots[idx].block_number).max()?;
    let threshold = highest.saturating_sub(tolerance);

    let fresh: Vec<usize> =
        candidates.iter().copied().filter(|&idx| snapshots[idx].block_number >= threshold).collect();
    let eligible = if fresh.is_empty() { candidates } else { fresh };

    eligible.into_iter().reduce(|best, idx| {
        if snapshots[idx].latency < snapshots[best].latency { idx } else { best }
    })
}
