//! Periodic and on-demand selection scheduling.

use std::{sync::Arc, time::Duration};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use crate::selector::Selector;

/// Fire-and-forget handle for requesting an out-of-cycle selection pass.
///
/// Backed by a capacity-1 channel: a burst of requests (for example several
/// concurrent 429 responses from the same upstream) coalesces into one extra
/// pass. Firing never blocks and never fails.
#[derive(Debug, Clone)]
pub struct SelectorTrigger {
    tx: mpsc::Sender<()>,
}

impl SelectorTrigger {
    /// Request an out-of-cycle selection pass.
    pub fn fire(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Create a trigger and the receiver the [`Scheduler`] consumes.
#[must_use]
pub fn selector_trigger() -> (SelectorTrigger, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel(1);
    (SelectorTrigger { tx }, rx)
}

/// Drives the [`Selector`] on a fixed cadence and on demand.
#[derive(Debug)]
pub struct Scheduler {
    selector: Arc<Selector>,
    interval: Duration,
    trigger: mpsc::Receiver<()>,
    shutdown: broadcast::Receiver<()>,
}

impl Scheduler {
    /// Create a scheduler ticking every `interval`.
    #[must_use]
    pub const fn new(
        selector: Arc<Selector>,
        interval: Duration,
        trigger: mpsc::Receiver<()>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self { selector, interval, trigger, shutdown }
    }

    /// Run one selection pass now, then tick in the background.
    ///
    /// The first pass completes before this returns, so the published
    /// endpoint reflects real measurements by the time the listeners start
    /// serving. The returned handle resolves once the shutdown signal fires
    /// and the in-flight pass (bounded by the probe timeout) finishes.
    pub async fn start(self) -> tokio::task::JoinHandle<()> {
        self.selector.run_once().await;
        info!(interval = ?self.interval, "periodic endpoint checker started");
        tokio::spawn(self.run_loop())
    }

    async fn run_loop(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        // The first tick of a fresh interval completes immediately; the
        // initial pass already ran.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.selector.run_once().await;
                }
                Some(()) = self.trigger.recv() => {
                    debug!("out-of-cycle selection requested");
                    self.selector.run_once().await;
                }
                _ = self.shutdown.recv() => {
                    info!("endpoint checker stopping");
                    return;
                }
            }
        }
    }
}
