//! The current-best slot.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::endpoint::Endpoint;

/// Single-slot holder of the published best endpoint.
///
/// Read once per proxied request, written once per selector pass. Seeded with
/// the first configured endpoint so a read never observes an empty slot, even
/// before the first probe has run. Writers exclude each other; readers only
/// clone an `Arc` under a briefly-held lock.
#[derive(Debug)]
pub struct CurrentBest {
    slot: RwLock<Arc<Endpoint>>,
}

impl CurrentBest {
    /// Create the slot with its initial endpoint.
    #[must_use]
    pub fn new(initial: Arc<Endpoint>) -> Self {
        Self { slot: RwLock::new(initial) }
    }

    /// The currently published endpoint.
    pub async fn get(&self) -> Arc<Endpoint> {
        self.slot.read().await.clone()
    }

    /// Publish a new best endpoint.
    ///
    /// The write is unconditional: republishing the same endpoint reaffirms
    /// it without special-case logic.
    pub async fn publish(&self, endpoint: Arc<Endpoint>) {
        *self.slot.write().await = endpoint;
    }
}
