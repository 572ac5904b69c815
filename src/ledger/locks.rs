use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-lease async mutex.
///
/// Recording a payment and rebuilding a ledger are read-modify-write cycles
/// over every payment of one lease. Holding the lease's guard for the whole
/// cycle keeps two cycles on the same lease from interleaving; different
/// leases never wait on each other.
#[derive(Clone, Default)]
pub struct LeaseLocks {
    slots: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl LeaseLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, lease_id: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop slots nobody holds or waits on.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots.entry(lease_id.to_string()).or_default().clone()
        };
        slot.lock_owned().await
    }

    #[cfg(test)]
    pub fn tracked(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
