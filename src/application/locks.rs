use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

type Slot = Arc<tokio::sync::Mutex<()>>;

/// Serialises mutations of one buyer order's row set (the buyer order and all
/// its sub-orders) within the process.
///
/// Cloning shares the lock table, so every service that mutates orders must be
/// built from the same `RowLocks`.
#[derive(Clone, Default)]
pub struct RowLocks {
    slots: Arc<Mutex<HashMap<Uuid, Slot>>>,
}

pub struct RowGuard {
    _guard: OwnedMutexGuard<()>,
}

impl RowLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until the row set of `buyer_order_id` is free and takes it.
    pub async fn acquire(&self, buyer_order_id: Uuid) -> RowGuard {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            // Drop slots nobody holds or waits on.
            slots.retain(|id, slot| *id == buyer_order_id || Arc::strong_count(slot) > 1);
            slots.entry(buyer_order_id).or_default().clone()
        };
        RowGuard {
            _guard: slot.lock_owned().await,
        }
    }
}
