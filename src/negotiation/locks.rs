//! Per-item critical sections
//!
//! Every transition that reads and then writes an item or its conversation
//! holds the write side of that item's lock; snapshots hold the read side.
//! Locks of different items are independent.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::domain::ItemId;

/// Registry size above which idle entries are dropped
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Default)]
pub struct ItemLocks {
    locks: Mutex<HashMap<ItemId, Arc<RwLock<()>>>>,
}

impl ItemLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, item_id: &str) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().await;
        if locks.len() > PRUNE_THRESHOLD {
            // Only the registry holds an idle lock
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks
            .entry(item_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Exclusive access for a transition on `item_id`
    pub async fn write(&self, item_id: &str) -> OwnedRwLockWriteGuard<()> {
        self.entry(item_id).await.write_owned().await
    }

    /// Shared access for a consistent snapshot of `item_id`
    pub async fn read(&self, item_id: &str) -> OwnedRwLockReadGuard<()> {
        self.entry(item_id).await.read_owned().await
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}
