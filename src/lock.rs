//! Action Lock (C6): serializes mutating operations against a single
//! table so concurrent WS frames and timer fires cannot interleave their
//! reads and writes of `TableRuntime` (§4.6). Never held across I/O — the
//! guard is dropped before any event-log write or broadcast.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct ActionLockRegistry {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ActionLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the per-table lock, creating it on first use. The returned
    /// guard releases the lock on drop; callers must not hold it across an
    /// `.await` on external I/O (event log writes, broadcasts).
    pub async fn acquire(&self, table_id: &str) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(table_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    pub fn remove(&self, table_id: &str) {
        self.locks.remove(table_id);
    }
}
