//! Table Manager (C5): the process-wide table registry. A concurrent map
//! keeps membership changes (`create`/`destroy`) to a short critical
//! section while reads (`get`) stay lock-free (§4.5).

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::GameError;
use crate::event_log::{EventLog, Store};
use crate::table::{TableConfig, TableRuntime};
use crate::timers::TimerHandle;

/// Everything the lifecycle controller and the action path need to drive
/// one table. `runtime` is the only field requiring exclusive access;
/// `event_log` is internally synchronized and safe to use concurrently
/// with the runtime lock held by someone else.
pub struct ManagedTable {
    pub table_id: String,
    pub runtime: AsyncMutex<TableRuntime>,
    pub event_log: EventLog,
    pub action_timer: AsyncMutex<Option<TimerHandle>>,
    pub next_hand_timer: AsyncMutex<Option<TimerHandle>>,
    pub abandonment_timer: AsyncMutex<Option<TimerHandle>>,
}

impl ManagedTable {
    fn new(table_id: String, config: TableConfig, seed: Option<String>, store: Arc<dyn Store>) -> Self {
        let event_log = EventLog::new(table_id.clone(), store);
        Self {
            runtime: AsyncMutex::new(TableRuntime::new(table_id.clone(), config, seed)),
            event_log,
            table_id,
            action_timer: AsyncMutex::new(None),
            next_hand_timer: AsyncMutex::new(None),
            abandonment_timer: AsyncMutex::new(None),
        }
    }
}

#[derive(Default)]
pub struct TableManager {
    tables: DashMap<String, Arc<ManagedTable>>,
}

impl TableManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails `AlreadyExists` rather than silently replacing a live
    /// `ManagedTable` (and dropping its running hand, event log handle,
    /// and armed timers) out from under whoever still holds the old one.
    pub fn create(
        &self,
        table_id: String,
        config: TableConfig,
        seed: Option<String>,
        store: Arc<dyn Store>,
    ) -> Result<Arc<ManagedTable>, GameError> {
        match self.tables.entry(table_id.clone()) {
            Entry::Occupied(_) => Err(GameError::AlreadyExists(table_id)),
            Entry::Vacant(slot) => {
                let managed = Arc::new(ManagedTable::new(table_id, config, seed, store));
                slot.insert(managed.clone());
                Ok(managed)
            }
        }
    }

    pub fn get(&self, table_id: &str) -> Option<Arc<ManagedTable>> {
        self.tables.get(table_id).map(|entry| entry.clone())
    }

    pub fn has(&self, table_id: &str) -> bool {
        self.tables.contains_key(table_id)
    }

    pub fn destroy(&self, table_id: &str) -> Option<Arc<ManagedTable>> {
        self.tables.remove(table_id).map(|(_, v)| v)
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.tables.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::InMemoryStore;

    fn cfg() -> TableConfig {
        TableConfig {
            small_blind: 1,
            big_blind: 2,
            max_seats: 9,
            initial_stack: 1000,
            action_timeout_ms: 30_000,
            min_players_to_start: 2,
        }
    }

    #[tokio::test]
    async fn create_get_destroy_round_trip() {
        let manager = TableManager::new();
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        manager.create("t1".to_string(), cfg(), Some("seed".to_string()), store).unwrap();
        assert!(manager.has("t1"));
        assert_eq!(manager.len(), 1);

        let managed = manager.get("t1").unwrap();
        assert_eq!(managed.runtime.lock().await.table_id, "t1");

        manager.destroy("t1");
        assert!(!manager.has("t1"));
    }

    #[tokio::test]
    async fn create_rejects_a_table_id_already_live() {
        let manager = TableManager::new();
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        manager.create("t1".to_string(), cfg(), None, store.clone()).unwrap();
        let err = manager.create("t1".to_string(), cfg(), None, store).unwrap_err();
        assert_eq!(err, GameError::AlreadyExists("t1".to_string()));
        assert_eq!(manager.len(), 1);
    }
}
