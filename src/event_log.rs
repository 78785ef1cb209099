//! Event Log (C4): append-only per-table record, backed by an external
//! Store. Non-critical events are fire-and-forget; lifecycle events are
//! awaited and retried with bounded backoff (§4.4, §7).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    TableStarted,
    PlayerJoined,
    HandStart,
    StreetDealt,
    PlayerAction,
    Showdown,
    HandComplete,
    PlayerLeft,
    TableEnded,
}

impl EventType {
    /// Lifecycle events are awaited and retried; everything else is
    /// fire-and-forget (§4.4).
    pub fn is_lifecycle_critical(self) -> bool {
        matches!(
            self,
            EventType::TableStarted
                | EventType::HandStart
                | EventType::HandComplete
                | EventType::TableEnded
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub table_id: String,
    pub seq: u64,
    pub hand_number: Option<u64>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store write failed: {0}")]
    Write(String),
    #[error("store read failed: {0}")]
    Read(String),
}

/// The durable datastore is an external collaborator (§1); this trait is
/// the seam the core depends on. `BoxFuture` keeps it object-safe so the
/// manager can hold a single `Arc<dyn Store>` regardless of backend.
pub trait Store: Send + Sync {
    fn append_event(&self, event: EventRecord) -> BoxFuture<'static, Result<(), StoreError>>;

    fn read_events(
        &self,
        table_id: String,
        from_seq: u64,
        limit: usize,
    ) -> BoxFuture<'static, Result<Vec<EventRecord>, StoreError>>;

    fn persist_table_status(
        &self,
        table_id: String,
        status: String,
    ) -> BoxFuture<'static, Result<(), StoreError>>;

    fn persist_seat_stacks(
        &self,
        table_id: String,
        stacks: Vec<(u8, i64)>,
    ) -> BoxFuture<'static, Result<(), StoreError>>;
}

/// In-memory `Store` used by tests and by a single-process deployment that
/// has not wired a real datastore. Keeps every table's events in a `Vec`
/// guarded by a lock, which is all the "durable" guarantee this process
/// needs for its own lifetime.
#[derive(Default)]
pub struct InMemoryStore {
    events: dashmap::DashMap<String, Vec<EventRecord>>,
    statuses: dashmap::DashMap<String, String>,
    stacks: dashmap::DashMap<String, Vec<(u8, i64)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for InMemoryStore {
    fn append_event(&self, event: EventRecord) -> BoxFuture<'static, Result<(), StoreError>> {
        self.events.entry(event.table_id.clone()).or_default().push(event);
        Box::pin(async { Ok(()) })
    }

    fn read_events(
        &self,
        table_id: String,
        from_seq: u64,
        limit: usize,
    ) -> BoxFuture<'static, Result<Vec<EventRecord>, StoreError>> {
        let slice = self
            .events
            .get(&table_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.seq >= from_seq)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Box::pin(async move { Ok(slice) })
    }

    fn persist_table_status(
        &self,
        table_id: String,
        status: String,
    ) -> BoxFuture<'static, Result<(), StoreError>> {
        self.statuses.insert(table_id, status);
        Box::pin(async { Ok(()) })
    }

    fn persist_seat_stacks(
        &self,
        table_id: String,
        stacks: Vec<(u8, i64)>,
    ) -> BoxFuture<'static, Result<(), StoreError>> {
        self.stacks.insert(table_id, stacks);
        Box::pin(async { Ok(()) })
    }
}

/// Per-table append-only logger. `seq` is supplied by the caller (the
/// `TableRuntime` owns the monotonic counter); this type only mediates the
/// write to the Store and its retry policy.
pub struct EventLog {
    table_id: String,
    store: Arc<dyn Store>,
}

const CRITICAL_RETRY_ATTEMPTS: u32 = 3;
const CRITICAL_RETRY_BASE: Duration = Duration::from_millis(50);

impl EventLog {
    pub fn new(table_id: String, store: Arc<dyn Store>) -> Self {
        Self { table_id, store }
    }

    /// Logs an event, choosing the await-and-retry path for lifecycle
    /// events and a fire-and-forget spawn for everything else.
    pub async fn log(
        &self,
        seq: u64,
        hand_number: Option<u64>,
        event_type: EventType,
        payload: Value,
    ) {
        let record = EventRecord {
            table_id: self.table_id.clone(),
            seq,
            hand_number,
            event_type,
            payload,
            created_at: Utc::now(),
        };

        if event_type.is_lifecycle_critical() {
            self.log_with_retry(record).await;
        } else {
            let store = self.store.clone();
            tokio::spawn(async move {
                if let Err(err) = store.append_event(record).await {
                    warn!(error = %err, "non-critical event write failed, dropping");
                }
            });
        }
    }

    async fn log_with_retry(&self, record: EventRecord) {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.append_event(record.clone()).await {
                Ok(()) => return,
                Err(err) if attempt < CRITICAL_RETRY_ATTEMPTS => {
                    warn!(error = %err, attempt, "lifecycle event write failed, retrying");
                    tokio::time::sleep(CRITICAL_RETRY_BASE * attempt).await;
                }
                Err(err) => {
                    error!(error = %err, seq = record.seq, "lifecycle event write failed permanently");
                    return;
                }
            }
        }
    }

    pub async fn range(&self, from_seq: u64, limit: usize) -> Result<Vec<EventRecord>, StoreError> {
        self.store.read_events(self.table_id.clone(), from_seq, limit).await
    }
}
