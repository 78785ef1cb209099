//! Lifecycle Controller (C10): `waiting → running → ended` transitions.
//! Takes the Manager, Registry, Directory, and Store as constructor
//! parameters rather than holding back-pointers to them (§9 redesign
//! flag on cyclic references). A weak self-reference lets timer
//! callbacks re-enter the controller without requiring every call site
//! to thread an `Arc<Self>` through.

use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::event_log::{EventType, Store};
use crate::lock::ActionLockRegistry;
use crate::manager::TableManager;
use crate::registry::ConnectionRegistry;
use crate::session::{TableDirectory, TableStatus};
use crate::table::Phase;
use crate::timers::schedule;

pub struct LifecycleController {
    weak_self: Weak<LifecycleController>,
    manager: Arc<TableManager>,
    registry: Arc<ConnectionRegistry>,
    directory: Arc<TableDirectory>,
    store: Arc<dyn Store>,
    action_locks: Arc<ActionLockRegistry>,
    config: Config,
}

impl LifecycleController {
    pub fn new(
        manager: Arc<TableManager>,
        registry: Arc<ConnectionRegistry>,
        directory: Arc<TableDirectory>,
        store: Arc<dyn Store>,
        action_locks: Arc<ActionLockRegistry>,
        config: Config,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            weak_self: weak.clone(),
            manager,
            registry,
            directory,
            store,
            action_locks,
            config,
        })
    }

    fn arc(&self) -> Arc<Self> {
        self.weak_self.upgrade().expect("controller outlives its own callbacks")
    }

    /// `startTableRuntime` (§4.10): materializes a runtime for a table
    /// that has enough seated players, deals the first hand, and arms the
    /// action timeout.
    pub async fn start_table(&self, table_id: &str) {
        let Some(record) = self.directory.get(table_id) else {
            warn!(table_id, "start_table called for unknown table");
            return;
        };
        if record.status != TableStatus::Waiting {
            return;
        }
        if record.seats.values().filter(|s| s.is_active).count() < record.config.min_players_to_start as usize {
            return;
        }

        let managed = match self
            .manager
            .create(table_id.to_string(), record.config, record.seed.clone(), self.store.clone())
        {
            Ok(managed) => managed,
            Err(err) => {
                warn!(table_id, %err, "start_table found an already-live runtime");
                return;
            }
        };

        let lock_guard = self.action_locks.acquire(table_id).await;
        let mut join_seqs = Vec::new();
        {
            let mut runtime = managed.runtime.lock().await;
            for (seat_id, seat) in &record.seats {
                if seat.is_active {
                    let _ = runtime.add_player(*seat_id, seat.agent_id.clone(), seat.agent_name.clone(), seat.stack);
                    join_seqs.push((runtime.bump_seq(), *seat_id, seat.agent_id.clone()));
                }
            }
            let started_seq = runtime.bump_seq();
            let _ = runtime.start_hand();
            drop(runtime);
            drop(lock_guard);

            for (seq, seat_id, agent_id) in join_seqs {
                managed
                    .event_log
                    .log(seq, None, EventType::PlayerJoined, json!({ "seat_id": seat_id, "agent_id": agent_id }))
                    .await;
            }
            managed
                .event_log
                .log(started_seq, None, EventType::TableStarted, json!({ "config": record.config }))
                .await;
        }

        self.directory.set_status(table_id, TableStatus::Running);

        info!(table_id, "table runtime started");
        self.process_effects(table_id).await;

        for (seat_id, agent_id) in self.registry.promote_pending(table_id) {
            let runtime = managed.runtime.lock().await;
            let view = runtime.state_for_seat(seat_id);
            drop(runtime);
            self.registry.send_welcome(
                table_id,
                seat_id,
                json!({ "seat_id": seat_id, "agent_id": agent_id, "table_id": table_id }),
            );
            self.registry.send_game_state(table_id, seat_id, &view);
        }
    }

    /// Drains events off the runtime, logs and broadcasts each, then
    /// arms whichever timer the resulting state calls for. Shared by the
    /// WS action handler and by the action-timeout firing path so both
    /// produce identical fan-out.
    pub async fn process_effects(&self, table_id: &str) {
        let Some(managed) = self.manager.get(table_id) else { return };

        let events = {
            let mut runtime = managed.runtime.lock().await;
            runtime.drain_events()
        };
        for event in &events {
            managed
                .event_log
                .log(event.seq, Some(event.hand_number), event.event_type, event.payload.clone())
                .await;
            if event.event_type == EventType::StreetDealt {
                self.registry.broadcast_street_dealt(table_id, event.seq, event.payload.clone());
            }
            if event.event_type == EventType::HandComplete {
                self.registry.broadcast_hand_complete(table_id, event.seq, event.payload.clone());
            }
        }

        let (phase, current_seat, seq) = {
            let runtime = managed.runtime.lock().await;
            self.registry.broadcast_game_state(table_id, &runtime);
            (runtime.phase, runtime.current_seat, runtime.seq)
        };

        {
            let mut timer = managed.action_timer.lock().await;
            if let Some(existing) = timer.take() {
                existing.cancel();
            }
        }

        match (phase, current_seat) {
            (Phase::Ended, _) => self.arm_next_hand(table_id.to_string()).await,
            (_, Some(seat_id)) => self.arm_action_timeout(table_id.to_string(), seat_id, seq).await,
            _ => {}
        }
    }

    async fn arm_action_timeout(&self, table_id: String, seat_id: u8, seq: u64) {
        let Some(managed) = self.manager.get(&table_id) else { return };
        let timeout_ms = managed.runtime.lock().await.config.action_timeout_ms;
        let controller = self.arc();
        let handle = schedule(Duration::from_millis(timeout_ms), move || async move {
            let Some(managed) = controller.manager.get(&table_id) else { return };
            let lock_guard = controller.action_locks.acquire(&table_id).await;
            let fire = {
                let mut runtime = managed.runtime.lock().await;
                if runtime.current_seat != Some(seat_id) || runtime.seq != seq {
                    false
                } else {
                    let _ = runtime.force_fold(seat_id);
                    true
                }
            };
            drop(lock_guard);
            if fire {
                debug!(%table_id, seat_id, "action timeout fired, seat force-folded");
                controller.process_effects(&table_id).await;
            }
        });
        *managed.action_timer.lock().await = Some(handle);
    }

    async fn arm_next_hand(&self, table_id: String) {
        let Some(managed) = self.manager.get(&table_id) else { return };
        let delay = self.config.next_hand_delay_ms;
        let controller = self.arc();
        let handle = schedule(Duration::from_millis(delay), move || async move {
            let Some(managed) = controller.manager.get(&table_id) else { return };
            let lock_guard = controller.action_locks.acquire(&table_id).await;
            let started = {
                let mut runtime = managed.runtime.lock().await;
                if runtime.can_start() {
                    runtime.start_hand().unwrap_or(false)
                } else {
                    false
                }
            };
            drop(lock_guard);
            if started {
                controller.process_effects(&table_id).await;
            } else {
                controller.end_table(&table_id, "insufficient_players", "timeout").await;
            }
        });
        *managed.next_hand_timer.lock().await = Some(handle);
    }

    /// Arms (or re-arms, cancelling any prior timer) the abandonment
    /// grace timer. Called by the connection layer on every disconnect
    /// once the live player count reaches zero.
    pub async fn arm_abandonment(&self, table_id: String) {
        let Some(managed) = self.manager.get(&table_id) else { return };
        let delay = self.config.table_abandonment_grace_ms;
        let controller = self.arc();
        let handle = schedule(Duration::from_millis(delay), move || async move {
            if controller.registry.connection_count(&table_id) == 0 {
                controller.end_table(&table_id, "abandoned", "abandonment").await;
            }
        });
        *managed.abandonment_timer.lock().await = Some(handle);
    }

    pub async fn cancel_abandonment(&self, table_id: &str) {
        if let Some(managed) = self.manager.get(table_id) {
            if let Some(handle) = managed.abandonment_timer.lock().await.take() {
                handle.cancel();
            }
        }
    }

    /// `endTable` (§4.10): the single termination entrypoint. Idempotent —
    /// if the runtime is already gone, only the status update and a
    /// best-effort broadcast are attempted.
    pub async fn end_table(&self, table_id: &str, reason: &str, source: &str) {
        info!(table_id, reason, source, "ending table");
        if let Some(managed) = self.manager.get(table_id) {
            let (stacks, seq) = {
                let mut runtime = managed.runtime.lock().await;
                (runtime.seat_stacks(), runtime.bump_seq())
            };
            managed
                .event_log
                .log(seq, None, EventType::TableEnded, json!({ "reason": reason, "source": source }))
                .await;
            let _ = self.store.persist_seat_stacks(table_id.to_string(), stacks).await;

            for timer_slot in [&managed.action_timer, &managed.next_hand_timer, &managed.abandonment_timer] {
                if let Some(handle) = timer_slot.lock().await.take() {
                    handle.cancel();
                }
            }
        }

        self.registry.broadcast_table_status(table_id, "ended", true);
        self.registry.disconnect_all(table_id);
        self.manager.destroy(table_id);
        self.action_locks.remove(table_id);
        self.directory.set_status(table_id, TableStatus::Ended);
        let _ = self.store.persist_table_status(table_id.to_string(), "ended".to_string()).await;
    }
}
