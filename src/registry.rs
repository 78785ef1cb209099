//! Connection Registry + Broadcaster (C7): the only writer of WebSocket
//! sinks. Holds per-table player and observer maps and fans state changes
//! out to each recipient's permitted projection (§4.7).

use axum::extract::ws::{CloseFrame, Message};
use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::table::{TableRuntime, TableView};

/// Envelope wrapping every server→client frame (§4.7).
#[derive(Debug, Clone, Serialize)]
pub struct ServerEnvelope {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    pub ts: chrono::DateTime<Utc>,
    pub payload: Value,
}

impl ServerEnvelope {
    pub fn new(msg_type: &'static str, table_id: Option<String>, seq: Option<u64>, payload: Value) -> Self {
        Self {
            msg_type,
            table_id,
            seq,
            ts: Utc::now(),
            payload,
        }
    }

    pub fn to_text(&self) -> Message {
        Message::Text(serde_json::to_string(self).expect("envelope is always serializable"))
    }
}

/// Projects a full `TableView` into the compact wire shape (§4.7): renamed
/// fields, omitted falsey keys, side pots summed into one `pot`.
pub fn compact_game_state(view: &TableView) -> Value {
    let pot: i64 = view.pots.iter().map(|p| p.amount).sum();
    let players: Vec<Value> = view
        .seats
        .iter()
        .map(|s| {
            let mut obj = json!({
                "seat": s.seat_id,
                "name": s.agent_name,
                "stack": s.stack,
                "bet": s.bet,
            });
            let map = obj.as_object_mut().unwrap();
            if s.folded {
                map.insert("folded".to_string(), json!(true));
            }
            if s.all_in {
                map.insert("allIn".to_string(), json!(true));
            }
            if let Some(cards) = s.hole_cards {
                map.insert("cards".to_string(), json!([cards[0].short(), cards[1].short()]));
            }
            obj
        })
        .collect();

    let mut out = json!({
        "hand": view.hand_number,
        "phase": view.phase,
        "board": view.community_cards.iter().map(|c| c.short()).collect::<Vec<_>>(),
        "pot": pot,
        "players": players,
        "dealer": view.dealer_seat,
    });
    let map = out.as_object_mut().unwrap();
    if let Some(turn) = view.current_seat {
        map.insert("turn".to_string(), json!(turn));
    }
    if let Some(actions) = &view.legal_actions {
        map.insert("actions".to_string(), json!(actions));
    }
    if let Some(to_call) = view.to_call {
        if to_call != 0 {
            map.insert("toCall".to_string(), json!(to_call));
        }
    }
    if let Some(token) = &view.turn_token {
        map.insert("turn_token".to_string(), json!(token));
    }
    out
}

struct PlayerConn {
    agent_id: String,
    sender: UnboundedSender<Message>,
    compact: bool,
}

struct ObserverConn {
    sender: UnboundedSender<Message>,
    show_cards: bool,
    compact: bool,
}

/// A socket that connected before the table runtime existed (join arrived
/// during `waiting`); promoted once the Lifecycle Controller starts it.
struct PendingConn {
    seat_id: u8,
    agent_id: String,
    sender: UnboundedSender<Message>,
    compact: bool,
}

#[derive(Default)]
struct TableConnections {
    players: DashMap<u8, PlayerConn>,
    observers: DashMap<String, ObserverConn>,
    pending: DashMap<String, PendingConn>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    tables: DashMap<String, TableConnections>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, table_id: &str) -> dashmap::mapref::one::RefMut<'_, String, TableConnections> {
        self.tables.entry(table_id.to_string()).or_default()
    }

    /// Registers a live player socket, replacing any prior sink for the
    /// same agent (last-writer-wins on reconnect).
    pub fn register(&self, table_id: &str, agent_id: String, seat_id: u8, sender: UnboundedSender<Message>, compact: bool) {
        let table = self.table(table_id);
        table.players.insert(
            seat_id,
            PlayerConn {
                agent_id,
                sender,
                compact,
            },
        );
    }

    pub fn register_pending(&self, table_id: &str, agent_id: String, seat_id: u8, sender: UnboundedSender<Message>, compact: bool) {
        let table = self.table(table_id);
        table.pending.insert(
            agent_id.clone(),
            PendingConn {
                seat_id,
                agent_id,
                sender,
                compact,
            },
        );
    }

    pub fn unregister(&self, table_id: &str, seat_id: u8) {
        if let Some(table) = self.tables.get(table_id) {
            table.players.remove(&seat_id);
        }
    }

    pub fn register_observer(&self, table_id: &str, observer_id: String, sender: UnboundedSender<Message>, show_cards: bool, compact: bool) {
        let table = self.table(table_id);
        table.observers.insert(
            observer_id,
            ObserverConn {
                sender,
                show_cards,
                compact,
            },
        );
    }

    pub fn unregister_observer(&self, table_id: &str, observer_id: &str) {
        if let Some(table) = self.tables.get(table_id) {
            table.observers.remove(observer_id);
        }
    }

    /// Converts every pending connection into a live player connection,
    /// returning `(seat_id, agent_id)` pairs so the caller can send
    /// welcome + initial state to each (§4.10).
    pub fn promote_pending(&self, table_id: &str) -> Vec<(u8, String)> {
        let table = self.table(table_id);
        let keys: Vec<String> = table.pending.iter().map(|e| e.key().clone()).collect();
        let mut promoted = Vec::new();
        for key in keys {
            let Some((agent_id, conn)) = table.pending.remove(&key) else { continue };
            table.players.insert(
                conn.seat_id,
                PlayerConn {
                    agent_id: agent_id.clone(),
                    sender: conn.sender,
                    compact: conn.compact,
                },
            );
            promoted.push((conn.seat_id, agent_id));
        }
        promoted
    }

    pub fn send_welcome(&self, table_id: &str, seat_id: u8, payload: Value) {
        self.send_to_player(table_id, seat_id, "welcome", None, payload);
    }

    pub fn send_ack(&self, table_id: &str, seat_id: u8, seq: u64, payload: Value) {
        self.send_to_player(table_id, seat_id, "ack", Some(seq), payload);
    }

    pub fn send_error(&self, table_id: &str, seat_id: u8, payload: Value) {
        self.send_to_player(table_id, seat_id, "error", None, payload);
    }

    pub fn send_game_state(&self, table_id: &str, seat_id: u8, view: &TableView) {
        if let Some(table) = self.tables.get(table_id) {
            if let Some(conn) = table.players.get(&seat_id) {
                let payload = if conn.compact { compact_game_state(view) } else { serde_json::to_value(view).unwrap() };
                let env = ServerEnvelope::new("game_state", Some(table_id.to_string()), Some(view.seq), payload);
                let _ = conn.sender.send(env.to_text());
            }
        }
    }

    fn send_to_player(&self, table_id: &str, seat_id: u8, msg_type: &'static str, seq: Option<u64>, payload: Value) {
        if let Some(table) = self.tables.get(table_id) {
            if let Some(conn) = table.players.get(&seat_id) {
                let env = ServerEnvelope::new(msg_type, Some(table_id.to_string()), seq, payload);
                let _ = conn.sender.send(env.to_text());
            }
        }
    }

    /// Sends each player their private view and each observer the public
    /// view (§4.7).
    pub fn broadcast_game_state(&self, table_id: &str, runtime: &TableRuntime) {
        let Some(table) = self.tables.get(table_id) else { return };
        for entry in table.players.iter() {
            let seat_id = *entry.key();
            let conn = entry.value();
            let view = runtime.state_for_seat(seat_id);
            let payload = if conn.compact { compact_game_state(&view) } else { serde_json::to_value(&view).unwrap() };
            let env = ServerEnvelope::new("game_state", Some(table_id.to_string()), Some(view.seq), payload);
            let _ = conn.sender.send(env.to_text());
        }
        for entry in table.observers.iter() {
            let conn = entry.value();
            let view = runtime.public_state();
            let payload = if conn.compact { compact_game_state(&view) } else { serde_json::to_value(&view).unwrap() };
            let env = ServerEnvelope::new("game_state", Some(table_id.to_string()), Some(view.seq), payload);
            let _ = conn.sender.send(env.to_text());
        }
    }

    pub fn broadcast_hand_complete(&self, table_id: &str, seq: u64, payload: Value) {
        self.broadcast_all(table_id, "hand_complete", Some(seq), payload);
    }

    pub fn broadcast_street_dealt(&self, table_id: &str, seq: u64, payload: Value) {
        self.broadcast_all(table_id, "street_dealt", Some(seq), payload);
    }

    pub fn broadcast_player_joined(&self, table_id: &str, payload: Value) {
        self.broadcast_all(table_id, "player_joined", None, payload);
    }

    pub fn broadcast_player_left(&self, table_id: &str, payload: Value) {
        self.broadcast_all(table_id, "player_left", None, payload);
    }

    pub fn broadcast_table_status(&self, table_id: &str, status: &str, include_observers: bool) {
        let payload = json!({ "status": status });
        let Some(table) = self.tables.get(table_id) else { return };
        for entry in table.players.iter() {
            let env = ServerEnvelope::new("table_status", Some(table_id.to_string()), None, payload.clone());
            let _ = entry.value().sender.send(env.to_text());
        }
        if include_observers {
            for entry in table.observers.iter() {
                let env = ServerEnvelope::new("table_status", Some(table_id.to_string()), None, payload.clone());
                let _ = entry.value().sender.send(env.to_text());
            }
        }
    }

    fn broadcast_all(&self, table_id: &str, msg_type: &'static str, seq: Option<u64>, payload: Value) {
        let Some(table) = self.tables.get(table_id) else { return };
        for entry in table.players.iter() {
            let env = ServerEnvelope::new(msg_type, Some(table_id.to_string()), seq, payload.clone());
            let _ = entry.value().sender.send(env.to_text());
        }
        for entry in table.observers.iter() {
            let env = ServerEnvelope::new(msg_type, Some(table_id.to_string()), seq, payload.clone());
            let _ = entry.value().sender.send(env.to_text());
        }
    }

    /// Closes every sink with a normal-closure frame and drops the
    /// table's connection state entirely.
    pub fn disconnect_all(&self, table_id: &str) {
        if let Some((_, table)) = self.tables.remove(table_id) {
            let close = || {
                Message::Close(Some(CloseFrame {
                    code: 1000,
                    reason: "table_ended".into(),
                }))
            };
            for entry in table.players.iter() {
                let _ = entry.value().sender.send(close());
            }
            for entry in table.observers.iter() {
                let _ = entry.value().sender.send(close());
            }
            debug!(table_id, "disconnected all sockets for table");
        }
    }

    pub fn connection_count(&self, table_id: &str) -> usize {
        self.tables.get(table_id).map(|t| t.players.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::TableConfig;
    use tokio::sync::mpsc;

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

    #[test]
    fn register_then_unregister_updates_connection_count() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.register("t1", "agent-0".to_string(), 0, tx, false);
        assert_eq!(registry.connection_count("t1"), 1);
        registry.unregister("t1", 0);
        assert_eq!(registry.connection_count("t1"), 0);
    }

    #[test]
    fn pending_connections_promote_into_players() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.register_pending("t1", "agent-0".to_string(), 3, tx, true);
        assert_eq!(registry.connection_count("t1"), 0);
        let promoted = registry.promote_pending("t1");
        assert_eq!(promoted, vec![(3, "agent-0".to_string())]);
        assert_eq!(registry.connection_count("t1"), 1);
    }

    #[test]
    fn compact_game_state_omits_falsey_fields() {
        let mut rt = crate::table::TableRuntime::new("t1".to_string(), cfg(), Some("seed".to_string()));
        rt.add_player(0, "a0".into(), "Alice".into(), 1000).unwrap();
        rt.add_player(1, "a1".into(), "Bob".into(), 1000).unwrap();
        rt.start_hand().unwrap();
        let view = rt.public_state();
        let compact = compact_game_state(&view);
        let players = compact["players"].as_array().unwrap();
        assert!(players[0].get("folded").is_none());
        assert!(players[0].get("cards").is_none());
    }
}
