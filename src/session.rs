//! Session & Join Service (C9): seat assignment, session tokens, and the
//! table directory backing `GET /v1/tables` (§4.9, §6).
//!
//! The distilled spec names no "create table" endpoint; table creation is
//! an external/admin concern (§1's out-of-scope list). We model that
//! boundary with `TableDirectory::create_table`, called once per table at
//! process start in `main` rather than exposed over HTTP — see DESIGN.md.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

use crate::config::Config;
use crate::error::{ApiError, ErrorCode};
use crate::lifecycle::LifecycleController;
use crate::lock::ActionLockRegistry;
use crate::manager::TableManager;
use crate::registry::ConnectionRegistry;
use crate::table::TableConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Waiting,
    Running,
    Ended,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeatRecord {
    pub agent_id: String,
    pub agent_name: String,
    pub stack: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableRecord {
    pub table_id: String,
    pub config: TableConfig,
    pub seed: Option<String>,
    pub status: TableStatus,
    pub seats: BTreeMap<u8, SeatRecord>,
    pub created_at: DateTime<Utc>,
}

impl TableRecord {
    fn seated_count(&self) -> usize {
        self.seats.values().filter(|s| s.is_active).count()
    }

    fn lowest_free_seat(&self) -> Option<u8> {
        (0..self.config.max_seats).find(|s| !self.seats.contains_key(s))
    }
}

/// Table metadata that exists independent of whether a runtime is live —
/// the in-memory stand-in for the `tables`/`seats` persisted rows (§6).
#[derive(Default)]
pub struct TableDirectory {
    tables: DashMap<String, TableRecord>,
}

impl TableDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&self, table_id: String, config: TableConfig, seed: Option<String>) {
        self.tables.insert(
            table_id.clone(),
            TableRecord {
                table_id,
                config,
                seed,
                status: TableStatus::Waiting,
                seats: BTreeMap::new(),
                created_at: Utc::now(),
            },
        );
    }

    pub fn get(&self, table_id: &str) -> Option<TableRecord> {
        self.tables.get(table_id).map(|e| e.clone())
    }

    /// Lists tables, excluding `running` rows with no live runtime (a
    /// crashed-and-restarted process would otherwise show a ghost table).
    pub fn list(&self, status_filter: Option<TableStatus>, manager: &TableManager) -> Vec<TableRecord> {
        self.tables
            .iter()
            .filter(|e| status_filter.map_or(true, |f| e.status == f))
            .filter(|e| e.status != TableStatus::Running || manager.has(e.key()))
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn set_status(&self, table_id: &str, status: TableStatus) {
        if let Some(mut rec) = self.tables.get_mut(table_id) {
            rec.status = status;
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub agent_id: String,
    pub table_id: String,
    pub seat_id: u8,
    pub expires_at: DateTime<Utc>,
}

pub struct SessionStore {
    sessions: DashMap<String, Session>,
    signing_secret: String,
}

impl SessionStore {
    pub fn new(signing_secret: String) -> Self {
        Self {
            sessions: DashMap::new(),
            signing_secret,
        }
    }

    fn sign(&self, session_id: &str) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(self.signing_secret.as_bytes()).expect("HMAC accepts a key of any length");
        mac.update(session_id.as_bytes());
        mac
    }

    /// Mints a session and returns its opaque, signed token —
    /// `{session_id}.{hmac}` — so a forged or bit-flipped token is rejected
    /// by `validate` before it ever touches the session map.
    fn issue(&self, agent_id: String, table_id: String, seat_id: u8, lifetime: Duration) -> (Session, String) {
        let session_id = Uuid::new_v4().to_string();
        let token = format!("{session_id}.{:x}", self.sign(&session_id).finalize().into_bytes());
        let session = Session {
            session_id: session_id.clone(),
            agent_id,
            table_id,
            seat_id,
            expires_at: Utc::now() + lifetime,
        };
        self.sessions.insert(session_id, session.clone());
        (session, token)
    }

    pub fn validate(&self, token: &str) -> Result<Session, ApiError> {
        let (session_id, mac_hex) = token
            .split_once('.')
            .ok_or_else(|| ApiError::new(ErrorCode::InvalidSession, "malformed session token"))?;
        let signature = decode_hex(mac_hex)
            .ok_or_else(|| ApiError::new(ErrorCode::InvalidSession, "malformed session token"))?;
        self.sign(session_id)
            .verify_slice(&signature)
            .map_err(|_| ApiError::new(ErrorCode::InvalidSession, "session token signature mismatch"))?;

        let session = self
            .sessions
            .get(session_id)
            .map(|e| e.clone())
            .ok_or_else(|| ApiError::new(ErrorCode::InvalidSession, "unknown session token"))?;
        if session.expires_at < Utc::now() {
            return Err(ApiError::new(ErrorCode::SessionExpired, "session has expired"));
        }
        Ok(session)
    }

    fn revoke_for(&self, agent_id: &str, table_id: &str) {
        self.sessions
            .retain(|_, s| !(s.agent_id == agent_id && s.table_id == table_id));
    }
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}

#[derive(Debug, Serialize)]
pub struct JoinResult {
    pub table_id: String,
    pub seat_id: u8,
    pub session_token: String,
    pub ws_url: String,
    pub protocol_version: u32,
    pub min_supported_protocol_version: u32,
    pub action_timeout_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct LeaveResult {
    pub success: bool,
    pub message: String,
}

pub struct SessionService {
    directory: Arc<TableDirectory>,
    sessions: Arc<SessionStore>,
    manager: Arc<TableManager>,
    registry: Arc<ConnectionRegistry>,
    lifecycle: Arc<LifecycleController>,
    action_locks: Arc<ActionLockRegistry>,
    config: Config,
}

impl SessionService {
    pub fn new(
        directory: Arc<TableDirectory>,
        sessions: Arc<SessionStore>,
        manager: Arc<TableManager>,
        registry: Arc<ConnectionRegistry>,
        lifecycle: Arc<LifecycleController>,
        action_locks: Arc<ActionLockRegistry>,
        config: Config,
    ) -> Self {
        Self {
            directory,
            sessions,
            manager,
            registry,
            lifecycle,
            action_locks,
            config,
        }
    }

    pub async fn join(
        &self,
        table_id: &str,
        agent_id: &str,
        agent_name: &str,
        preferred_seat: Option<u8>,
        client_protocol_version: Option<u32>,
    ) -> Result<JoinResult, ApiError> {
        if let Some(v) = client_protocol_version {
            if v < self.config.min_supported_protocol_version {
                return Err(ApiError::new(ErrorCode::OutdatedClient, "client protocol version too old"));
            }
        }

        let mut record = self
            .directory
            .get(table_id)
            .ok_or_else(|| ApiError::new(ErrorCode::TableNotFound, "no such table"))?;

        if record.status == TableStatus::Ended {
            return Err(ApiError::new(ErrorCode::TableEnded, "table has ended"));
        }
        if record.status != TableStatus::Waiting && !self.manager.has(table_id) {
            return Err(ApiError::new(ErrorCode::InvalidTableState, "table runtime unavailable"));
        }
        if record.seats.values().any(|s| s.agent_id == agent_id && s.is_active) {
            return Err(ApiError::new(ErrorCode::AlreadySeated, "agent already seated at this table"));
        }

        let seat_id = match preferred_seat {
            Some(s) if !record.seats.contains_key(&s) && (s as usize) < record.config.max_seats as usize => s,
            Some(_) => record
                .lowest_free_seat()
                .ok_or_else(|| ApiError::new(ErrorCode::TableFull, "no free seats"))?,
            None => record
                .lowest_free_seat()
                .ok_or_else(|| ApiError::new(ErrorCode::TableFull, "no free seats"))?,
        };

        record.seats.insert(
            seat_id,
            SeatRecord {
                agent_id: agent_id.to_string(),
                agent_name: agent_name.to_string(),
                stack: record.config.initial_stack,
                is_active: true,
            },
        );
        self.directory.tables.insert(table_id.to_string(), record.clone());

        let (_session, token) = self.sessions.issue(
            agent_id.to_string(),
            table_id.to_string(),
            seat_id,
            Duration::seconds(self.config.session_lifetime_secs),
        );

        // Late join: a runtime is already live, so add the seat to it
        // directly and broadcast instead of waiting for a lifecycle start.
        if let Some(managed) = self.manager.get(table_id) {
            let lock_guard = self.action_locks.acquire(table_id).await;
            let mut runtime = managed.runtime.lock().await;
            let result = runtime.add_player(seat_id, agent_id.to_string(), agent_name.to_string(), record.config.initial_stack);
            drop(runtime);
            drop(lock_guard);
            result.map_err(ApiError::from)?;
            self.registry.broadcast_player_joined(table_id, serde_json::json!({ "seat_id": seat_id, "agent_name": agent_name }));
        } else if record.seated_count() >= record.config.min_players_to_start {
            self.lifecycle.start_table(table_id).await;
        }

        Ok(JoinResult {
            table_id: table_id.to_string(),
            seat_id,
            session_token: token.clone(),
            ws_url: format!("/v1/ws?token={token}"),
            protocol_version: self.config.protocol_version,
            min_supported_protocol_version: self.config.min_supported_protocol_version,
            action_timeout_ms: self.config.default_action_timeout_ms,
        })
    }

    pub async fn leave(&self, table_id: &str, agent_id: &str) -> Result<LeaveResult, ApiError> {
        let Some(mut record) = self.directory.get(table_id) else {
            return Ok(LeaveResult {
                success: true,
                message: "table not found, nothing to do".to_string(),
            });
        };
        if record.status == TableStatus::Ended {
            return Ok(LeaveResult {
                success: true,
                message: "table already ended".to_string(),
            });
        }

        let seat_id = record.seats.iter().find(|(_, s)| s.agent_id == agent_id).map(|(id, _)| *id);
        if let Some(seat_id) = seat_id {
            record.seats.remove(&seat_id);
            self.directory.tables.insert(table_id.to_string(), record);
            self.sessions.revoke_for(agent_id, table_id);

            if let Some(managed) = self.manager.get(table_id) {
                let lock_guard = self.action_locks.acquire(table_id).await;
                let mut runtime = managed.runtime.lock().await;
                let _ = runtime.remove_player(seat_id);
                drop(runtime);
                drop(lock_guard);
            }
            self.registry.unregister(table_id, seat_id);
            self.registry
                .broadcast_player_left(table_id, serde_json::json!({ "seat_id": seat_id }));
        }

        Ok(LeaveResult {
            success: true,
            message: "left table".to_string(),
        })
    }

    pub fn directory(&self) -> Arc<TableDirectory> {
        self.directory.clone()
    }

    pub fn sessions(&self) -> Arc<SessionStore> {
        self.sessions.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> TableConfig {
        TableConfig {
            small_blind: 1,
            big_blind: 2,
            max_seats: 2,
            initial_stack: 1000,
            action_timeout_ms: 30_000,
            min_players_to_start: 2,
        }
    }

    #[test]
    fn directory_assigns_lowest_free_seat() {
        let dir = TableDirectory::new();
        dir.create_table("t1".to_string(), cfg(), None);
        let mut record = dir.get("t1").unwrap();
        assert_eq!(record.lowest_free_seat(), Some(0));
        record.seats.insert(
            0,
            SeatRecord {
                agent_id: "a".to_string(),
                agent_name: "A".to_string(),
                stack: 1000,
                is_active: true,
            },
        );
        assert_eq!(record.lowest_free_seat(), Some(1));
    }

    #[test]
    fn session_expires_after_lifetime() {
        let store = SessionStore::new("test-secret".to_string());
        let (_session, token) = store.issue("a".to_string(), "t1".to_string(), 0, Duration::seconds(-1));
        let err = store.validate(&token).unwrap_err();
        assert_eq!(err.code, ErrorCode::SessionExpired);
    }

    #[test]
    fn tampered_token_is_rejected_before_the_session_lookup() {
        let store = SessionStore::new("test-secret".to_string());
        let (_session, token) = store.issue("a".to_string(), "t1".to_string(), 0, Duration::seconds(3600));
        let (session_id, _mac) = token.split_once('.').unwrap();
        let forged = format!("{session_id}.{}", "0".repeat(64));
        let err = store.validate(&forged).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidSession);
    }

    #[test]
    fn token_signed_with_a_different_secret_is_rejected() {
        let store_a = SessionStore::new("secret-a".to_string());
        let store_b = SessionStore::new("secret-b".to_string());
        let (_session, token) = store_a.issue("a".to_string(), "t1".to_string(), 0, Duration::seconds(3600));
        let err = store_b.validate(&token).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidSession);
    }
}
