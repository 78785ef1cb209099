//! WebSocket upgrade handlers (§6): the player socket at `/v1/ws` and the
//! observer socket at `/v1/ws/observe/:tableId`. Session/admin validation
//! happens before the upgrade so a rejected client gets a normal HTTP
//! error instead of a socket that opens then immediately closes.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{ApiError, ErrorCode};
use crate::table::{ActionKind, ActionOutcome, ActionRequest};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct PlayerWsQuery {
    pub token: String,
    #[serde(default)]
    pub compact: bool,
}

pub async fn player_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<PlayerWsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.sessions.validate(&query.token)?;
    Ok(ws.on_upgrade(move |socket| handle_player_socket(socket, state, session, query.compact)))
}

async fn handle_player_socket(socket: WebSocket, state: AppState, session: crate::session::Session, compact: bool) {
    let table_id = session.table_id;
    let seat_id = session.seat_id;
    let agent_id = session.agent_id;

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    state.lifecycle.cancel_abandonment(&table_id).await;

    if let Some(managed) = state.manager.get(&table_id) {
        state.registry.register(&table_id, agent_id.clone(), seat_id, tx.clone(), compact);
        let runtime = managed.runtime.lock().await;
        let view = runtime.state_for_seat(seat_id);
        drop(runtime);
        state
            .registry
            .send_welcome(&table_id, seat_id, json!({ "seat_id": seat_id, "agent_id": agent_id, "table_id": table_id }));
        state.registry.send_game_state(&table_id, seat_id, &view);
    } else {
        state.registry.register_pending(&table_id, agent_id.clone(), seat_id, tx.clone(), compact);
        debug!(%table_id, seat_id, "player socket pending table start");
    }

    while let Some(Ok(msg)) = stream.next().await {
        let Message::Text(text) = msg else { continue };
        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Ping { payload }) => {
                let env = crate::registry::ServerEnvelope::new("pong", None, None, payload);
                let _ = tx.send(env.to_text());
            }
            Ok(ClientMessage::Action { action, expected_seq }) => {
                handle_action(&state, &table_id, seat_id, action, expected_seq).await;
            }
            Err(e) => {
                warn!(%table_id, seat_id, error = %e, "unparseable client message");
                state.registry.send_error(
                    &table_id,
                    seat_id,
                    json!({ "code": ErrorCode::ValidationError.as_str(), "message": "could not parse message" }),
                );
            }
        }
    }

    writer.abort();
    state.registry.unregister(&table_id, seat_id);
    if state.registry.connection_count(&table_id) == 0 {
        state.lifecycle.arm_abandonment(table_id).await;
    }
}

async fn handle_action(state: &AppState, table_id: &str, seat_id: u8, action: ActionBody, expected_seq: Option<u64>) {
    let Some(kind) = parse_action_kind(&action.kind) else {
        state.registry.send_error(table_id, seat_id, json!({ "code": ErrorCode::InvalidAction.as_str(), "message": "unknown action kind" }));
        return;
    };
    let Some(managed) = state.manager.get(table_id) else {
        state.registry.send_error(table_id, seat_id, json!({ "code": ErrorCode::TableNotFound.as_str(), "message": "table no longer exists" }));
        return;
    };

    let lock_guard = state.action_locks.acquire(table_id).await;
    let outcome = {
        let mut runtime = managed.runtime.lock().await;
        if let Some(expected) = expected_seq {
            if expected != runtime.seq {
                drop(runtime);
                drop(lock_guard);
                state
                    .registry
                    .send_error(table_id, seat_id, json!({ "code": ErrorCode::StaleSeq.as_str(), "message": "expected_seq is behind the current seq" }));
                return;
            }
        }
        runtime.apply_action(
            seat_id,
            ActionRequest {
                turn_token: action.turn_token,
                kind,
                amount: action.amount,
            },
        )
    };
    drop(lock_guard);

    match outcome {
        Ok(ActionOutcome::Applied { seq }) | Ok(ActionOutcome::Duplicate { seq }) => {
            state.registry.send_ack(table_id, seat_id, seq, json!({ "applied": true }));
        }
        Err(err) => {
            let api_err = ApiError::from(err);
            state
                .registry
                .send_error(table_id, seat_id, json!({ "code": api_err.code.as_str(), "message": api_err.message }));
            return;
        }
    }

    state.lifecycle.process_effects(table_id).await;
}

fn parse_action_kind(raw: &str) -> Option<ActionKind> {
    match raw {
        "fold" => Some(ActionKind::Fold),
        "check" => Some(ActionKind::Check),
        "call" => Some(ActionKind::Call),
        "raiseTo" => Some(ActionKind::RaiseTo),
        _ => None,
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Ping { payload: Value },
    Action {
        action: ActionBody,
        #[serde(default)]
        expected_seq: Option<u64>,
    },
}

#[derive(Deserialize)]
struct ActionBody {
    turn_token: String,
    kind: String,
    amount: Option<i64>,
}

#[derive(Deserialize)]
pub struct ObserveWsQuery {
    #[serde(default)]
    pub show_cards: bool,
    #[serde(default)]
    pub compact: bool,
    pub admin_email: Option<String>,
}

/// Observer socket (§6). `show_cards=true` requires the caller's
/// `admin_email` to appear in the configured allowlist.
pub async fn observe_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(table_id): Path<String>,
    Query(query): Query<ObserveWsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if state.directory.get(&table_id).is_none() {
        return Err(ApiError::new(ErrorCode::TableNotFound, "no such table"));
    }
    if query.show_cards {
        let allowed = query
            .admin_email
            .as_deref()
            .map(|email| state.config.admin_email_allowlist.iter().any(|a| a == email))
            .unwrap_or(false);
        if !allowed {
            return Err(ApiError::new(ErrorCode::Unauthorized, "show_cards requires an allowlisted admin_email"));
        }
    }
    Ok(ws.on_upgrade(move |socket| handle_observer_socket(socket, state, table_id, query.show_cards, query.compact)))
}

async fn handle_observer_socket(socket: WebSocket, state: AppState, table_id: String, show_cards: bool, compact: bool) {
    let observer_id = uuid::Uuid::new_v4().to_string();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    state.registry.register_observer(&table_id, observer_id.clone(), tx.clone(), show_cards, compact);

    if let Some(managed) = state.manager.get(&table_id) {
        let runtime = managed.runtime.lock().await;
        let view = if show_cards { runtime.admin_state() } else { runtime.public_state() };
        drop(runtime);
        let payload = if compact { crate::registry::compact_game_state(&view) } else { serde_json::to_value(&view).unwrap() };
        let env = crate::registry::ServerEnvelope::new("game_state", Some(table_id.clone()), Some(view.seq), payload);
        let _ = tx.send(env.to_text());
    }

    while let Some(Ok(msg)) = stream.next().await {
        let Message::Text(text) = msg else { continue };
        if let Ok(ClientMessage::Ping { payload }) = serde_json::from_str::<ClientMessage>(&text) {
            let env = crate::registry::ServerEnvelope::new("pong", None, None, payload);
            let _ = tx.send(env.to_text());
        }
    }

    writer.abort();
    state.registry.unregister_observer(&table_id, &observer_id);
}
