//! HTTP route handlers (§6). Thin: each handler extracts request data,
//! delegates to a service (`SessionService`, `TableManager`, `Store`),
//! and maps the `Result` into a JSON response or an `ApiError`.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::agents::authenticate;
use crate::error::{ApiError, ErrorCode};
use crate::session::TableStatus;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RegisterAgentBody {
    pub name: String,
}

pub async fn register_agent(
    State(state): State<AppState>,
    Json(body): Json<RegisterAgentBody>,
) -> impl IntoResponse {
    let (agent, api_key) = state.agents.register(body.name);
    Json(json!({ "agent_id": agent.agent_id, "api_key": api_key }))
}

#[derive(Deserialize)]
pub struct ListTablesQuery {
    pub status: Option<String>,
}

pub async fn list_tables(
    State(state): State<AppState>,
    Query(query): Query<ListTablesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status_filter = match query.status.as_deref() {
        None => None,
        Some("waiting") => Some(TableStatus::Waiting),
        Some("running") => Some(TableStatus::Running),
        Some("ended") => Some(TableStatus::Ended),
        Some(_) => return Err(ApiError::new(ErrorCode::ValidationError, "unknown status filter")),
    };
    let tables = state.directory.list(status_filter, &state.manager);
    Ok(Json(tables))
}

pub async fn get_table(
    State(state): State<AppState>,
    Path(table_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .directory
        .get(&table_id)
        .ok_or_else(|| ApiError::new(ErrorCode::TableNotFound, "no such table"))?;
    Ok(Json(record))
}

#[derive(Deserialize)]
pub struct EventsQuery {
    #[serde(rename = "fromSeq")]
    pub from_seq: Option<u64>,
    pub limit: Option<usize>,
}

pub async fn get_events(
    State(state): State<AppState>,
    Path(table_id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if state.directory.get(&table_id).is_none() {
        return Err(ApiError::new(ErrorCode::TableNotFound, "no such table"));
    }
    let events = state
        .store
        .read_events(table_id, query.from_seq.unwrap_or(0), query.limit.unwrap_or(100))
        .await
        .map_err(|e| ApiError::new(ErrorCode::InternalError, e.to_string()))?;
    Ok(Json(events))
}

#[derive(Deserialize)]
pub struct JoinBody {
    pub client_protocol_version: Option<u32>,
    pub preferred_seat: Option<u8>,
}

pub async fn join_table(
    State(state): State<AppState>,
    Path(table_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<JoinBody>,
) -> Result<impl IntoResponse, ApiError> {
    let agent = authenticate(&state.agents, &headers)?;
    let result = state
        .session_service
        .join(&table_id, &agent.agent_id, &agent.name, body.preferred_seat, body.client_protocol_version)
        .await?;
    Ok(Json(result))
}

pub async fn leave_table(
    State(state): State<AppState>,
    Path(table_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let agent = authenticate(&state.agents, &headers)?;
    let result = state.session_service.leave(&table_id, &agent.agent_id).await?;
    Ok(Json(result))
}

#[derive(Serialize)]
pub struct HealthBody {
    status: &'static str,
}

pub async fn health() -> impl IntoResponse {
    Json(HealthBody { status: "ok" })
}
