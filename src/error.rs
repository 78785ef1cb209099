//! Error taxonomies for the runtime (§4) and the HTTP/WS surface (§6, §7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;

/// Errors a `TableRuntime` operation can fail with. Never panics on
/// caller-controlled input; every fallible path returns one of these.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GameError {
    #[error("seat {0} is out of range")]
    InvalidSeat(u8),
    #[error("seat {0} is already taken")]
    SeatTaken(u8),
    #[error("table {0} already has a live runtime")]
    AlreadyExists(String),
    #[error("not enough players with chips to start a hand")]
    NotEnoughPlayers,
    #[error("it is not seat {0}'s turn")]
    NotYourTurn(u8),
    #[error("turn token is stale")]
    StaleToken,
    #[error("invalid action: {reason}")]
    InvalidAction { reason: String },
    #[error("deck exhausted")]
    DeckExhausted,
    #[error("internal invariant violated: {reason}")]
    InternalError { reason: String },
}

impl GameError {
    pub fn invalid_action(reason: impl Into<String>) -> Self {
        GameError::InvalidAction {
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        GameError::InternalError {
            reason: reason.into(),
        }
    }

    /// Stable wire code, reused by the ACTION result and by `ApiError`
    /// translation at the socket boundary.
    pub fn code(&self) -> &'static str {
        match self {
            GameError::InvalidSeat(_) => "VALIDATION_ERROR",
            GameError::SeatTaken(_) => "VALIDATION_ERROR",
            GameError::AlreadyExists(_) => "ALREADY_EXISTS",
            GameError::NotEnoughPlayers => "VALIDATION_ERROR",
            GameError::NotYourTurn(_) => "NOT_YOUR_TURN",
            GameError::StaleToken => "STALE_SEQ",
            GameError::InvalidAction { .. } => "INVALID_ACTION",
            GameError::DeckExhausted => "INTERNAL_ERROR",
            GameError::InternalError { .. } => "INTERNAL_ERROR",
        }
    }
}

/// The stable error codes enumerated in §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthorized,
    InvalidApiKey,
    InvalidSession,
    SessionExpired,
    OutdatedClient,
    ValidationError,
    TableNotFound,
    TableEnded,
    TableFull,
    InvalidTableState,
    AlreadySeated,
    AlreadyExists,
    NotSeated,
    NotYourTurn,
    InvalidAction,
    StaleSeq,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::InvalidApiKey => "INVALID_API_KEY",
            ErrorCode::InvalidSession => "INVALID_SESSION",
            ErrorCode::SessionExpired => "SESSION_EXPIRED",
            ErrorCode::OutdatedClient => "OUTDATED_CLIENT",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::TableNotFound => "TABLE_NOT_FOUND",
            ErrorCode::TableEnded => "TABLE_ENDED",
            ErrorCode::TableFull => "TABLE_FULL",
            ErrorCode::InvalidTableState => "INVALID_TABLE_STATE",
            ErrorCode::AlreadySeated => "ALREADY_SEATED",
            ErrorCode::AlreadyExists => "ALREADY_EXISTS",
            ErrorCode::NotSeated => "NOT_SEATED",
            ErrorCode::NotYourTurn => "NOT_YOUR_TURN",
            ErrorCode::InvalidAction => "INVALID_ACTION",
            ErrorCode::StaleSeq => "STALE_SEQ",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// Error surfaced to an HTTP client or packed into a WS `error` frame.
/// Carries a stable `code`, a human-readable message, and an optional
/// doc link so autonomous agents can self-correct (§7).
#[derive(Debug, Clone, Error)]
#[error("{code:?}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub skill_doc_url: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            skill_doc_url: None,
        }
    }

    pub fn with_doc(mut self, url: impl Into<String>) -> Self {
        self.skill_doc_url = Some(url.into());
        self
    }

    fn http_status(&self) -> StatusCode {
        match self.code {
            ErrorCode::Unauthorized
            | ErrorCode::InvalidApiKey
            | ErrorCode::InvalidSession
            | ErrorCode::SessionExpired => StatusCode::UNAUTHORIZED,
            ErrorCode::TableNotFound | ErrorCode::NotSeated => StatusCode::NOT_FOUND,
            ErrorCode::TableFull
            | ErrorCode::AlreadySeated
            | ErrorCode::AlreadyExists
            | ErrorCode::TableEnded
            | ErrorCode::InvalidTableState
            | ErrorCode::OutdatedClient
            | ErrorCode::ValidationError
            | ErrorCode::NotYourTurn
            | ErrorCode::InvalidAction
            | ErrorCode::StaleSeq => StatusCode::BAD_REQUEST,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ApiErrorBody<'a> {
    code: &'static str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    skill_doc_url: &'a Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            code: self.code.as_str(),
            message: &self.message,
            skill_doc_url: &self.skill_doc_url,
        };
        (self.http_status(), Json(body)).into_response()
    }
}

impl From<GameError> for ApiError {
    fn from(err: GameError) -> Self {
        let code = match &err {
            GameError::NotYourTurn(_) => ErrorCode::NotYourTurn,
            GameError::StaleToken => ErrorCode::StaleSeq,
            GameError::InvalidAction { .. } => ErrorCode::InvalidAction,
            GameError::DeckExhausted | GameError::InternalError { .. } => ErrorCode::InternalError,
            GameError::InvalidSeat(_) | GameError::SeatTaken(_) | GameError::NotEnoughPlayers => {
                ErrorCode::ValidationError
            }
            GameError::AlreadyExists(_) => ErrorCode::AlreadyExists,
        };
        ApiError::new(code, err.to_string())
    }
}
