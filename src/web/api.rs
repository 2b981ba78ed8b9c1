//! Versioned API used by the bot itself
//!
//! Requests authenticate with `Authorization: Token <token>`. Every response,
//! success or failure, is wrapped in the `{ body, error }` envelope.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::server::AppState;
use crate::store::LogEntry;

/// Numeric error codes of the API envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u8")]
pub enum ApiErrorCode {
    Unauthorized = 0,
    BadRequest = 1,
    Internal = 2,
}

impl From<ApiErrorCode> for u8 {
    fn from(code: ApiErrorCode) -> Self {
        code as u8
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

pub fn api_success<T: Serialize>(status: StatusCode, body: T) -> Response {
    let envelope = ApiResponse {
        body: Some(body),
        error: None,
    };
    (status, Json(envelope)).into_response()
}

pub fn api_failure(status: StatusCode, code: ApiErrorCode, message: impl Into<String>) -> Response {
    let envelope: ApiResponse<()> = ApiResponse {
        body: None,
        error: Some(ApiError {
            code,
            message: message.into(),
        }),
    };
    (status, Json(envelope)).into_response()
}

/// Token from an `Authorization: Token <token>` header
fn api_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Token")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Check the request's API token, or produce the 403 envelope
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let unauthorized = || api_failure(StatusCode::FORBIDDEN, ApiErrorCode::Unauthorized, "Unauthorized");

    let Some(token) = api_token(headers) else {
        return Err(unauthorized());
    };

    match state.api_tokens.exists(token) {
        Ok(true) => Ok(()),
        Ok(false) => {
            warn!("API request with unknown token");
            Err(unauthorized())
        }
        Err(e) => {
            error!("API token lookup failed: {}", e);
            Err(api_failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorCode::Internal,
                "Internal server error",
            ))
        }
    }
}

/// Log entry as the bot sends it
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiLog {
    pub message_id: String,
    pub user_id: String,
    pub server_id: String,
    pub command: String,
    pub command_id: i64,
    pub date_created: String,
}

impl TryFrom<ApiLog> for LogEntry {
    type Error = String;

    fn try_from(log: ApiLog) -> Result<Self, Self::Error> {
        let date_created = DateTime::parse_from_rfc3339(&log.date_created)
            .map_err(|e| format!("invalid dateCreated {:?}: {}", log.date_created, e))?
            .with_timezone(&Utc);

        Ok(LogEntry {
            message_id: log.message_id,
            user_id: log.user_id,
            server_id: log.server_id,
            command: log.command,
            command_id: log.command_id,
            date_created,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedLog {
    pub id: i64,
}

/// POST /api/v1/logs - Record a command invocation reported by the bot
pub async fn create_log(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    let entry = serde_json::from_slice::<ApiLog>(&body)
        .map_err(|e| e.to_string())
        .and_then(LogEntry::try_from);
    let entry = match entry {
        Ok(entry) => entry,
        Err(message) => {
            return api_failure(StatusCode::BAD_REQUEST, ApiErrorCode::BadRequest, message);
        }
    };

    match state.logs.create(&entry) {
        Ok(id) => {
            info!("Recorded {} command on guild {}", entry.command, entry.server_id);
            api_success(StatusCode::CREATED, CreatedLog { id })
        }
        Err(e) => {
            error!("Failed to store log: {}", e);
            api_failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorCode::Internal,
                "Internal server error",
            )
        }
    }
}
