//! Session management endpoints under /api/dialogue/sessions.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;

use colloquy_core::types::DialogueType;
use colloquy_store::{Session, StoreError, Turn};

use crate::app::AppState;
use crate::http::{bad_request, internal, not_found, ApiError};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub user_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub dialogue_type: Option<String>,
}

#[derive(Serialize)]
pub struct SessionReply {
    pub success: bool,
    #[serde(flatten)]
    pub session: Session,
}

/// POST /api/dialogue/sessions
pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRequest>,
) -> Result<Json<SessionReply>, ApiError> {
    if req.user_id.trim().is_empty() {
        return Err(bad_request("userId must not be empty"));
    }
    let dialogue_type = match req.dialogue_type.as_deref() {
        Some(raw) => Some(raw.parse::<DialogueType>().map_err(bad_request)?),
        None => None,
    };

    let session = state
        .store
        .create_session(&req.user_id, req.title.as_deref(), dialogue_type, None)
        .map_err(|e| match e {
            StoreError::Malformed(m) => bad_request(m),
            other => {
                warn!(error = %other, "session create failed");
                internal(other.to_string())
            }
        })?;

    Ok(Json(SessionReply {
        success: true,
        session,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub user_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    20
}

#[derive(Serialize)]
pub struct ListReply {
    pub success: bool,
    pub items: Vec<Session>,
    pub total: u64,
}

/// GET /api/dialogue/sessions?userId=…&limit=&offset=
pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListReply>, ApiError> {
    let user_id = params
        .user_id
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| bad_request("userId query parameter is required"))?;

    let items = state
        .store
        .list_sessions_by_user(user_id, params.limit, params.offset)
        .map_err(|e| internal(e.to_string()))?;
    let total = state
        .store
        .count_sessions_by_user(user_id)
        .map_err(|e| internal(e.to_string()))?;

    Ok(Json(ListReply {
        success: true,
        items,
        total,
    }))
}

/// GET /api/dialogue/sessions/{id}
pub async fn get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionReply>, ApiError> {
    match state.store.get_session(&id) {
        Ok(session) => Ok(Json(SessionReply {
            success: true,
            session,
        })),
        Err(StoreError::SessionNotFound { .. }) => Err(not_found(format!("unknown session: {id}"))),
        Err(e) => Err(internal(e.to_string())),
    }
}

#[derive(Serialize)]
pub struct AckReply {
    pub success: bool,
}

/// POST /api/dialogue/sessions/{id}/archive — monotone active → archived.
pub async fn archive_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AckReply>, ApiError> {
    match state.store.archive_session(&id) {
        Ok(()) => Ok(Json(AckReply { success: true })),
        Err(StoreError::SessionNotFound { .. }) => Err(not_found(format!("unknown session: {id}"))),
        Err(e) => Err(internal(e.to_string())),
    }
}

/// DELETE /api/dialogue/sessions/{id} — removes the session and, by
/// cascade, all of its turns.
pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AckReply>, ApiError> {
    match state.store.delete_session(&id) {
        Ok(()) => Ok(Json(AckReply { success: true })),
        Err(StoreError::SessionNotFound { .. }) => Err(not_found(format!("unknown session: {id}"))),
        Err(e) => Err(internal(e.to_string())),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnsParams {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub before_id: Option<String>,
}

#[derive(Serialize)]
pub struct TurnsReply {
    pub success: bool,
    /// Ascending by `(createdAt, insertion order)`.
    pub items: Vec<Turn>,
}

/// GET /api/dialogue/sessions/{id}/turns?limit=&beforeId=
pub async fn turns_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<TurnsParams>,
) -> Result<Json<TurnsReply>, ApiError> {
    // A read against an unknown session is 404, not an empty list.
    if let Err(StoreError::SessionNotFound { .. }) = state.store.get_session(&id) {
        return Err(not_found(format!("unknown session: {id}")));
    }

    let items = state
        .store
        .get_turns(&id, params.limit, params.before_id.as_deref())
        .map_err(|e| match e {
            StoreError::TurnNotFound { id } => bad_request(format!("unknown beforeId: {id}")),
            other => internal(other.to_string()),
        })?;

    Ok(Json(TurnsReply {
        success: true,
        items,
    }))
}
