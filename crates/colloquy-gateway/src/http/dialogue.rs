//! POST /api/dialogue/input — the main dialogue endpoint.
//!
//! Request:  `{"input": "...", "sessionId"?: "...", "userId"?: "...", "context"?: {...}}`
//! Response: `{"success": true, "result": {id, input, response, sessionId, timestamp, metadata}}`
//!
//! Degraded states (store or model unavailable, deadline expiry) still
//! answer `success:true`; only `result.metadata` records them.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use colloquy_core::error::ColloquyError;
use colloquy_core::types::Metadata;
use colloquy_dialogue::{DialogueError, ProcessRequest};
use colloquy_store::StoreError;

use crate::app::AppState;
use crate::http::{bad_request, error_response, internal};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputRequest {
    pub input: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub context: Option<Metadata>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputReply {
    pub success: bool,
    pub result: InputResult,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputResult {
    /// Id of the committed AI turn.
    pub id: String,
    pub input: String,
    pub response: String,
    pub session_id: String,
    pub timestamp: String,
    pub metadata: Metadata,
}

/// Decrements the in-flight gauge when the request finishes, however it
/// finishes.
struct InFlightGuard<'a>(&'a AppState);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

pub async fn input_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InputRequest>,
) -> Result<Json<InputReply>, Response> {
    // Overload shedding before any work.
    let in_flight = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    let guard = InFlightGuard(&state);
    let max_in_flight = state.config.server.max_in_flight;
    if in_flight > max_in_flight {
        warn!(in_flight, max = max_in_flight, "shedding dialogue input");
        return Err(overloaded_response(in_flight, max_in_flight));
    }

    if req.input.trim().is_empty() {
        return Err(bad_request("input must not be empty").into_response());
    }
    let user_id = req
        .user_id
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or("anonymous")
        .to_string();

    // Whole-request deadline, propagated as a cancellation token.
    let cancel = CancellationToken::new();
    let timer = {
        let cancel = cancel.clone();
        let deadline =
            std::time::Duration::from_secs(state.config.server.request_timeout_secs);
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            cancel.cancel();
        })
    };

    let outcome = state
        .orchestrator
        .process_input(ProcessRequest {
            user_id,
            session_id: req.session_id.clone(),
            text: req.input.clone(),
            context: req.context.clone(),
            cancel,
        })
        .await;
    timer.abort();
    drop(guard);

    match outcome {
        Ok(outcome) => Ok(Json(InputReply {
            success: true,
            result: InputResult {
                id: outcome.turn_id,
                input: req.input,
                response: outcome.reply,
                session_id: outcome.session_id,
                timestamp: outcome.timestamp,
                metadata: outcome.metadata,
            },
        })),
        Err(DialogueError::Malformed(message))
        | Err(DialogueError::Store(StoreError::Malformed(message))) => {
            Err(bad_request(message).into_response())
        }
        Err(e) => {
            warn!(error = %e, "dialogue pipeline failed");
            Err(internal(e.to_string()).into_response())
        }
    }
}

fn overloaded_response(in_flight: usize, max: usize) -> Response {
    let body = error_response(
        StatusCode::SERVICE_UNAVAILABLE,
        ColloquyError::Overloaded { in_flight, max },
    );
    let mut response = body.into_response();
    response
        .headers_mut()
        .insert("retry-after", axum::http::HeaderValue::from_static("1"));
    response
}
