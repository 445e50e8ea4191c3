//! Frequency-aware expression endpoints: per-user settings and the manual
//! trigger.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;

use colloquy_proactive::{
    Expression, ExpressionType, ProactiveError, UserFrequencySettings,
};

use crate::app::AppState;
use crate::http::{bad_request, internal, ApiError};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsParams {
    pub user_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsReply {
    pub success: bool,
    pub user_id: String,
    pub settings: UserFrequencySettings,
}

/// GET /api/frequency/settings?userId=…
pub async fn get_settings_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SettingsParams>,
) -> Result<Json<SettingsReply>, ApiError> {
    let user_id = params
        .user_id
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| bad_request("userId query parameter is required"))?;
    Ok(Json(SettingsReply {
        success: true,
        user_id: user_id.to_string(),
        settings: state.frequency.get(user_id),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSettingsRequest {
    pub user_id: String,
    #[serde(flatten)]
    pub settings: UserFrequencySettings,
}

#[derive(Serialize)]
pub struct AckReply {
    pub success: bool,
}

/// POST /api/frequency/settings
pub async fn set_settings_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetSettingsRequest>,
) -> Result<Json<AckReply>, ApiError> {
    if req.user_id.trim().is_empty() {
        return Err(bad_request("userId must not be empty"));
    }
    state.frequency.set(&req.user_id, req.settings);
    Ok(Json(AckReply { success: true }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    pub user_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub expression_type: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<Expression>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /api/frequency/trigger — force one expression now.
///
/// Only a `reminder` bypasses the quiet window, and the daily cap always
/// applies; a blocked trigger is a `success:false` reply, not an HTTP
/// error.
pub async fn trigger_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TriggerRequest>,
) -> Result<Json<TriggerReply>, ApiError> {
    if req.user_id.trim().is_empty() {
        return Err(bad_request("userId must not be empty"));
    }
    let expression_type = req
        .expression_type
        .parse::<ExpressionType>()
        .map_err(bad_request)?;

    match state
        .proactive
        .trigger_now(&req.user_id, req.session_id.as_deref(), expression_type)
        .await
    {
        Ok(expression) => Ok(Json(TriggerReply {
            success: true,
            expression: Some(expression),
            error: None,
        })),
        Err(e @ ProactiveError::DailyCapReached { .. })
        | Err(e @ ProactiveError::QuietWindow { .. })
        | Err(e @ ProactiveError::NoActiveSession { .. })
        | Err(e @ ProactiveError::Disabled { .. }) => Ok(Json(TriggerReply {
            success: false,
            expression: None,
            error: Some(e.to_string()),
        })),
        Err(e) => {
            warn!(error = %e, "manual trigger failed");
            Err(internal(e.to_string()))
        }
    }
}
