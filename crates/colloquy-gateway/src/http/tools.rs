use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use colloquy_tools::{Modality, ToolDescriptor};

use crate::app::AppState;
use crate::http::{bad_request, ApiError};

#[derive(Deserialize)]
pub struct ListParams {
    /// Optional modality filter, e.g. `?modality=text`.
    #[serde(default)]
    pub modality: Option<String>,
}

#[derive(Serialize)]
pub struct ToolsReply {
    pub success: bool,
    pub items: Vec<ToolDescriptor>,
}

/// GET /api/dialogue/tools
pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<ToolsReply>, ApiError> {
    let modality = match params.modality.as_deref() {
        Some(raw) => Some(raw.parse::<Modality>().map_err(bad_request)?),
        None => None,
    };
    Ok(Json(ToolsReply {
        success: true,
        items: state.registry.list(modality),
    }))
}
