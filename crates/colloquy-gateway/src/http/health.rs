use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct Health {
    pub success: bool,
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /health — liveness probe.
pub async fn health_handler() -> Json<Health> {
    Json(Health {
        success: true,
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
