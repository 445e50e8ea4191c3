use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use colloquy_core::config::ColloquyConfig;
use colloquy_dialogue::DialogueOrchestrator;
use colloquy_proactive::{FrequencySettings, ProactiveEngine};
use colloquy_store::TurnStore;
use colloquy_tools::ToolRegistry;

use crate::ws::push::PushRegistry;

/// Shared state handed to every handler as `Arc<AppState>`.
///
/// Components are constructed leaves-first in `main` (store, model, tools,
/// context, proactive) and the orchestrator is injected last; nothing in
/// here depends back on the orchestrator.
pub struct AppState {
    pub config: ColloquyConfig,
    pub store: Arc<TurnStore>,
    pub registry: Arc<ToolRegistry>,
    pub orchestrator: DialogueOrchestrator,
    pub frequency: Arc<FrequencySettings>,
    pub proactive: Arc<ProactiveEngine>,
    pub push: Arc<PushRegistry>,
    /// Dialogue inputs currently being processed; beyond the configured
    /// ceiling new inputs get 503 + Retry-After.
    pub in_flight: AtomicUsize,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ColloquyConfig,
        store: Arc<TurnStore>,
        registry: Arc<ToolRegistry>,
        orchestrator: DialogueOrchestrator,
        frequency: Arc<FrequencySettings>,
        proactive: Arc<ProactiveEngine>,
        push: Arc<PushRegistry>,
    ) -> Self {
        Self {
            config,
            store,
            registry,
            orchestrator,
            frequency,
            proactive,
            push,
            in_flight: AtomicUsize::new(0),
        }
    }
}

/// Build the axum router with every route attached.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route(
            "/api/dialogue/input",
            post(crate::http::dialogue::input_handler),
        )
        .route(
            "/api/dialogue/sessions",
            post(crate::http::sessions::create_handler).get(crate::http::sessions::list_handler),
        )
        .route(
            "/api/dialogue/sessions/{id}",
            get(crate::http::sessions::get_handler).delete(crate::http::sessions::delete_handler),
        )
        .route(
            "/api/dialogue/sessions/{id}/archive",
            post(crate::http::sessions::archive_handler),
        )
        .route(
            "/api/dialogue/sessions/{id}/turns",
            get(crate::http::sessions::turns_handler),
        )
        .route("/api/dialogue/tools", get(crate::http::tools::list_handler))
        .route(
            "/api/frequency/settings",
            get(crate::http::frequency::get_settings_handler)
                .post(crate::http::frequency::set_settings_handler),
        )
        .route(
            "/api/frequency/trigger",
            post(crate::http::frequency::trigger_handler),
        )
        .route("/ws", get(crate::ws::connection::ws_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
}
