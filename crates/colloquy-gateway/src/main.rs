use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use colloquy_context::{ContextAssembler, ContextProcessors};
use colloquy_core::config::ColloquyConfig;
use colloquy_dialogue::{DialogueOrchestrator, OrchestratorConfig};
use colloquy_model::{GenerateOptions, HttpModelClient, ModelClient};
use colloquy_proactive::{
    engine::EngineConfig, FrequencySettings, ProactiveEngine,
};
use colloquy_store::TurnStore;
use colloquy_tools::{
    builtin::register_builtins, discovery::ToolDiscovery, InvokerConfig, ToolInvoker,
    ToolRegistry,
};

mod app;
mod http;
mod ws;

/// Tool definition directory rescan cadence.
const RESCAN_SECS: u64 = 300;

#[derive(Parser)]
#[command(name = "colloquy-gateway", about = "Dialogue orchestration server")]
struct Args {
    /// Path to colloquy.toml (default: $COLLOQUY_CONFIG, then
    /// ~/.colloquy/colloquy.toml).
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "colloquy_gateway=info,tower_http=debug".into()),
        )
        .init();

    let args = Args::parse();
    let config_path = args
        .config
        .or_else(|| std::env::var("COLLOQUY_CONFIG").ok());
    let config = ColloquyConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        ColloquyConfig::default()
    });

    // C1 — the store.
    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = rusqlite::Connection::open(&config.database.path)?;
    let store = Arc::new(TurnStore::new(conn)?);

    // C2 — the model backend. Without an API key the client still runs;
    // every call fails transiently and the fallback paths answer.
    let model: Arc<dyn ModelClient> = Arc::new(HttpModelClient::new(
        config.model.api_key.clone().unwrap_or_default(),
        Some(config.model.base_url.clone()),
    ));
    let generate = GenerateOptions {
        model: config.model.model.clone(),
        temperature: config.model.temperature,
        max_tokens: config.model.max_tokens,
        timeout: std::time::Duration::from_secs(config.model.timeout_secs),
    };

    // C3/C4 — tools.
    let registry = Arc::new(ToolRegistry::new());
    register_builtins(&registry)?;
    if let Some(dir) = &config.tools.definitions_dir {
        let discovery = Arc::new(ToolDiscovery::new(dir));
        let report = discovery.scan(&registry)?;
        info!(
            loaded = report.loaded,
            unchanged = report.unchanged,
            failed = report.failed,
            "tool definitions scanned"
        );
        // Rescan periodically; unchanged files are hash-skipped.
        let rescan_registry = Arc::clone(&registry);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(RESCAN_SECS));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if let Err(e) = discovery.scan(&rescan_registry) {
                    warn!(error = %e, "tool definition rescan failed");
                }
            }
        });
    }
    let invoker = Arc::new(ToolInvoker::new(
        Arc::clone(&registry),
        Arc::clone(&model),
        InvokerConfig {
            confidence_high: config.tools.confidence_high,
            confidence_low: config.tools.confidence_low,
            cache_capacity: config.tools.cache_capacity,
            cache_ttl: std::time::Duration::from_secs(config.tools.cache_ttl_secs),
            decision_opts: GenerateOptions {
                max_tokens: 256,
                temperature: 0.0,
                ..generate.clone()
            },
        },
    ));

    // C5 — context assembly.
    let assembler = ContextAssembler::new(
        ContextProcessors::new(),
        config.context.max_context_tokens,
    );

    // C7 — the proactive engine and its delivery channel.
    let frequency = Arc::new(FrequencySettings::new());
    let (fired_tx, fired_rx) = mpsc::channel(config.proactive.queue_capacity);
    let proactive = Arc::new(ProactiveEngine::new(
        Arc::clone(&store),
        Arc::clone(&model),
        Arc::clone(&frequency),
        EngineConfig {
            tick: std::time::Duration::from_secs(config.proactive.tick_secs),
            min_quiet_minutes: config.proactive.min_quiet_minutes,
            queue_capacity: config.proactive.queue_capacity,
            stage_caps: config.proactive.stage_caps,
            generate: generate.clone(),
        },
        fired_tx,
    ));

    // C6 — the orchestrator, injected with everything above.
    let orchestrator = DialogueOrchestrator::new(
        Arc::clone(&store),
        Arc::clone(&model),
        Arc::clone(&invoker),
        assembler,
        OrchestratorConfig {
            generate,
            default_session_title: config.dialogue.default_session_title.clone(),
            ai_ai_turn_budget: config.dialogue.ai_ai_turn_budget,
            history_limit: config.dialogue.history_limit,
            expose_assembled_context: config.dialogue.expose_assembled_context,
        },
    );

    let push = Arc::new(ws::push::PushRegistry::new());
    let bind = config.server.bind.clone();
    let port = config.server.port;
    let state = Arc::new(app::AppState::new(
        config,
        store,
        registry,
        orchestrator,
        frequency,
        Arc::clone(&proactive),
        Arc::clone(&push),
    ));

    // Background loops: the expression tick and the push delivery pump.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(proactive.run(shutdown_rx));
    tokio::spawn(ws::push::run_push_delivery(push, fired_rx));

    let router = app::build_router(Arc::clone(&state));
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("colloquy gateway listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    Ok(())
}
