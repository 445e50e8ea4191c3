use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 18650;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Hard cap on a single request body.
pub const MAX_BODY_BYTES: usize = 256 * 1024;

/// Top-level config (colloquy.toml + COLLOQUY_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ColloquyConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub dialogue: DialogueConfig,
    #[serde(default)]
    pub proactive: ProactiveConfig,
}

impl ColloquyConfig {
    /// Load config from `config_path`, falling back to
    /// `$COLLOQUY_CONFIG`, then `~/.colloquy/colloquy.toml`.
    ///
    /// Every section has full defaults, so a missing file yields a runnable
    /// configuration (the model backend then operates in fallback mode until
    /// an API key is supplied).
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: ColloquyConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("COLLOQUY_").split("_"))
            .extract()
            .map_err(|e| crate::error::ColloquyError::Config(e.to_string()))?;

        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Requests beyond this many concurrently processing inputs get 503.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Whole-request deadline in seconds; expiry yields the fallback reply
    /// with `metadata.timeout=true`, never a hung caller.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            max_in_flight: default_max_in_flight(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// OpenAI-compatible chat completions endpoint base URL (no trailing slash).
    #[serde(default = "default_model_base_url")]
    pub base_url: String,
    pub api_key: Option<String>,
    #[serde(default = "default_model_name")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Per-call deadline. Timeouts are transient: the orchestrator answers
    /// with its deterministic fallback instead of failing the request.
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_model_base_url(),
            api_key: None,
            model: default_model_name(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_model_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Rule-pass scores at or above this invoke the tool directly.
    #[serde(default = "default_confidence_high")]
    pub confidence_high: f64,
    /// Model-consulted scores below this mean "no tool".
    #[serde(default = "default_confidence_low")]
    pub confidence_low: f64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Directory of TOML tool definitions scanned at startup.
    pub definitions_dir: Option<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            confidence_high: default_confidence_high(),
            confidence_low: default_confidence_low(),
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: default_cache_ttl_secs(),
            definitions_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Budget for caller-supplied context material, in tokens (~4 chars each).
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: default_max_context_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueConfig {
    #[serde(default = "default_session_title")]
    pub default_session_title: String,
    /// Number of generated utterances in one AI_AI exchange.
    #[serde(default = "default_ai_ai_turn_budget")]
    pub ai_ai_turn_budget: u32,
    /// Test hook: surface the assembled system message in reply metadata.
    #[serde(default)]
    pub expose_assembled_context: bool,
    /// How many prior turns are loaded into the model context.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            default_session_title: default_session_title(),
            ai_ai_turn_budget: default_ai_ai_turn_budget(),
            expose_assembled_context: false,
            history_limit: default_history_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProactiveConfig {
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// No expression within this many minutes of the last human turn.
    #[serde(default = "default_min_quiet_minutes")]
    pub min_quiet_minutes: u32,
    /// Queue bound; when full the oldest queued expression is cancelled.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Daily expression caps per relationship stage:
    /// initial / developing / established / close.
    #[serde(default = "default_stage_caps")]
    pub stage_caps: [u32; 4],
}

impl Default for ProactiveConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            min_quiet_minutes: default_min_quiet_minutes(),
            queue_capacity: default_queue_capacity(),
            stage_caps: default_stage_caps(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_max_in_flight() -> usize {
    64
}
fn default_request_timeout_secs() -> u64 {
    90
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.colloquy/colloquy.db", home)
}
fn default_model_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_model_name() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_model_timeout_secs() -> u64 {
    60
}
fn default_confidence_high() -> f64 {
    0.7
}
fn default_confidence_low() -> f64 {
    0.4
}
fn default_cache_capacity() -> usize {
    100
}
fn default_cache_ttl_secs() -> u64 {
    3600
}
fn default_max_context_tokens() -> usize {
    1000
}
fn default_session_title() -> String {
    "New conversation".to_string()
}
fn default_ai_ai_turn_budget() -> u32 {
    4
}
fn default_history_limit() -> usize {
    40
}
fn default_tick_secs() -> u64 {
    60
}
fn default_min_quiet_minutes() -> u32 {
    15
}
fn default_queue_capacity() -> usize {
    128
}
fn default_stage_caps() -> [u32; 4] {
    [1, 3, 5, 8]
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.colloquy/colloquy.toml", home)
}
