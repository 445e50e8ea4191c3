use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use colloquy_context::ContextAssembler;
use colloquy_core::types::{DialogueType, Metadata, TurnRole};
use colloquy_model::{ChatMessage, GenerateOptions, Generation, ModelClient, MsgRole};
use colloquy_store::{StoreError, Turn, TurnStore};
use colloquy_tools::ToolInvoker;

use crate::error::{DialogueError, Result};

/// How much of the most recent turn feeds the tool-decision context summary.
const SUMMARY_CHARS: usize = 200;

#[derive(Clone)]
pub struct OrchestratorConfig {
    pub generate: GenerateOptions,
    pub default_session_title: String,
    /// Number of generated utterances in one AI_AI exchange.
    pub ai_ai_turn_budget: u32,
    /// How many prior turns are loaded into the model context.
    pub history_limit: usize,
    /// Test hook: surface the assembled system message in reply metadata.
    pub expose_assembled_context: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            generate: GenerateOptions::default(),
            default_session_title: "New conversation".to_string(),
            ai_ai_turn_budget: 4,
            history_limit: 40,
            expose_assembled_context: false,
        }
    }
}

pub struct ProcessRequest {
    pub user_id: String,
    pub session_id: Option<String>,
    pub text: String,
    pub context: Option<Metadata>,
    /// Request deadline token; on expiry the reply degrades to the
    /// deterministic fallback with `metadata.timeout=true`.
    pub cancel: CancellationToken,
}

impl ProcessRequest {
    pub fn new(user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: None,
            text: text.into(),
            context: None,
            cancel: CancellationToken::new(),
        }
    }
}

/// What one pipeline run hands back to the boundary.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub reply: String,
    pub session_id: String,
    /// Id of the committed AI turn.
    pub turn_id: String,
    /// RFC3339 completion instant.
    pub timestamp: String,
    pub metadata: Metadata,
}

/// Drives the per-request pipeline; depends on every other component and
/// none depend back on it.
pub struct DialogueOrchestrator {
    store: Arc<TurnStore>,
    model: Arc<dyn ModelClient>,
    invoker: Arc<ToolInvoker>,
    assembler: ContextAssembler,
    cfg: OrchestratorConfig,
}

impl DialogueOrchestrator {
    pub fn new(
        store: Arc<TurnStore>,
        model: Arc<dyn ModelClient>,
        invoker: Arc<ToolInvoker>,
        assembler: ContextAssembler,
        cfg: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            model,
            invoker,
            assembler,
            cfg,
        }
    }

    /// Run the full pipeline for one user utterance.
    ///
    /// Exactly one inbound turn and one AI turn are committed (plus at most
    /// one tool turn between them); AI_AI sessions instead commit the
    /// inbound turn and one AI turn per budgeted exchange step.
    #[instrument(skip(self, req), fields(user_id = %req.user_id))]
    pub async fn process_input(&self, req: ProcessRequest) -> Result<ProcessOutcome> {
        if req.text.trim().is_empty() {
            return Err(DialogueError::Malformed("input must not be empty".into()));
        }
        if req.user_id.trim().is_empty() {
            return Err(DialogueError::Malformed("userId must not be empty".into()));
        }

        let session = self.resolve_session(&req)?;

        match session.dialogue_type {
            DialogueType::AiAi => self.run_ai_exchange(&req, &session).await,
            _ => self.run_pipeline(&req, &session).await,
        }
    }

    // --- session resolution ------------------------------------------------

    fn resolve_session(&self, req: &ProcessRequest) -> Result<colloquy_store::Session> {
        if let Some(id) = req.session_id.as_deref().filter(|s| !s.trim().is_empty()) {
            match self.store.get_session(id) {
                Ok(session) => return Ok(session),
                Err(StoreError::SessionNotFound { .. }) => {
                    info!(session_id = id, "session did not resolve, creating a new one");
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.create_session(req)
    }

    fn create_session(&self, req: &ProcessRequest) -> Result<colloquy_store::Session> {
        let title = req
            .context
            .as_ref()
            .and_then(|c| c.get("title"))
            .and_then(|v| v.as_str())
            .unwrap_or(&self.cfg.default_session_title)
            .to_string();
        let dialogue_type = match req
            .context
            .as_ref()
            .and_then(|c| c.get("dialogueType"))
            .and_then(|v| v.as_str())
        {
            Some(raw) => Some(
                raw.parse::<DialogueType>()
                    .map_err(DialogueError::Malformed)?,
            ),
            None => None,
        };
        Ok(self
            .store
            .create_session(&req.user_id, Some(&title), dialogue_type, None)?)
    }

    // --- the standard pipeline ---------------------------------------------

    async fn run_pipeline(
        &self,
        req: &ProcessRequest,
        session: &colloquy_store::Session,
    ) -> Result<ProcessOutcome> {
        // Self-reflection sessions record the inbound prompt as a system
        // directive rather than a human utterance.
        let inbound_role = match session.dialogue_type {
            DialogueType::AiSelfReflection => TurnRole::System,
            _ => TurnRole::Human,
        };

        // Load history before committing the inbound turn so the snapshot
        // and the trailing user message never duplicate each other.
        let history = self
            .store
            .get_turns(&session.id, Some(self.cfg.history_limit), None)?;

        // Committed before the model call: concurrent readers of this
        // session must observe the user's utterance.
        let inbound_turn =
            self.store
                .create_turn(&session.id, inbound_role, &req.text, None)?;

        let messages = self.assembler.build(
            &history,
            &req.text,
            req.context.as_ref(),
            session.dialogue_type,
        );
        let assembled_system = messages
            .first()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        // Tool decision. A cancelled decision counts as "no tool".
        let summary = history
            .last()
            .map(|t| truncate(&t.content, SUMMARY_CHARS))
            .unwrap_or_default();
        let invocation = match run_or_cancel(
            &req.cancel,
            self.invoker.maybe_invoke(&req.text, &summary),
        )
        .await
        {
            Some(inv) => inv,
            None => None,
        };

        let mut messages = messages;
        let mut tools_used: Vec<String> = Vec::new();
        let mut tool_turn_fallback = false;
        if let Some(inv) = &invocation {
            let mut tool_meta = Metadata::new();
            tool_meta.insert("tool".into(), serde_json::json!(inv.tool));
            tool_meta.insert("args".into(), inv.args.clone());
            tool_meta.insert("cached".into(), serde_json::json!(inv.cached));
            if inv.failed {
                tool_meta.insert("failed".into(), serde_json::json!(true));
            }
            let tool_turn =
                self.store
                    .create_turn(&session.id, TurnRole::Tool, &inv.output, Some(tool_meta))?;
            tool_turn_fallback = tool_turn.is_fallback();
            messages.push(ChatMessage::new(MsgRole::Tool, inv.output.clone()));
            tools_used.push(inv.tool.clone());
        }

        // Generate — transient failure or deadline expiry degrades to the
        // deterministic echo fallback, never a failed request.
        let mut model_fallback = false;
        let mut timed_out = false;
        let mut usage: Option<Generation> = None;
        let reply = match run_or_cancel(&req.cancel, self.model.generate(&messages, &self.cfg.generate))
            .await
        {
            Some(Ok(generation)) => {
                let text = generation.text.clone();
                usage = Some(generation);
                text
            }
            Some(Err(e)) => {
                warn!(error = %e, transient = e.is_transient(), "model call failed, using fallback reply");
                model_fallback = true;
                fallback_reply(&req.text)
            }
            None => {
                warn!("request deadline expired during generation");
                timed_out = true;
                fallback_reply(&req.text)
            }
        };

        // Commit the AI turn and touch session activity.
        let mut ai_meta = Metadata::new();
        if let Some(generation) = &usage {
            ai_meta.insert(
                "usage".into(),
                serde_json::json!({
                    "model": generation.model,
                    "tokensIn": generation.tokens_in,
                    "tokensOut": generation.tokens_out,
                }),
            );
        }
        if !tools_used.is_empty() {
            ai_meta.insert("toolsUsed".into(), serde_json::json!(tools_used));
        }
        if req.context.as_ref().map(|c| !c.is_empty()).unwrap_or(false) {
            ai_meta.insert("contextUsed".into(), serde_json::json!(true));
        }
        if model_fallback {
            ai_meta.insert("modelFallback".into(), serde_json::json!(true));
        }
        if timed_out {
            ai_meta.insert("timeout".into(), serde_json::json!(true));
        }
        if session.dialogue_type == DialogueType::AiSelfReflection {
            ai_meta.insert("reflection".into(), serde_json::json!(true));
        }
        if session.dialogue_type.is_group() {
            ai_meta.insert(
                "dialogueType".into(),
                serde_json::json!(session.dialogue_type.to_string()),
            );
        }
        let ai_turn = self
            .store
            .create_turn(&session.id, TurnRole::Ai, &reply, Some(ai_meta.clone()))?;

        let now = chrono::Utc::now().to_rfc3339();
        self.store.update_session_activity(&session.id, &now)?;
        let committed = 2 + u32::from(invocation.is_some());
        let tokens = usage
            .as_ref()
            .map(|g| (g.tokens_in + g.tokens_out) as u64)
            .unwrap_or(0);
        self.store.update_session_stats(
            &session.id,
            committed,
            tokens,
            usage.as_ref().map(|g| g.model.as_str()),
        )?;

        let degraded = session.is_fallback()
            || inbound_turn.is_fallback()
            || tool_turn_fallback
            || ai_turn.is_fallback();

        let mut metadata = ai_meta;
        if degraded {
            metadata.insert("fallback".into(), serde_json::json!(true));
        }
        if self.cfg.expose_assembled_context {
            metadata.insert("assembledSystem".into(), serde_json::json!(assembled_system));
        }

        Ok(ProcessOutcome {
            reply,
            session_id: session.id.clone(),
            turn_id: ai_turn.id,
            timestamp: now,
            metadata,
        })
    }

    // --- AI_AI dispatch ----------------------------------------------------

    /// Two personas alternate generate calls until the turn budget is
    /// reached; every generated utterance is committed as an `ai` turn and
    /// the final one is the returned reply.
    async fn run_ai_exchange(
        &self,
        req: &ProcessRequest,
        session: &colloquy_store::Session,
    ) -> Result<ProcessOutcome> {
        let history = self
            .store
            .get_turns(&session.id, Some(self.cfg.history_limit), None)?;
        let inbound_turn = self
            .store
            .create_turn(&session.id, TurnRole::Human, &req.text, None)?;

        let mut exchange: Vec<String> = history
            .iter()
            .map(|t: &Turn| t.content.clone())
            .collect();
        exchange.push(req.text.clone());

        let mut model_fallback = false;
        let mut timed_out = false;
        let mut reply = fallback_reply(&req.text);
        let mut last_turn_id = inbound_turn.id.clone();
        let mut degraded = session.is_fallback() || inbound_turn.is_fallback();
        let mut committed: u32 = 1;
        let mut tokens: u64 = 0;
        let mut last_model: Option<String> = None;

        for step in 0..self.cfg.ai_ai_turn_budget {
            let persona = if step % 2 == 0 { PERSONA_A } else { PERSONA_B };
            let messages = persona_messages(persona, &exchange);

            match run_or_cancel(&req.cancel, self.model.generate(&messages, &self.cfg.generate))
                .await
            {
                Some(Ok(generation)) => {
                    let mut meta = Metadata::new();
                    meta.insert(
                        "persona".into(),
                        serde_json::json!(if step % 2 == 0 { "a" } else { "b" }),
                    );
                    let turn = self.store.create_turn(
                        &session.id,
                        TurnRole::Ai,
                        &generation.text,
                        Some(meta),
                    )?;
                    degraded = degraded || turn.is_fallback();
                    last_turn_id = turn.id;
                    committed += 1;
                    tokens += (generation.tokens_in + generation.tokens_out) as u64;
                    last_model = Some(generation.model);
                    exchange.push(generation.text.clone());
                    reply = generation.text;
                }
                Some(Err(e)) => {
                    warn!(error = %e, step, "AI exchange step failed, ending early");
                    model_fallback = true;
                    break;
                }
                None => {
                    warn!(step, "request deadline expired during AI exchange");
                    timed_out = true;
                    break;
                }
            }
        }

        let now = chrono::Utc::now().to_rfc3339();
        self.store.update_session_activity(&session.id, &now)?;
        self.store
            .update_session_stats(&session.id, committed, tokens, last_model.as_deref())?;

        let mut metadata = Metadata::new();
        metadata.insert("aiExchange".into(), serde_json::json!(true));
        if model_fallback {
            metadata.insert("modelFallback".into(), serde_json::json!(true));
        }
        if timed_out {
            metadata.insert("timeout".into(), serde_json::json!(true));
        }
        if degraded {
            metadata.insert("fallback".into(), serde_json::json!(true));
        }

        Ok(ProcessOutcome {
            reply,
            session_id: session.id.clone(),
            turn_id: last_turn_id,
            timestamp: now,
            metadata,
        })
    }
}

const PERSONA_A: &str = "You are persona A in a structured exchange between two \
AI interlocutors. Advance the discussion; engage with the last point directly.";
const PERSONA_B: &str = "You are persona B in a structured exchange between two \
AI interlocutors. Challenge or extend the last point; do not simply agree.";

/// Build the alternating message list for one persona's step: its own prior
/// utterances appear as assistant turns, everything else as user turns.
fn persona_messages(persona: &str, exchange: &[String]) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::new(MsgRole::System, persona.to_string())];
    let count = exchange.len();
    for (i, utterance) in exchange.iter().enumerate() {
        // The utterance immediately before this step belongs to the other
        // speaker, so parity from the end decides attribution.
        let role = if (count - i) % 2 == 1 {
            MsgRole::User
        } else {
            MsgRole::Assistant
        };
        messages.push(ChatMessage::new(role, utterance.clone()));
    }
    messages
}

/// The deterministic reply used whenever the model backend cannot answer.
pub fn fallback_reply(text: &str) -> String {
    format!(
        "I received your message but cannot generate an intelligent reply right now \
         — echoing it back: {text}"
    )
}

async fn run_or_cancel<F, T>(cancel: &CancellationToken, fut: F) -> Option<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}
