use std::sync::Arc;
use std::time::Duration;

use regex::RegexBuilder;
use serde::Deserialize;
use tracing::{debug, info, warn};

use colloquy_model::{ChatMessage, GenerateOptions, ModelClient, MsgRole};

use crate::cache::ResultCache;
use crate::registry::ToolRegistry;
use crate::tool::{ToolDescriptor, ToolKind};

/// Decision thresholds and cache sizing for the invoker.
#[derive(Clone)]
pub struct InvokerConfig {
    /// Rule-pass scores at or above this invoke the top tool directly.
    pub confidence_high: f64,
    /// Model-consulted decisions below this mean "no tool".
    pub confidence_low: f64,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    /// Options for the short decision prompt sent to the model.
    pub decision_opts: GenerateOptions,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            confidence_high: 0.7,
            confidence_low: 0.4,
            cache_capacity: 100,
            cache_ttl: Duration::from_secs(3600),
            decision_opts: GenerateOptions {
                max_tokens: 256,
                temperature: 0.0,
                ..Default::default()
            },
        }
    }
}

/// One completed (or failed) tool execution.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub tool: String,
    pub args: serde_json::Value,
    /// Tool output, or `[error] …` when the tool failed.
    pub output: String,
    pub confidence: f64,
    pub cached: bool,
    pub failed: bool,
}

/// Decides whether a user utterance warrants a tool call, runs it, and
/// caches results.
///
/// The decision is hybrid: a cheap rule pass over each tool's declared
/// triggers first; only ambiguous cases consult the model with a short
/// structured prompt.
pub struct ToolInvoker {
    registry: Arc<ToolRegistry>,
    model: Arc<dyn ModelClient>,
    cache: ResultCache,
    cfg: InvokerConfig,
}

#[derive(Deserialize)]
struct ModelDecision {
    tool: Option<String>,
    #[serde(default)]
    args: serde_json::Value,
    #[serde(default)]
    confidence: f64,
}

impl ToolInvoker {
    pub fn new(registry: Arc<ToolRegistry>, model: Arc<dyn ModelClient>, cfg: InvokerConfig) -> Self {
        Self {
            cache: ResultCache::new(cfg.cache_capacity, cfg.cache_ttl),
            registry,
            model,
            cfg,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Decide and, if warranted, execute. `None` means "no tool" — which is
    /// the common case and never an error.
    pub async fn maybe_invoke(
        &self,
        user_text: &str,
        context_summary: &str,
    ) -> Option<Invocation> {
        let descriptors = self.registry.list(None);
        if descriptors.is_empty() {
            return None;
        }

        // Rule pass.
        let mut scored: Vec<(f64, &ToolDescriptor)> = descriptors
            .iter()
            .map(|d| (rule_score(user_text, d), d))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        // Ties: chains beat single tools, then lexicographic name.
        scored.sort_by(|(sa, da), (sb, db)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| chain_rank(da.kind).cmp(&chain_rank(db.kind)))
                .then_with(|| da.name.cmp(&db.name))
        });

        if let Some((score, top)) = scored.first() {
            if *score >= self.cfg.confidence_high {
                debug!(tool = %top.name, score = *score, "rule pass selected tool");
                return Some(
                    self.invoke(&top.name, serde_json::json!({ "input": user_text }), *score)
                        .await,
                );
            }
        }

        // Ambiguous: consult the model.
        let decision = self.consult_model(user_text, context_summary, &descriptors).await?;
        let name = decision.tool?;
        if decision.confidence < self.cfg.confidence_low {
            debug!(tool = %name, confidence = decision.confidence, "below low threshold, no tool");
            return None;
        }
        if self.registry.get(&name, None).is_err() {
            warn!(tool = %name, "model chose an unknown tool");
            return None;
        }
        let args = if decision.args.is_null() {
            serde_json::json!({ "input": user_text })
        } else {
            decision.args
        };
        Some(self.invoke(&name, args, decision.confidence).await)
    }

    /// Execute a named tool through the cache. Failures become the result
    /// string so the dialogue pipeline continues and the model can recover.
    pub async fn invoke(&self, name: &str, args: serde_json::Value, confidence: f64) -> Invocation {
        if let Some(output) = self.cache.get(name, &args) {
            return Invocation {
                tool: name.to_string(),
                args,
                output,
                confidence,
                cached: true,
                failed: false,
            };
        }

        let result = match self.registry.get(name, None) {
            Ok(tool) => tool.run(args.clone()).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(output) => {
                self.cache.put(name, &args, output.clone());
                info!(tool = name, "tool executed");
                Invocation {
                    tool: name.to_string(),
                    args,
                    output,
                    confidence,
                    cached: false,
                    failed: false,
                }
            }
            Err(e) => {
                warn!(tool = name, error = %e, "tool execution failed");
                Invocation {
                    tool: name.to_string(),
                    args,
                    output: format!("[error] {e}"),
                    confidence,
                    cached: false,
                    failed: true,
                }
            }
        }
    }

    async fn consult_model(
        &self,
        user_text: &str,
        context_summary: &str,
        descriptors: &[ToolDescriptor],
    ) -> Option<ModelDecision> {
        let prompt = decision_prompt(user_text, context_summary, descriptors);
        let messages = [ChatMessage::new(MsgRole::User, prompt)];
        match self.model.generate(&messages, &self.cfg.decision_opts).await {
            Ok(generation) => parse_decision(&generation.text),
            Err(e) => {
                debug!(error = %e, "tool decision consult failed, assuming no tool");
                None
            }
        }
    }
}

fn chain_rank(kind: ToolKind) -> u8 {
    match kind {
        ToolKind::Chain => 0,
        ToolKind::Single => 1,
    }
}

/// Score one tool against the utterance: a trigger hit (regex or plain
/// substring) scores 0.9, a bare tool-name mention 0.6. Ambiguous mentions
/// land between the bands and go to the model for arbitration.
fn rule_score(user_text: &str, descriptor: &ToolDescriptor) -> f64 {
    let lowered = user_text.to_lowercase();
    for trigger in &descriptor.triggers {
        let hit = match RegexBuilder::new(trigger).case_insensitive(true).build() {
            Ok(re) => re.is_match(user_text),
            Err(_) => lowered.contains(&trigger.to_lowercase()),
        };
        if hit {
            return 0.9;
        }
    }
    if lowered.contains(&descriptor.name.to_lowercase()) {
        return 0.6;
    }
    0.0
}

fn decision_prompt(
    user_text: &str,
    context_summary: &str,
    descriptors: &[ToolDescriptor],
) -> String {
    let mut out = String::from(
        "Decide whether any of these tools should handle the user's message.\n\nTools:\n",
    );
    for d in descriptors {
        out.push_str(&format!("- {}: {}\n", d.name, d.description));
    }
    if !context_summary.is_empty() {
        out.push_str(&format!("\nConversation context: {context_summary}\n"));
    }
    out.push_str(&format!("\nUser message: {user_text}\n"));
    out.push_str(
        "\nReply with JSON only: {\"tool\": <name or null>, \"args\": <object>, \
         \"confidence\": <0..1>}",
    );
    out
}

/// Pull the decision object out of the model reply, tolerating surrounding
/// prose.
fn parse_decision(reply: &str) -> Option<ModelDecision> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    serde_json::from_str(&reply[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::register_builtins;
    use crate::registry::ToolStatus;
    use crate::tool::Tool;
    use async_trait::async_trait;
    use colloquy_model::{Generation, ModelError};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Model stub that always answers with a fixed string.
    struct FixedModel(String);

    #[async_trait]
    impl ModelClient for FixedModel {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn generate(
            &self,
            _messages: &[ChatMessage],
            _opts: &GenerateOptions,
        ) -> Result<Generation, ModelError> {
            Ok(Generation {
                text: self.0.clone(),
                model: "fixed".into(),
                tokens_in: 0,
                tokens_out: 0,
            })
        }
    }

    /// Tool that counts how many times it ran.
    struct CountingTool {
        runs: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            "counting"
        }
        fn description(&self) -> &str {
            "counts runs"
        }
        fn triggers(&self) -> Vec<String> {
            vec!["count it".to_string()]
        }
        async fn run(&self, _args: serde_json::Value) -> crate::error::Result<String> {
            let n = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("run #{n}"))
        }
    }

    fn invoker_with(model: Arc<dyn ModelClient>, cfg: InvokerConfig) -> ToolInvoker {
        let registry = Arc::new(ToolRegistry::new());
        register_builtins(&registry).unwrap();
        ToolInvoker::new(registry, model, cfg)
    }

    #[tokio::test]
    async fn rule_pass_selects_calculator_without_model() {
        // Model replies "no tool" — the rule pass must not even need it.
        let model = Arc::new(FixedModel(r#"{"tool": null}"#.into()));
        let invoker = invoker_with(model, InvokerConfig::default());

        let inv = invoker
            .maybe_invoke("calculate 15*7+22/11", "")
            .await
            .expect("calculator should fire");
        assert_eq!(inv.tool, "calculator");
        assert_eq!(inv.output, "107");
        assert!(!inv.cached);
        assert!(inv.confidence >= 0.7);
    }

    #[tokio::test]
    async fn plain_chat_invokes_nothing() {
        let model = Arc::new(FixedModel(r#"{"tool": null, "confidence": 0.0}"#.into()));
        let invoker = invoker_with(model, InvokerConfig::default());
        assert!(invoker.maybe_invoke("tell me a story", "").await.is_none());
    }

    #[tokio::test]
    async fn model_consult_picks_tool_above_low_band() {
        let model = Arc::new(FixedModel(
            r#"{"tool": "calculator", "args": {"input": "2+2"}, "confidence": 0.55}"#.into(),
        ));
        let invoker = invoker_with(model, InvokerConfig::default());
        let inv = invoker
            .maybe_invoke("could you work out two plus two", "")
            .await
            .expect("model decision should fire");
        assert_eq!(inv.output, "4");
    }

    #[tokio::test]
    async fn model_consult_below_low_band_means_no_tool() {
        let model = Arc::new(FixedModel(
            r#"{"tool": "calculator", "args": {}, "confidence": 0.2}"#.into(),
        ));
        let invoker = invoker_with(model, InvokerConfig::default());
        assert!(invoker
            .maybe_invoke("could you maybe add something", "")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn cache_hit_skips_execution_until_ttl() {
        let runs = Arc::new(AtomicU32::new(0));
        let registry = Arc::new(ToolRegistry::new());
        registry
            .register(
                Arc::new(CountingTool { runs: runs.clone() }),
                "1.0.0",
                ToolStatus::Stable,
                false,
            )
            .unwrap();
        let cfg = InvokerConfig {
            cache_ttl: Duration::from_millis(40),
            ..Default::default()
        };
        let invoker = ToolInvoker::new(
            registry,
            Arc::new(FixedModel(r#"{"tool": null}"#.into())),
            cfg,
        );

        let first = invoker.maybe_invoke("count it", "").await.unwrap();
        let second = invoker.maybe_invoke("count it", "").await.unwrap();
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let third = invoker.maybe_invoke("count it", "").await.unwrap();
        assert!(!third.cached);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn tool_failure_becomes_error_result_string() {
        let model = Arc::new(FixedModel(r#"{"tool": null}"#.into()));
        let invoker = invoker_with(model, InvokerConfig::default());
        // Trigger matches but the text has no evaluable expression.
        let inv = invoker.maybe_invoke("calculate nothing at all", "").await.unwrap();
        assert!(inv.failed);
        assert!(inv.output.starts_with("[error]"));
    }

    #[test]
    fn decision_parse_tolerates_prose() {
        let reply = "Sure! Here you go: {\"tool\": \"clock\", \"args\": {}, \"confidence\": 0.8} hope that helps";
        let d = parse_decision(reply).unwrap();
        assert_eq!(d.tool.as_deref(), Some("clock"));
    }

    #[test]
    fn chains_win_score_ties() {
        let a = ToolDescriptor {
            name: "zeta".into(),
            description: String::new(),
            usage: String::new(),
            version: "1.0.0".into(),
            status: ToolStatus::Stable,
            kind: ToolKind::Chain,
            modalities: vec![],
            triggers: vec!["go".into()],
        };
        let b = ToolDescriptor {
            name: "alpha".into(),
            kind: ToolKind::Single,
            ..a.clone()
        };
        let mut scored = vec![(0.9, &b), (0.9, &a)];
        scored.sort_by(|(sa, da), (sb, db)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| chain_rank(da.kind).cmp(&chain_rank(db.kind)))
                .then_with(|| da.name.cmp(&db.name))
        });
        assert_eq!(scored[0].1.name, "zeta");
    }
}
