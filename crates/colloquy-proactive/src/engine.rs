use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use colloquy_core::types::{Metadata, TurnRole};
use colloquy_model::{ChatMessage, GenerateOptions, ModelClient, MsgRole};
use colloquy_store::TurnStore;

use crate::decision::{daily_cap, should_express};
use crate::error::{ProactiveError, Result};
use crate::settings::FrequencySettings;
use crate::signals::{sample, SignalSnapshot};
use crate::templates::template;
use crate::types::{Expression, ExpressionState, ExpressionType};

/// Engine tuning, mirrored from the `[proactive]` config section.
#[derive(Clone)]
pub struct EngineConfig {
    pub tick: std::time::Duration,
    pub min_quiet_minutes: u32,
    pub queue_capacity: usize,
    /// Daily caps per relationship stage:
    /// initial / developing / established / close.
    pub stage_caps: [u32; 4],
    pub generate: GenerateOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick: std::time::Duration::from_secs(60),
            min_quiet_minutes: 15,
            queue_capacity: 128,
            stage_caps: [1, 3, 5, 8],
            generate: GenerateOptions::default(),
        }
    }
}

struct DailyCount {
    date: String,
    count: u32,
}

/// The frequency-aware expression engine.
///
/// One instance owns the queue and the daily counters; `run` drives the
/// tick loop on a single task so evaluations never overlap. Fired
/// expressions are committed as proactive AI turns and then handed to the
/// delivery channel for the push boundary.
pub struct ProactiveEngine {
    store: Arc<TurnStore>,
    model: Arc<dyn ModelClient>,
    settings: Arc<FrequencySettings>,
    cfg: EngineConfig,
    queue: Mutex<VecDeque<Expression>>,
    sent: Mutex<HashMap<String, DailyCount>>,
    fired_tx: mpsc::Sender<Expression>,
}

impl ProactiveEngine {
    pub fn new(
        store: Arc<TurnStore>,
        model: Arc<dyn ModelClient>,
        settings: Arc<FrequencySettings>,
        cfg: EngineConfig,
        fired_tx: mpsc::Sender<Expression>,
    ) -> Self {
        Self {
            store,
            model,
            settings,
            cfg,
            queue: Mutex::new(VecDeque::new()),
            sent: Mutex::new(HashMap::new()),
            fired_tx,
        }
    }

    /// Tick loop. Runs until `shutdown` broadcasts `true`.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(tick_secs = self.cfg.tick.as_secs(), "proactive engine started");
        let mut interval = tokio::time::interval(self.cfg.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("proactive engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One evaluation pass: propose for every enabled user, then fire what
    /// is due.
    pub async fn tick(&self) {
        for user_id in self.settings.enabled_users() {
            if let Err(e) = self.evaluate_user(&user_id).await {
                error!(user_id, error = %e, "proactive evaluation failed");
            }
        }
        self.fire_due().await;
    }

    /// Manual trigger (the `/api/frequency/trigger` path). Fires
    /// immediately; only a `reminder` (which carries its own explicit
    /// trigger) bypasses the quiet window, and the daily cap always
    /// applies.
    pub async fn trigger_now(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        expression_type: ExpressionType,
    ) -> Result<Expression> {
        let settings = self.settings.get(user_id);
        if !settings.enabled {
            return Err(ProactiveError::Disabled {
                user_id: user_id.to_string(),
            });
        }
        let signals = sample(&self.store, user_id, settings.timezone_offset_minutes);

        if expression_type != ExpressionType::Reminder {
            let min_quiet = settings
                .min_quiet_minutes
                .unwrap_or(self.cfg.min_quiet_minutes) as i64;
            let too_recent = signals
                .silence_minutes
                .map(|s| s < min_quiet)
                .unwrap_or(false);
            if too_recent || settings.in_quiet_hours(signals.local_hour) {
                return Err(ProactiveError::QuietWindow {
                    user_id: user_id.to_string(),
                });
            }
        }

        let session_id = match session_id.filter(|s| !s.trim().is_empty()) {
            Some(id) => id.to_string(),
            None => signals
                .session_id
                .clone()
                .ok_or_else(|| ProactiveError::NoActiveSession {
                    user_id: user_id.to_string(),
                })?,
        };

        let cap = daily_cap(&settings, signals.stage, &self.cfg.stage_caps);
        if self.sent_today(user_id) >= cap {
            return Err(ProactiveError::DailyCapReached {
                user_id: user_id.to_string(),
                cap,
            });
        }

        let mut expression = self
            .plan_and_generate(user_id, &session_id, expression_type, 5, &signals)
            .await;
        self.fire(&mut expression).await?;
        Ok(expression)
    }

    // --- tick internals ----------------------------------------------------

    async fn evaluate_user(&self, user_id: &str) -> Result<()> {
        // One in-flight expression per user at a time.
        if self
            .queue
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.user_id == user_id)
        {
            return Ok(());
        }

        let settings = self.settings.get(user_id);
        let signals = sample(&self.store, user_id, settings.timezone_offset_minutes);
        let Some(decision) = should_express(
            &signals,
            &settings,
            self.sent_today(user_id),
            &self.cfg.stage_caps,
            self.cfg.min_quiet_minutes,
        ) else {
            return Ok(());
        };

        let Some(session_id) = signals.session_id.clone() else {
            return Ok(());
        };

        debug!(user_id, expression_type = %decision.expression_type, "expression proposed");
        let expression = self
            .plan_and_generate(
                user_id,
                &session_id,
                decision.expression_type,
                decision.priority,
                &signals,
            )
            .await;
        self.enqueue(expression);
        Ok(())
    }

    /// proposed → planned → generated: build the planner prompt, delegate
    /// to the model, fall back to the static template on failure.
    async fn plan_and_generate(
        &self,
        user_id: &str,
        session_id: &str,
        expression_type: ExpressionType,
        priority: u8,
        signals: &SignalSnapshot,
    ) -> Expression {
        let now = Utc::now().to_rfc3339();
        let mut expression = Expression {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            expression_type,
            content: String::new(),
            priority,
            state: ExpressionState::Proposed,
            created_at: now.clone(),
            scheduled_at: now,
            metadata: Metadata::new(),
        };

        let prompt = planner_prompt(expression_type, signals);
        expression.state = ExpressionState::Planned;

        let messages = [ChatMessage::new(MsgRole::User, prompt)];
        expression.content = match self.model.generate(&messages, &self.cfg.generate).await {
            Ok(generation) if !generation.text.trim().is_empty() => generation.text,
            Ok(_) | Err(_) => {
                debug!(user_id, expression_type = %expression_type.to_string(),
                       "planner generation unavailable, using template");
                expression
                    .metadata
                    .insert("template".into(), serde_json::json!(true));
                template(expression_type, signals.stage, signals.latest_topic.as_deref())
            }
        };
        expression.state = ExpressionState::Generated;
        expression
    }

    fn enqueue(&self, mut expression: Expression) {
        expression.state = ExpressionState::Queued;
        let mut queue = self.queue.lock().unwrap();
        if queue.len() >= self.cfg.queue_capacity {
            if let Some(mut oldest) = queue.pop_front() {
                oldest.state = ExpressionState::Cancelled;
                warn!(expression_id = %oldest.id, "queue full, oldest expression cancelled");
            }
        }
        queue.push_back(expression);
    }

    /// Fire every queued expression whose time has come. An expression is
    /// dropped if any turn was committed on its session after it was
    /// proposed — the user (or another expression) got there first.
    pub async fn fire_due(&self) {
        let now = Utc::now().to_rfc3339();
        let due: Vec<Expression> = {
            let mut queue = self.queue.lock().unwrap();
            let mut due = Vec::new();
            while let Some(front) = queue.front() {
                if front.scheduled_at <= now {
                    due.push(queue.pop_front().unwrap());
                } else {
                    break;
                }
            }
            due
        };

        for mut expression in due {
            if let Err(e) = self.fire(&mut expression).await {
                warn!(expression_id = %expression.id, error = %e, "expression not fired");
            }
        }
    }

    async fn fire(&self, expression: &mut Expression) -> Result<()> {
        // De-duplicate against turns that landed after the proposal.
        if let Some(latest) = self.store.latest_turn(&expression.session_id)? {
            if latest.created_at > expression.created_at {
                expression.state = ExpressionState::Cancelled;
                info!(expression_id = %expression.id, "session moved on, expression cancelled");
                return Ok(());
            }
        }

        let mut turn_meta = Metadata::new();
        turn_meta.insert("is_proactive".into(), serde_json::json!(true));
        turn_meta.insert(
            "expressionType".into(),
            serde_json::json!(expression.expression_type.to_string()),
        );
        let turn = self.store.create_turn(
            &expression.session_id,
            TurnRole::Ai,
            &expression.content,
            Some(turn_meta),
        )?;
        expression
            .metadata
            .insert("turnId".into(), serde_json::json!(turn.id));
        expression.state = ExpressionState::Fired;
        self.record_sent(&expression.user_id);
        info!(
            expression_id = %expression.id,
            user_id = %expression.user_id,
            expression_type = %expression.expression_type,
            "proactive expression fired"
        );

        // Hand off to the delivery task; a full channel cancels rather than
        // stalling the tick loop.
        if self.fired_tx.try_send(expression.clone()).is_err() {
            warn!(expression_id = %expression.id, "delivery channel full or closed");
        }
        Ok(())
    }

    // --- daily counters ----------------------------------------------------

    fn sent_today(&self, user_id: &str) -> u32 {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let sent = self.sent.lock().unwrap();
        match sent.get(user_id) {
            Some(entry) if entry.date == today => entry.count,
            _ => 0,
        }
    }

    fn record_sent(&self, user_id: &str) {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let mut sent = self.sent.lock().unwrap();
        let entry = sent.entry(user_id.to_string()).or_insert(DailyCount {
            date: today.clone(),
            count: 0,
        });
        if entry.date != today {
            entry.date = today;
            entry.count = 0;
        }
        entry.count += 1;
    }

    #[cfg(test)]
    fn queued_len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}

fn planner_prompt(expression_type: ExpressionType, signals: &SignalSnapshot) -> String {
    let mut out = format!(
        "Compose one short, natural {} message to send to the user unprompted.",
        expression_type
    );
    out.push_str(&format!(
        " Relationship stage: {:?}. Local hour: {}.",
        signals.stage, signals.local_hour
    ));
    if let Some(silence) = signals.silence_minutes {
        out.push_str(&format!(" Minutes since they last wrote: {silence}."));
    }
    if let Some(topic) = &signals.latest_topic {
        out.push_str(&format!(" Their last topic was: {topic}."));
    }
    out.push_str(" Reply with the message text only.");
    out
}
