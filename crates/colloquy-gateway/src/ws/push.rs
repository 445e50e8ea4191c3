//! Per-user push subscriptions and the proactive delivery task.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use colloquy_proactive::Expression;

/// Buffered frames per subscriber before sends start dropping.
const SUBSCRIBER_BUFFER: usize = 128;

struct Subscriber {
    conn_id: String,
    tx: mpsc::Sender<String>,
}

/// Registry of live push subscriptions: userId → connections.
///
/// Registered on WS connect, dropped on disconnect. A user may hold several
/// connections (multiple tabs); every one receives each frame.
#[derive(Default)]
pub struct PushRegistry {
    subscribers: DashMap<String, Vec<Subscriber>>,
}

impl PushRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for a user; returns the receiving end for the
    /// WS send pump.
    pub fn subscribe(&self, user_id: &str, conn_id: &str) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.subscribers
            .entry(user_id.to_string())
            .or_default()
            .push(Subscriber {
                conn_id: conn_id.to_string(),
                tx,
            });
        debug!(user_id, conn_id, "push subscription registered");
        rx
    }

    pub fn unsubscribe(&self, user_id: &str, conn_id: &str) {
        if let Some(mut entry) = self.subscribers.get_mut(user_id) {
            entry.retain(|s| s.conn_id != conn_id);
        }
        self.subscribers
            .remove_if(user_id, |_, subs| subs.is_empty());
        debug!(user_id, conn_id, "push subscription dropped");
    }

    /// Deliver a frame to every connection of one user. Slow consumers with
    /// full buffers miss the frame rather than stalling delivery.
    pub fn push_to_user(&self, user_id: &str, payload: &str) -> usize {
        let Some(entry) = self.subscribers.get(user_id) else {
            return 0;
        };
        let mut delivered = 0;
        for subscriber in entry.iter() {
            if subscriber.tx.try_send(payload.to_string()).is_ok() {
                delivered += 1;
            } else {
                warn!(user_id, conn_id = %subscriber.conn_id, "push buffer full, frame dropped");
            }
        }
        delivered
    }
}

/// Wire frame for a fired proactive expression.
pub fn expression_frame(expression: &Expression) -> String {
    serde_json::json!({
        "type": "proactive_expression",
        "sessionId": expression.session_id,
        "content": expression.content,
        "metadata": {
            "expressionType": expression.expression_type,
            "expressionId": expression.id,
            "priority": expression.priority,
        },
    })
    .to_string()
}

/// Background task that forwards fired expressions to their users'
/// subscriptions. Spawned once in `main`; runs until the engine's send
/// half closes.
pub async fn run_push_delivery(
    push: std::sync::Arc<PushRegistry>,
    mut fired_rx: mpsc::Receiver<Expression>,
) {
    while let Some(expression) = fired_rx.recv().await {
        let frame = expression_frame(&expression);
        let delivered = push.push_to_user(&expression.user_id, &frame);
        info!(
            expression_id = %expression.id,
            user_id = %expression.user_id,
            delivered,
            "proactive frame delivered"
        );
    }
    info!("push delivery task exiting (channel closed)");
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_core::types::Metadata;
    use colloquy_proactive::{ExpressionState, ExpressionType};

    fn expression() -> Expression {
        Expression {
            id: "e1".to_string(),
            user_id: "u1".to_string(),
            session_id: "s1".to_string(),
            expression_type: ExpressionType::Greeting,
            content: "Good morning!".to_string(),
            priority: 2,
            state: ExpressionState::Fired,
            created_at: "2026-08-01T07:00:00Z".to_string(),
            scheduled_at: "2026-08-01T07:00:00Z".to_string(),
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn frames_reach_every_connection_of_the_user() {
        let push = PushRegistry::new();
        let mut rx1 = push.subscribe("u1", "c1");
        let mut rx2 = push.subscribe("u1", "c2");
        let mut other = push.subscribe("u2", "c3");

        let delivered = push.push_to_user("u1", "frame");
        assert_eq!(delivered, 2);
        assert_eq!(rx1.try_recv().unwrap(), "frame");
        assert_eq!(rx2.try_recv().unwrap(), "frame");
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let push = PushRegistry::new();
        let _rx = push.subscribe("u1", "c1");
        push.unsubscribe("u1", "c1");
        assert_eq!(push.push_to_user("u1", "frame"), 0);
    }

    #[test]
    fn frame_shape_matches_the_push_contract() {
        let frame = expression_frame(&expression());
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "proactive_expression");
        assert_eq!(value["sessionId"], "s1");
        assert_eq!(value["content"], "Good morning!");
        assert_eq!(value["metadata"]["expressionType"], "greeting");
    }
}
