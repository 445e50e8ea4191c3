use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::client::{
    ChatMessage, Generation, GenerateOptions, ModelClient, ModelError, MsgRole,
};

/// OpenAI-compatible chat completions backend.
pub struct HttpModelClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    backend_name: String,
    /// Endpoint path joined onto `base_url`, normally
    /// `/v1/chat/completions`.
    chat_path: String,
}

impl HttpModelClient {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self::with_path(
            "openai",
            api_key,
            base_url.unwrap_or_else(|| "https://api.openai.com".to_string()),
            "/v1/chat/completions".to_string(),
        )
    }

    /// Create a named OpenAI-compatible backend with a custom endpoint
    /// path. `base_url` must not carry a trailing slash.
    pub fn with_path(
        name: impl Into<String>,
        api_key: String,
        base_url: String,
        chat_path: String,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            backend_name: name.into(),
            api_key,
            base_url,
            chat_path,
        }
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    fn name(&self) -> &str {
        &self.backend_name
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        opts: &GenerateOptions,
    ) -> Result<Generation, ModelError> {
        let body = build_request_body(messages, opts);
        let url = format!("{}{}", self.base_url, self.chat_path);

        debug!(model = %opts.model, messages = messages.len(), "sending generate request");

        let fut = async {
            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await?;

            let status = resp.status().as_u16();
            if status == 429 {
                let retry = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(|s| s * 1000)
                    .unwrap_or(5000);
                return Err(ModelError::RateLimited {
                    retry_after_ms: retry,
                });
            }

            if !resp.status().is_success() {
                let text = resp.text().await.unwrap_or_default();
                warn!(status, body = %text, "model API error");
                return Err(ModelError::Api {
                    status,
                    message: text,
                });
            }

            let api_resp: ApiResponse = resp
                .json()
                .await
                .map_err(|e| ModelError::Parse(e.to_string()))?;

            parse_response(api_resp)
        };

        match tokio::time::timeout(opts.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout(opts.timeout)),
        }
    }
}

pub(crate) fn build_request_body(
    messages: &[ChatMessage],
    opts: &GenerateOptions,
) -> serde_json::Value {
    let wire_messages: Vec<serde_json::Value> = messages
        .iter()
        .map(|m| match m.role {
            // The completions wire format rejects bare tool-role messages
            // without a call id, so spliced tool results travel as user
            // messages with an explicit marker.
            MsgRole::Tool => serde_json::json!({
                "role": "user",
                "content": format!("[tool result] {}", m.content),
            }),
            MsgRole::System => serde_json::json!({ "role": "system", "content": m.content }),
            MsgRole::User => serde_json::json!({ "role": "user", "content": m.content }),
            MsgRole::Assistant => {
                serde_json::json!({ "role": "assistant", "content": m.content })
            }
        })
        .collect();

    serde_json::json!({
        "model": opts.model,
        "messages": wire_messages,
        "max_tokens": opts.max_tokens,
        "temperature": opts.temperature,
    })
}

pub(crate) fn parse_response(resp: ApiResponse) -> Result<Generation, ModelError> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ModelError::Parse("response contained no choices".to_string()))?;

    Ok(Generation {
        text: choice.message.content.unwrap_or_default(),
        model: resp.model,
        tokens_in: resp.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
        tokens_out: resp
            .usage
            .as_ref()
            .map(|u| u.completion_tokens)
            .unwrap_or(0),
    })
}

// OpenAI-compatible API response types

#[derive(Deserialize)]
pub(crate) struct ApiResponse {
    pub(crate) model: String,
    pub(crate) choices: Vec<Choice>,
    pub(crate) usage: Option<Usage>,
}

#[derive(Deserialize)]
pub(crate) struct Choice {
    pub(crate) message: WireMessage,
}

#[derive(Deserialize)]
pub(crate) struct WireMessage {
    pub(crate) content: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct Usage {
    pub(crate) prompt_tokens: u32,
    pub(crate) completion_tokens: u32,
}
