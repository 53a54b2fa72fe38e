use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// One turn of the conversation sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatTurn>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Error)]
pub enum LlmError {
    /// The provider refused because the account is out of quota or rate limited.
    #[error("quota exhausted: {0}")]
    Quota(String),

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Anything that turns a conversation into the assistant's next reply.
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}

/// OpenAI-compatible `/chat/completions` client (HTTP direct, no SDK).
pub struct OpenAiClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiClient {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireErrorBody {
    error: WireError,
}

#[derive(Deserialize)]
struct WireError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: String,
}

#[async_trait]
impl ChatCompleter for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY is not configured"))?;

        let payload = WireRequest {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        debug!("LLM request: model={} turns={}", request.model, request.messages.len());

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }

        let raw: WireResponse = response.json().await.context("Failed to parse response")?;
        raw.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::Failed(anyhow::anyhow!("LLM returned no content")))
    }
}

/// Map a non-2xx provider response to an error, spotting quota exhaustion.
fn classify_failure(status: StatusCode, body: &str) -> LlmError {
    let parsed = serde_json::from_str::<WireErrorBody>(body).ok();
    let quota = status == StatusCode::TOO_MANY_REQUESTS
        || parsed
            .as_ref()
            .and_then(|b| b.error.code.as_deref())
            .is_some_and(|code| code == "insufficient_quota");

    let detail = parsed.map(|b| b.error.message).unwrap_or_else(|| body.to_string());
    if quota {
        LlmError::Quota(detail)
    } else {
        LlmError::Failed(anyhow::anyhow!("LLM API error ({}): {}", status, detail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_quota_is_recognised() {
        let body = r#"{"error":{"code":"insufficient_quota","message":"You exceeded your quota"}}"#;
        assert!(matches!(classify_failure(StatusCode::FORBIDDEN, body), LlmError::Quota(m) if m == "You exceeded your quota"));
        assert!(matches!(classify_failure(StatusCode::TOO_MANY_REQUESTS, "slow down"), LlmError::Quota(_)));
    }

    #[test]
    fn other_failures_are_generic() {
        let body = r#"{"error":{"code":"invalid_api_key","message":"bad key"}}"#;
        assert!(matches!(classify_failure(StatusCode::UNAUTHORIZED, body), LlmError::Failed(_)));
        assert!(matches!(classify_failure(StatusCode::BAD_GATEWAY, "<html>"), LlmError::Failed(_)));
    }

    #[tokio::test]
    async fn missing_key_fails_without_a_request() {
        let client = OpenAiClient::new(None, DEFAULT_BASE_URL).unwrap();
        let request = CompletionRequest {
            model: "gpt-3.5-turbo".into(),
            messages: vec![ChatTurn::new("user", "hi")],
            max_tokens: 500,
            temperature: 0.7,
        };
        assert!(matches!(client.complete(request).await, Err(LlmError::Failed(_))));
    }
}
