/// Client for OpenAI-compatible `/chat/completions` endpoints.
///
/// Transient failures (timeouts, refused connections, 429, 5xx) are retried per
/// `RetryPolicy`; anything else is returned on the first attempt.
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::warn;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Wait before retry number `retry` (0-based): doubling from `initial_backoff`, capped
    /// at `max_backoff`, plus up to a quarter of that again as jitter.
    fn delay(&self, retry: u32) -> Duration {
        let doubled = self
            .initial_backoff
            .checked_mul(1u32.checked_shl(retry).unwrap_or(u32::MAX))
            .unwrap_or(self.max_backoff);
        let capped = doubled.min(self.max_backoff);
        let spread = (capped.as_millis() as u64 / 4).max(1);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos() as u64)
            .unwrap_or(0);
        capped + Duration::from_millis(nanos % (spread + 1))
    }
}

#[derive(Clone, Debug)]
pub struct OpenAiClientConfig {
    pub base_url: String,
    /// Bearer token. Local OpenAI-compatible hosts usually run without one.
    pub api_key: Option<String>,
    /// Per-attempt timeout unless the caller passes its own.
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Raw error bodies are cut to this many bytes before they reach an error message.
    pub max_error_body_bytes: usize,
}

impl OpenAiClientConfig {
    /// Optional: `OPENAI_BASE_URL`, `OPENAI_API_KEY`, `OPENAI_TIMEOUT_SECS` (30),
    /// `OPENAI_MAX_RETRIES` (2), `OPENAI_RETRY_INITIAL_MS` (200), `OPENAI_RETRY_MAX_MS` (2000),
    /// `OPENAI_MAX_ERROR_BODY_BYTES` (8192). Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let base_url = std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            timeout: Duration::from_secs(env_or("OPENAI_TIMEOUT_SECS", 30)),
            retry: RetryPolicy {
                max_retries: env_or("OPENAI_MAX_RETRIES", 2),
                initial_backoff: Duration::from_millis(env_or("OPENAI_RETRY_INITIAL_MS", 200)),
                max_backoff: Duration::from_millis(env_or("OPENAI_RETRY_MAX_MS", 2_000)),
            },
            max_error_body_bytes: env_or("OPENAI_MAX_ERROR_BODY_BYTES", 8 * 1024),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, thiserror::Error)]
pub enum OpenAiClientError {
    #[error("chat completion request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("chat completion rejected ({status}): {message}")]
    Api { status: StatusCode, message: String },
}

impl OpenAiClientError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
        }
    }
}

#[derive(Clone)]
pub struct OpenAiClient {
    config: OpenAiClientConfig,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: OpenAiClientConfig) -> Result<Self, OpenAiClientError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("rulebook/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { config, http })
    }

    pub async fn chat_completions(
        &self,
        request: &ChatCompletionRequest,
        timeout: Option<Duration>,
    ) -> Result<ChatCompletionResponse, OpenAiClientError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let timeout = timeout.unwrap_or(self.config.timeout);
        let policy = self.config.retry;

        let mut retries = 0;
        loop {
            match self.send_once(&url, request, timeout).await {
                Ok(response) => return Ok(response),
                Err(e) if retries < policy.max_retries && e.is_transient() => {
                    let delay = policy.delay(retries);
                    retries += 1;
                    warn!(
                        retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "chat completion failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(
        &self,
        url: &str,
        request: &ChatCompletionRequest,
        timeout: Duration,
    ) -> Result<ChatCompletionResponse, OpenAiClientError> {
        let mut builder = self.http.post(url).timeout(timeout).json(request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }

        let body = resp.bytes().await.unwrap_or_default();
        let message = match serde_json::from_slice::<ErrorEnvelope>(&body) {
            Ok(ErrorEnvelope { error: ErrorDetail { message: Some(m) } }) => m,
            _ => {
                let cut = body.len().min(self.config.max_error_body_bytes);
                String::from_utf8_lossy(&body[..cut]).into_owned()
            }
        };
        Err(OpenAiClientError::Api { status, message })
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

impl ChatCompletionResponse {
    /// Trimmed text of the first choice; `None` when it is missing or blank.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub total_tokens: Option<u64>,
}
