//! Client for the hosted language model behind the content assistant.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{error, warn};
use url::Url;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Why a model call failed, split by what the dashboard can do about it:
/// fix the key, wait and ask again, or give up on this reply.
#[derive(Debug, Clone, Error)]
pub enum ModelApiError {
    #[error("model endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("model call timed out")]
    TimedOut,
    #[error("model credentials were rejected, check ANTHROPIC_API_KEY")]
    Unauthorized,
    /// 429 rate limiting and 529 overload.
    #[error("model is busy (status {status}), try again shortly")]
    Busy { status: u16 },
    #[error("model call failed with status {status}: {detail}")]
    Rejected { status: u16, detail: String },
    #[error("unusable model reply: {0}")]
    BadReply(String),
}

impl ModelApiError {
    /// A busy or failing provider and a dropped connection are worth another
    /// attempt. A reply we could not use is not: asking again costs tokens
    /// and usually fails the same way.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable(_) | Self::TimedOut | Self::Busy { .. } => true,
            Self::Rejected { status, .. } => *status >= 500,
            Self::Unauthorized | Self::BadReply(_) => false,
        }
    }

    fn from_status(status: StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 | 403 => Self::Unauthorized,
            code @ (429 | 529) => Self::Busy { status: code },
            code => Self::Rejected {
                status: code,
                detail: error_detail(body),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// The provider's message when the body is its error envelope, otherwise the
/// start of the raw body.
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.message,
        Err(_) => body.trim().chars().take(200).collect(),
    }
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub api_key: SecretString,
    pub model: String,
    pub api_url: Url,
    pub timeout: Duration,
}

impl ModelConfig {
    pub fn new(api_key: SecretString, model: Option<String>) -> Result<Self, ModelApiError> {
        let api_url = Url::parse(DEFAULT_API_URL)
            .map_err(|e| ModelApiError::Unreachable(format!("invalid api url: {e}")))?;
        Ok(Self {
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_url,
            timeout: Duration::from_secs(60),
        })
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [UserMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

impl MessagesResponse {
    /// First text block. A reply cut off at `max_tokens` is half a JSON
    /// document, so it is refused here rather than failing to parse later.
    fn into_reply(self) -> Result<String, ModelApiError> {
        if self.stop_reason.as_deref() == Some("max_tokens") {
            return Err(ModelApiError::BadReply(format!(
                "reply truncated at {DEFAULT_MAX_TOKENS} tokens"
            )));
        }
        self.content
            .into_iter()
            .find_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .ok_or_else(|| ModelApiError::BadReply("no text content in reply".to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct ModelClient {
    http: Client,
    config: ModelConfig,
}

impl ModelClient {
    pub fn new(config: ModelConfig) -> Result<Self, ModelApiError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("batohi-admin/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ModelApiError::Unreachable(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Send one user prompt and return the first text block of the reply.
    pub async fn ask(&self, system: &str, prompt: &str) -> Result<String, ModelApiError> {
        let request = MessagesRequest {
            model: &self.config.model,
            max_tokens: DEFAULT_MAX_TOKENS,
            system,
            messages: [UserMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = (|| async { self.send(&request).await })
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(500))
                    .with_max_delay(Duration::from_secs(10))
                    .with_max_times(3)
                    .with_jitter(),
            )
            .when(ModelApiError::is_transient)
            .notify(|e, dur| {
                warn!(
                    "Model call failed, retrying after {:.2}s: {}",
                    dur.as_secs_f64(),
                    e
                )
            })
            .await?;

        response.into_reply()
    }

    /// Send one user prompt and deserialize the JSON the model answers with.
    pub async fn ask_json<T: DeserializeOwned>(&self, system: &str, prompt: &str) -> Result<T, ModelApiError> {
        let text = self.ask(system, prompt).await?;
        parse_json_reply(&text)
    }

    async fn send(&self, request: &MessagesRequest<'_>) -> Result<MessagesResponse, ModelApiError> {
        let res = self
            .http
            .post(self.config.api_url.clone())
            .header("x-api-key", self.config.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelApiError::TimedOut
                } else {
                    ModelApiError::Unreachable(e.to_string())
                }
            })?;

        let status = res.status();
        if status.is_success() {
            return res
                .json::<MessagesResponse>()
                .await
                .map_err(|e| ModelApiError::BadReply(e.to_string()));
        }
        let body = res.text().await.unwrap_or_default();
        let err = ModelApiError::from_status(status, &body);
        warn!(status = status.as_u16(), error = %err, "Model call rejected");
        Err(err)
    }
}

pub(crate) fn parse_json_reply<T: DeserializeOwned>(text: &str) -> Result<T, ModelApiError> {
    let json = strip_code_fence(text);
    if json.is_empty() {
        error!(reply = %text, "Model reply contained no JSON");
        return Err(ModelApiError::BadReply("empty reply".to_string()));
    }
    serde_json::from_str(json).map_err(|e| {
        error!(
            json_error = %e,
            preview = %json.chars().take(300).collect::<String>(),
            "Failed to parse model reply"
        );
        ModelApiError::BadReply(e.to_string())
    })
}

/// Models often wrap JSON in a markdown fence, with or without a language tag.
fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(start) = text.find("```") else {
        return text;
    };
    let after_ticks = &text[start + 3..];
    // drop the language tag line, if any
    let body = match after_ticks.find('\n') {
        Some(newline) => &after_ticks[newline + 1..],
        None => after_ticks,
    };
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}
