use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::error::CompletionError;

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const TEMPERATURE: f64 = 0.7;
pub const MAX_TOKENS: u32 = 1024;

#[derive(Serialize)]
struct OpenAIMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

/// Everything a [`CompletionClient`] needs to reach the endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

impl CompletionConfig {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: api_key.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Client for an OpenAI-compatible chat completions endpoint.
///
/// Every call is single-turn: only the caller's prompt is sent, never any
/// earlier conversation.
#[derive(Clone)]
pub struct CompletionClient {
    client: Client,
    config: CompletionConfig,
}

impl CompletionClient {
    pub fn new(config: CompletionConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Send `prompt` and return the first completion's text.
    pub async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        self.complete_with_cancel(prompt, &CancellationToken::new()).await
    }

    /// Like [`complete`](Self::complete), but gives up with
    /// [`CompletionError::Cancelled`] as soon as `cancel` fires.
    ///
    /// The configured timeout bounds the whole exchange, body included.
    pub async fn complete_with_cancel(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, CompletionError> {
        let deadline = self.config.timeout;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CompletionError::Cancelled),
            outcome = tokio::time::timeout(deadline, self.query(prompt)) => {
                outcome.unwrap_or(Err(CompletionError::Timeout(deadline)))
            }
        }
    }

    async fn query(&self, prompt: &str) -> Result<String, CompletionError> {
        let request = OpenAIRequest {
            model: &self.config.model,
            messages: vec![OpenAIMessage {
                role: "user",
                content: prompt,
            }],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        tracing::debug!(url = %self.config.api_url, model = %self.config.model, "sending completion request");

        let response = self.client
            .post(&self.config.api_url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "completion endpoint returned an error status");
            return Err(CompletionError::Api { status: status.as_u16() });
        }

        let body = response.bytes().await?;
        let openai_response: OpenAIResponse = serde_json::from_slice(&body).map_err(|err| {
            tracing::warn!(error = %err, "completion body did not match the expected shape");
            CompletionError::EmptyResponse
        })?;

        if openai_response.choices.len() > 1 {
            tracing::debug!(choices = openai_response.choices.len(), "using the first choice only");
        }

        openai_response.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(CompletionError::EmptyResponse)
    }
}
