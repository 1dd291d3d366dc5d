//! OpenRouter chat-completions client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::error::{LlmError, LlmErrorKind, RetryPolicy};
use super::{ChatMessage, LlmClient, Role};

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Client for one model on OpenRouter. Server and network failures are
/// retried per [`RetryPolicy`]; everything else is returned to the caller.
pub struct OpenRouterClient {
    http: Client,
    api_key: String,
    model: String,
    endpoint: String,
    retry: RetryPolicy,
}

impl OpenRouterClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            http: Client::new(),
            api_key,
            model,
            endpoint: OPENROUTER_API_URL.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Point the client at another OpenAI-compatible endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send_once(&self, request: &CompletionRequest<'_>) -> Result<String, LlmError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("X-Title", "codetree")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                let what = if e.is_timeout() {
                    "request timed out"
                } else if e.is_connect() {
                    "connection failed"
                } else {
                    "request failed"
                };
                LlmError::network(format!("{}: {}", what, e))
            })?;

        let status = response.status();
        let retry_after = retry_after(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(LlmError::from_response(status.as_u16(), &body, retry_after));
        }
        extract_reply(&body, &self.model)
    }
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        system_prompt: Option<&str>,
    ) -> Result<String, LlmError> {
        let request = CompletionRequest::new(&self.model, messages, system_prompt);
        tracing::debug!(
            "OpenRouter request: model={} messages={}",
            self.model,
            request.messages.len()
        );

        let mut attempt = 0;
        loop {
            let error = match self.send_once(&request).await {
                Ok(reply) => return Ok(reply),
                Err(error) => error,
            };
            let Some(delay) = self.retry.delay(&error, attempt) else {
                if attempt > 0 {
                    tracing::warn!("OpenRouter gave up after {} retries: {}", attempt, error);
                }
                return Err(error);
            };
            attempt += 1;
            tracing::warn!("OpenRouter {}; retry {} in {:?}", error, attempt, delay);
            tokio::time::sleep(delay).await;
        }
    }
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Pull the assistant text out of a successful response body.
///
/// OpenRouter sometimes reports upstream failures inside a 200 response;
/// those are classified like HTTP errors.
fn extract_reply(body: &str, model: &str) -> Result<String, LlmError> {
    let parsed: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| LlmError::unreadable(format!("{}: {}", e, body)))?;

    if let Some(error) = parsed.error {
        let status = error
            .code
            .as_ref()
            .and_then(serde_json::Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
            .unwrap_or(502);
        return Err(LlmError::from_response(status, &error.message, None));
    }

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::new(LlmErrorKind::ParseError, "response has no choices"))?;
    if choice.finish_reason.as_deref() == Some("length") {
        tracing::warn!("Reply from {} was cut off at the token limit", model);
    }
    Ok(choice.message.content.unwrap_or_default())
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f64,
}

impl<'a> CompletionRequest<'a> {
    fn new(model: &'a str, messages: &'a [ChatMessage], system: Option<&'a str>) -> Self {
        let system = system.map(|content| WireMessage {
            role: Role::System,
            content,
        });
        let messages = system
            .into_iter()
            .chain(messages.iter().map(|m| WireMessage {
                role: m.role,
                content: &m.content,
            }))
            .collect();
        Self {
            model,
            messages,
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    code: Option<serde_json::Value>,
}
