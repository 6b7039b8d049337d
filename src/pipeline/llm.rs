//! Model interaction: build the vision request and call the endpoint.
//!
//! [`ExtractionClient::extract_text`] is one *logical* request. Underneath it
//! makes up to `max_attempts` real calls through a [`VisionTransport`], each
//! under its own timeout, sleeping between them according to the configured
//! [`BackoffStrategy`].
//!
//! ## Retry Strategy
//!
//! Timeouts, non-2xx statuses and transport errors are retried. With the
//! default linear policy and a 1 s base the waits are 1 s → 2 s, so a call
//! that fails three times costs three request timeouts plus 3 s of back-off.
//! A 2xx reply whose JSON lacks `choices[0].message.content` is a parse
//! failure: retrying would only bill the same answer again, so it fails at
//! once.
//!
//! There is no idempotency key. A retried attempt may be billed twice by the
//! provider; extraction is read-only, so the duplicate is harmless.

use crate::config::{BackoffStrategy, ExtractorConfig, Provider};
use crate::error::OcrError;
use crate::prompts::EXTRACTION_PROMPT;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

// ── Wire types ───────────────────────────────────────────────────────────

/// Chat-completions request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ChatRequest {
    /// One user turn: the instruction followed by the image.
    pub fn vision(
        model: impl Into<String>,
        prompt: &str,
        image_data_uri: String,
        max_tokens: usize,
    ) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: prompt.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image_data_uri,
                        },
                    },
                ],
            }],
            max_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ReplyMessage>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

/// Pull `choices[0].message.content` out of a response body.
fn parse_reply(endpoint: &str, body: &str) -> Result<String, OcrError> {
    let parse_err = |detail: String| OcrError::ResponseParse {
        endpoint: endpoint.to_string(),
        detail,
    };
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| parse_err(format!("invalid JSON: {e}")))?;
    response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| parse_err("response has no choices".into()))?
        .message
        .and_then(|m| m.content)
        .ok_or_else(|| parse_err("first choice has no message content".into()))
}

// ── Transport ────────────────────────────────────────────────────────────

/// Why a single attempt failed. All variants are retryable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("API request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),
}

/// One outbound call to the inference endpoint.
///
/// Implementations perform exactly one attempt and return the raw 2xx body;
/// timeouts, retries and response parsing belong to [`ExtractionClient`].
pub trait VisionTransport: Send + Sync {
    /// Endpoint URL, used in error messages.
    fn endpoint(&self) -> &str;

    fn send<'a>(&'a self, request: &'a ChatRequest) -> BoxFuture<'a, Result<String, TransportError>>;
}

/// Production transport: reqwest with bearer authentication.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Result<Self, OcrError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| OcrError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl VisionTransport for HttpTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn send<'a>(&'a self, request: &'a ChatRequest) -> BoxFuture<'a, Result<String, TransportError>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(request)
                .send()
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?;

            if !status.is_success() {
                return Err(TransportError::Status {
                    status: status.as_u16(),
                    body: truncate(&body, 200),
                });
            }
            Ok(body)
        })
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

// ── Retry wrapper ────────────────────────────────────────────────────────

/// Timeout and retry settings for one logical call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub timeout: Duration,
    pub backoff: BackoffStrategy,
}

impl RetryPolicy {
    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.retry_delay(),
            timeout: config.request_timeout(),
            backoff: config.backoff,
        }
    }

    /// Wait after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.delay(self.base_delay, attempt)
    }
}

/// Resilient client for the inference endpoint.
///
/// Cheap to share: the pipelines hold it in an `Arc` and every page task
/// calls [`ExtractionClient::extract_text`] concurrently.
pub struct ExtractionClient {
    transport: Arc<dyn VisionTransport>,
    model: String,
    prompt: String,
    max_tokens: usize,
    policy: RetryPolicy,
}

impl ExtractionClient {
    pub fn new(
        transport: Arc<dyn VisionTransport>,
        provider: Provider,
        config: &ExtractorConfig,
    ) -> Self {
        Self {
            transport,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| provider.default_model().to_string()),
            prompt: config
                .prompt
                .clone()
                .unwrap_or_else(|| EXTRACTION_PROMPT.to_string()),
            max_tokens: config.max_tokens,
            policy: RetryPolicy::from_config(config),
        }
    }

    pub fn endpoint(&self) -> &str {
        self.transport.endpoint()
    }

    /// Build the request for one encoded image.
    pub fn build_request(&self, image_data_uri: String) -> ChatRequest {
        ChatRequest::vision(&self.model, &self.prompt, image_data_uri, self.max_tokens)
    }

    /// Send `image_data_uri` with the extraction instruction and return the reply text.
    ///
    /// # Errors
    /// * [`OcrError::RemoteCallFailure`] once every attempt failed
    /// * [`OcrError::ResponseParse`] for a 2xx reply without content (not retried)
    pub async fn extract_text(&self, image_data_uri: String) -> Result<String, OcrError> {
        let request = self.build_request(image_data_uri);
        let body = self.send_with_retry(&request).await?;
        parse_reply(self.endpoint(), &body)
    }

    async fn send_with_retry(&self, request: &ChatRequest) -> Result<String, OcrError> {
        let max_attempts = self.policy.max_attempts;
        let timeout_ms = self.policy.timeout.as_millis() as u64;
        let mut last_err: Option<TransportError> = None;

        for attempt in 1..=max_attempts {
            let outcome = match timeout(self.policy.timeout, self.transport.send(request)).await {
                Ok(result) => result,
                Err(_elapsed) => Err(TransportError::Timeout { ms: timeout_ms }),
            };

            match outcome {
                Ok(body) => {
                    debug!("{}: attempt {}/{} succeeded", self.endpoint(), attempt, max_attempts);
                    return Ok(body);
                }
                Err(e) => {
                    warn!(
                        "{}: attempt {}/{} failed: {}",
                        self.endpoint(),
                        attempt,
                        max_attempts,
                        e
                    );
                    last_err = Some(e);
                }
            }

            if attempt < max_attempts {
                let backoff = self.policy.delay_after(attempt);
                debug!("retrying in {}ms", backoff.as_millis());
                sleep(backoff).await;
            }
        }

        Err(OcrError::RemoteCallFailure {
            endpoint: self.endpoint().to_string(),
            attempts: max_attempts,
            last_error: last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string()),
        })
    }
}
