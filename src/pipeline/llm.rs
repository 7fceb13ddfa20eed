//! Model interaction: send the extraction prompt and pull text out of the reply.
//!
//! Two backends implement [`CardModel`]:
//!
//! * [`ResponsesClient`] — calls `POST {api_base}/responses` directly with
//!   `reqwest`. This is the default and targets OpenAI's Responses API (or any
//!   server that speaks it).
//! * [`ProviderModel`] — wraps any `edgequake-llm` provider (Anthropic, Gemini,
//!   Ollama, …) and sends the prompt as one chat message.
//!
//! ## Reply text extraction
//!
//! The Responses API does not always return the same shape: some servers
//! include an aggregated `output_text`, others only the `output` item list,
//! and reasoning models put a content-less reasoning item first. See
//! [`ModelReply::text`] for the fallback order.
//!
//! No retries: a failed call fails the request.

use crate::config::ScanConfig;
use crate::error::CardScanError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, LLMProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A hosted text-generation model.
#[async_trait]
pub trait CardModel: Send + Sync {
    /// Model label for logs.
    fn name(&self) -> &str;

    /// Send `prompt` and return the raw reply.
    async fn generate(&self, prompt: &str) -> Result<ModelReply, CardScanError>;
}

/// The parts of a Responses API reply that carry text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelReply {
    /// Aggregated text of all output messages, when the server provides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_text: Option<String>,
    /// Output items in generation order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Vec<OutputItem>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<ContentBlock>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ModelReply {
    /// Reply consisting of a single aggregated text.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            output_text: Some(text.into()),
            output: None,
        }
    }

    /// Extract the reply text.
    ///
    /// 1. `output_text` if present;
    /// 2. otherwise the first content block of the first output item that has
    ///    any content;
    /// 3. otherwise the empty string.
    pub fn text(&self) -> String {
        if let Some(ref text) = self.output_text {
            return text.clone();
        }
        self.output
            .iter()
            .flatten()
            .find_map(|item| item.content.as_deref().and_then(|blocks| blocks.first()))
            .and_then(|block| block.text.clone())
            .unwrap_or_default()
    }
}

// ── Responses API ────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: &'a str,
}

/// Direct client for `POST /responses`.
pub struct ResponsesClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl std::fmt::Debug for ResponsesClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponsesClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish()
    }
}

impl ResponsesClient {
    /// Build a client from the config. Requires `api_key`.
    pub fn new(config: &ScanConfig) -> Result<Self, CardScanError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| CardScanError::ProviderNotConfigured {
                provider: "openai".to_string(),
                hint: "Set OPENAI_API_KEY (or pass --provider to use another backend).".to_string(),
            })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| CardScanError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: format!("{}/responses", config.api_base.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl CardModel for ResponsesClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<ModelReply, CardScanError> {
        let start = Instant::now();
        let body = ResponsesRequest {
            model: &self.model,
            input: prompt,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, start))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            let detail = api_error_message(&body);
            warn!("Model call failed with HTTP {}: {}", status, detail);

            return Err(match status.as_u16() {
                401 | 403 => CardScanError::AuthError {
                    provider: "openai".to_string(),
                    detail,
                },
                429 => CardScanError::RateLimitExceeded {
                    provider: "openai".to_string(),
                    retry_after_secs,
                },
                _ => CardScanError::LlmApiError {
                    message: format!("HTTP {status}: {detail}"),
                },
            });
        }

        let reply: ModelReply = response
            .json()
            .await
            .map_err(|e| transport_error(e, start))?;

        debug!("Model {} replied in {:?}", self.model, start.elapsed());
        Ok(reply)
    }
}

fn transport_error(e: reqwest::Error, start: Instant) -> CardScanError {
    if e.is_timeout() {
        CardScanError::ApiTimeout {
            elapsed_ms: start.elapsed().as_millis() as u64,
        }
    } else {
        CardScanError::LlmApiError {
            message: e.to_string(),
        }
    }
}

/// Pull `error.message` out of an OpenAI-style error body, else the body itself.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message")?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

// ── edgequake-llm providers ──────────────────────────────────────────────

/// Any `edgequake-llm` chat provider used as a [`CardModel`].
pub struct ProviderModel {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl ProviderModel {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }
}

#[async_trait]
impl CardModel for ProviderModel {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate(&self, prompt: &str) -> Result<ModelReply, CardScanError> {
        let start = Instant::now();
        let messages = vec![ChatMessage::user(prompt)];
        let response = self
            .provider
            .chat(&messages, None)
            .await
            .map_err(|e| CardScanError::LlmApiError {
                message: e.to_string(),
            })?;

        debug!(
            "Model {}: {} input tokens, {} output tokens, {:?}",
            self.label,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(ModelReply::from_text(response.content))
    }
}

/// Pick the backend named by the config.
///
/// * `provider_name` set → the `edgequake-llm` provider of that name, which
///   reads its own API key variable (`ANTHROPIC_API_KEY`, …);
/// * otherwise → [`ResponsesClient`] with `api_key`.
pub fn resolve_model(config: &ScanConfig) -> Result<Arc<dyn CardModel>, CardScanError> {
    if let Some(ref name) = config.provider_name {
        let provider = ProviderFactory::create_llm_provider(name, &config.model).map_err(|e| {
            CardScanError::ProviderNotConfigured {
                provider: name.clone(),
                hint: format!("{e}"),
            }
        })?;
        let label = format!("{}/{}", name, config.model);
        return Ok(Arc::new(ProviderModel::new(provider, label)));
    }

    Ok(Arc::new(ResponsesClient::new(config)?))
}
