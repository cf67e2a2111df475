use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use super::debug_log::{DebugEntry, DebugLog, DebugOutcome};
use super::endpoints::{
    AnthropicRequest, AnthropicResponse, ChatCompletionRequest, ChatCompletionResponse,
    ChatMessage, ModelTier, Prompt, Provider, ProviderErrorResponse, ProviderKind, ResponseFormat,
};
use crate::config::Settings;
use crate::error::{PipelineError, PipelineResult};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// One completion call as the pipeline sees it.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Short tag for logs, e.g. `menu` or `dish`.
    pub label: String,
    pub prompt: Prompt,
    pub tier: ModelTier,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub response_format: Option<ResponseFormat>,
    pub temperature: Option<f32>,
}

/// Sends an assembled prompt to a hosted model and returns raw text.
///
/// No retries happen here. Every failure goes back to the caller as-is.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> PipelineResult<String>;

    /// Checked by callers before any prompt is assembled.
    fn ensure_configured(&self) -> PipelineResult<()> {
        Ok(())
    }

    fn provider_name(&self) -> &str;

    fn debug_log(&self) -> Option<&DebugLog> {
        None
    }
}

/// HTTPS client for the direct-to-provider deployment.
#[derive(Debug, Clone)]
pub struct HttpCompletionClient {
    provider: Provider,
    http: Client,
    fast_model: String,
    capable_model: String,
    debug_log: Arc<DebugLog>,
}

impl HttpCompletionClient {
    pub fn new(provider: Provider, fast_model: String, capable_model: String, debug_log_cap: usize) -> Self {
        Self {
            provider,
            http: Client::new(),
            fast_model,
            capable_model,
            debug_log: Arc::new(DebugLog::new(debug_log_cap)),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let provider = Provider::new(
            settings.provider,
            settings.api_key.clone(),
            settings.base_url.clone(),
        );
        Self::new(
            provider,
            settings.fast_model.clone(),
            settings.capable_model.clone(),
            settings.debug_log_cap,
        )
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Fast => &self.fast_model,
            ModelTier::Capable => &self.capable_model,
        }
    }

    pub fn shared_debug_log(&self) -> Arc<DebugLog> {
        Arc::clone(&self.debug_log)
    }

    /// Records into `log` instead of a private one, e.g. a log restored
    /// from disk.
    pub fn with_debug_log(mut self, log: Arc<DebugLog>) -> Self {
        self.debug_log = log;
        self
    }

    async fn send(&self, api_key: &str, model: &str, request: &CompletionRequest) -> PipelineResult<String> {
        match &self.provider {
            Provider::OpenAi { base_url, .. } | Provider::OpenRouter { base_url, .. } => {
                let payload = ChatCompletionRequest {
                    model: model.to_string(),
                    messages: vec![
                        ChatMessage::system(request.prompt.system.clone()),
                        ChatMessage::user(request.prompt.user.clone()),
                    ],
                    response_format: request.response_format.clone(),
                    temperature: request.temperature,
                    max_tokens: Some(request.max_tokens),
                };

                let mut builder = self
                    .http
                    .post(format!("{}/chat/completions", base_url))
                    .bearer_auth(api_key)
                    .json(&payload);
                if self.provider.kind() == ProviderKind::OpenRouter {
                    builder = builder
                        .header("HTTP-Referer", "https://github.com/cellar-menu")
                        .header("X-Title", "cellar-menu");
                }

                let response = builder.send().await?;
                let body = read_success_body(response).await?;
                let parsed: ChatCompletionResponse = serde_json::from_str(&body)
                    .map_err(|e| PipelineError::decode("$.choices", e.to_string()))?;
                if let Some(usage) = &parsed.usage {
                    debug!(
                        prompt_tokens = usage.prompt_tokens,
                        total_tokens = usage.total_tokens,
                        "completion usage"
                    );
                }
                let choice = parsed
                    .choices
                    .into_iter()
                    .next()
                    .ok_or_else(|| PipelineError::decode("$.choices", "no choices in completion"))?;
                if choice.finish_reason.as_deref() == Some("length") {
                    warn!(label = %request.label, "completion stopped at the token ceiling");
                }
                choice
                    .message
                    .content
                    .filter(|content| !content.trim().is_empty())
                    .ok_or_else(|| PipelineError::decode("$.choices[0].message.content", "empty completion"))
            }
            Provider::Anthropic { base_url, .. } => {
                let payload = AnthropicRequest {
                    model: model.to_string(),
                    max_tokens: request.max_tokens,
                    system: request.prompt.system.clone(),
                    messages: vec![ChatMessage::user(request.prompt.user.clone())],
                    temperature: request.temperature,
                };

                let response = self
                    .http
                    .post(format!("{}/messages", base_url))
                    .header("x-api-key", api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&payload)
                    .send()
                    .await?;
                let body = read_success_body(response).await?;
                let parsed: AnthropicResponse = serde_json::from_str(&body)
                    .map_err(|e| PipelineError::decode("$.content", e.to_string()))?;
                if parsed.stop_reason.as_deref() == Some("max_tokens") {
                    warn!(label = %request.label, "completion stopped at the token ceiling");
                }
                parsed
                    .content
                    .into_iter()
                    .find_map(|block| (block.content_type == "text").then_some(block.text).flatten())
                    .filter(|text| !text.trim().is_empty())
                    .ok_or_else(|| PipelineError::decode("$.content", "no text block in completion"))
            }
        }
    }
}

/// Maps the HTTP status onto the error taxonomy and returns the body on 2xx.
async fn read_success_body(response: reqwest::Response) -> PipelineResult<String> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        return Err(PipelineError::RateLimit { retry_after_secs });
    }

    let body = response.text().await?;
    if !status.is_success() {
        let message = serde_json::from_str::<ProviderErrorResponse>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        return Err(PipelineError::Network(format!("HTTP {}: {}", status.as_u16(), message)));
    }
    Ok(body)
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> PipelineResult<String> {
        self.ensure_configured()?;
        let api_key = self.provider.api_key().unwrap_or_default();
        let model = self.model_for(request.tier).to_string();
        let started = Instant::now();

        info!(
            label = %request.label,
            provider = self.provider.kind().name(),
            model = %model,
            prompt_chars = request.prompt.char_len(),
            max_tokens = request.max_tokens,
            "sending completion"
        );

        let result = match tokio::time::timeout(request.timeout, self.send(api_key, &model, request)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(PipelineError::Timeout { .. })) | Err(_) => Err(PipelineError::Timeout {
                secs: request.timeout.as_secs(),
            }),
            Ok(Err(other)) => Err(other),
        };

        let elapsed = started.elapsed();
        match &result {
            Ok(text) => info!(label = %request.label, elapsed_ms = elapsed.as_millis() as u64, chars = text.len(), "completion received"),
            Err(e) => warn!(label = %request.label, elapsed_ms = elapsed.as_millis() as u64, error = %e, "completion failed"),
        }

        self.debug_log.record(DebugEntry {
            at: Utc::now(),
            label: request.label.clone(),
            provider: self.provider.kind().name().to_string(),
            model,
            system_prompt: request.prompt.system.clone(),
            user_prompt: request.prompt.user.clone(),
            outcome: match &result {
                Ok(text) => DebugOutcome::Response(text.clone()),
                Err(e) => DebugOutcome::Error(e.to_string()),
            },
            elapsed_ms: elapsed.as_millis() as u64,
        });

        result
    }

    fn ensure_configured(&self) -> PipelineResult<()> {
        match self.provider.api_key() {
            Some(key) if !key.trim().is_empty() => Ok(()),
            _ => Err(PipelineError::Configuration(format!(
                "no API key for {} (set {})",
                self.provider.kind().name(),
                self.provider.kind().api_key_env_var()
            ))),
        }
    }

    fn provider_name(&self) -> &str {
        self.provider.kind().name()
    }

    fn debug_log(&self) -> Option<&DebugLog> {
        Some(&self.debug_log)
    }
}
