//! Deterministic completion client.
//!
//! Replies are consumed in order from a queue; once the queue is empty the
//! client falls back to replies registered per request label. Every request
//! is kept so callers can inspect the prompts that were actually sent.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::connection::{CompletionClient, CompletionRequest};
use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    RateLimited(Option<u64>),
    Timeout,
    NetworkDown,
}

impl ScriptedReply {
    fn into_result(self, timeout_secs: u64) -> PipelineResult<String> {
        match self {
            ScriptedReply::Text(text) => Ok(text),
            ScriptedReply::RateLimited(retry_after_secs) => Err(PipelineError::RateLimit { retry_after_secs }),
            ScriptedReply::Timeout => Err(PipelineError::Timeout { secs: timeout_secs }),
            ScriptedReply::NetworkDown => Err(PipelineError::Network("scripted: connection refused".to_string())),
        }
    }
}

#[derive(Debug, Default)]
pub struct ScriptedClient {
    queue: Mutex<VecDeque<ScriptedReply>>,
    by_label: Mutex<HashMap<String, ScriptedReply>>,
    requests: Mutex<Vec<CompletionRequest>>,
    unconfigured: bool,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client whose credential check fails.
    pub fn unconfigured() -> Self {
        Self {
            unconfigured: true,
            ..Self::default()
        }
    }

    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::new();
        for reply in replies {
            client.push(ScriptedReply::Text(reply.into()));
        }
        client
    }

    pub fn push(&self, reply: ScriptedReply) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(reply);
        }
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.push(ScriptedReply::Text(text.into()));
    }

    pub fn on_label(&self, label: &str, reply: ScriptedReply) {
        if let Ok(mut by_label) = self.by_label.lock() {
            by_label.insert(label.to_string(), reply);
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: &CompletionRequest) -> PipelineResult<String> {
        self.ensure_configured()?;
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let queued = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        let reply = match queued {
            Some(reply) => reply,
            None => self
                .by_label
                .lock()
                .ok()
                .and_then(|by_label| by_label.get(&request.label).cloned())
                .ok_or_else(|| {
                    PipelineError::Network(format!("scripted: no reply configured for '{}'", request.label))
                })?,
        };
        reply.into_result(request.timeout.as_secs())
    }

    fn ensure_configured(&self) -> PipelineResult<()> {
        if self.unconfigured {
            Err(PipelineError::Configuration("scripted client has no credential".to_string()))
        } else {
            Ok(())
        }
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_connection::endpoints::{ModelTier, Prompt};
    use std::time::Duration;

    fn request(label: &str) -> CompletionRequest {
        CompletionRequest {
            label: label.to_string(),
            prompt: Prompt {
                system: "s".to_string(),
                user: "u".to_string(),
            },
            tier: ModelTier::Fast,
            max_tokens: 10,
            timeout: Duration::from_secs(3),
            response_format: None,
            temperature: None,
        }
    }

    #[tokio::test]
    async fn test_queue_then_label_fallback() {
        let client = ScriptedClient::with_replies(["first"]);
        client.on_label("dish", ScriptedReply::Text("by label".to_string()));

        assert_eq!(client.complete(&request("dish")).await.unwrap(), "first");
        assert_eq!(client.complete(&request("dish")).await.unwrap(), "by label");
        assert!(client.complete(&request("menu")).await.is_err());
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_scripted_failures_map_to_taxonomy() {
        let client = ScriptedClient::new();
        client.push(ScriptedReply::Timeout);
        client.push(ScriptedReply::RateLimited(Some(30)));
        assert!(matches!(
            client.complete(&request("menu")).await,
            Err(PipelineError::Timeout { secs: 3 })
        ));
        assert!(matches!(
            client.complete(&request("menu")).await,
            Err(PipelineError::RateLimit { retry_after_secs: Some(30) })
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_never_records() {
        let client = ScriptedClient::unconfigured();
        assert!(matches!(
            client.complete(&request("menu")).await,
            Err(PipelineError::Configuration(_))
        ));
        assert_eq!(client.call_count(), 0);
    }
}
