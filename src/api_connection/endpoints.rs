use serde::{Deserialize, Serialize};

/// Which hosted completion API the client talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    OpenRouter,
    Anthropic,
}

impl ProviderKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(ProviderKind::OpenAi),
            "openrouter" => Some(ProviderKind::OpenRouter),
            "anthropic" | "claude" => Some(ProviderKind::Anthropic),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::Anthropic => "anthropic",
        }
    }

    pub fn api_key_env_var(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => crate::config::OPENAI_API_KEY_ENV_VAR,
            ProviderKind::OpenRouter => crate::config::OPENROUTER_API_KEY_ENV_VAR,
            ProviderKind::Anthropic => crate::config::ANTHROPIC_API_KEY_ENV_VAR,
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::OpenRouter => "https://openrouter.ai/api/v1",
            ProviderKind::Anthropic => "https://api.anthropic.com/v1",
        }
    }

    pub fn default_fast_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::OpenRouter => "openai/gpt-4o-mini",
            ProviderKind::Anthropic => "claude-3-5-haiku-latest",
        }
    }

    pub fn default_capable_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o",
            ProviderKind::OpenRouter => "openai/gpt-4o",
            ProviderKind::Anthropic => "claude-sonnet-4-5",
        }
    }
}

/// Cheap vs capable model selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelTier {
    Fast,
    Capable,
}

/// An endpoint plus its credential. The key stays optional so a client can
/// be built before configuration is complete.
#[derive(Clone, Debug)]
pub enum Provider {
    OpenAi {
        api_key: Option<String>,
        base_url: String,
    },
    OpenRouter {
        api_key: Option<String>,
        base_url: String,
    },
    Anthropic {
        api_key: Option<String>,
        base_url: String,
    },
}

impl Provider {
    pub fn new(kind: ProviderKind, api_key: Option<String>, base_url: Option<String>) -> Self {
        let base_url = base_url
            .unwrap_or_else(|| kind.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string();
        match kind {
            ProviderKind::OpenAi => Provider::OpenAi { api_key, base_url },
            ProviderKind::OpenRouter => Provider::OpenRouter { api_key, base_url },
            ProviderKind::Anthropic => Provider::Anthropic { api_key, base_url },
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Provider::OpenAi { .. } => ProviderKind::OpenAi,
            Provider::OpenRouter { .. } => ProviderKind::OpenRouter,
            Provider::Anthropic { .. } => ProviderKind::Anthropic,
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        match self {
            Provider::OpenAi { api_key, .. }
            | Provider::OpenRouter { api_key, .. }
            | Provider::Anthropic { api_key, .. } => api_key.as_deref(),
        }
    }

    pub fn base_url(&self) -> &str {
        match self {
            Provider::OpenAi { base_url, .. }
            | Provider::OpenRouter { base_url, .. }
            | Provider::Anthropic { base_url, .. } => base_url,
        }
    }
}

/// System instructions plus user content, ready to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn char_len(&self) -> usize {
        self.system.chars().count() + self.user.chars().count()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
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

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct JsonSchemaDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
    pub schema: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<JsonSchemaDefinition>,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self {
            format_type: "json_object".to_string(),
            json_schema: None,
        }
    }

    pub fn json_schema(definition: JsonSchemaDefinition) -> Self {
        Self {
            format_type: "json_schema".to_string(),
            json_schema: Some(definition),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatCompletionResponseMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatCompletionChoice {
    pub message: ChatCompletionResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub index: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatCompletionUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: Option<u32>,
    pub total_tokens: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<ChatCompletionChoice>,
    #[serde(default)]
    pub usage: Option<ChatCompletionUsage>,
}

/// Anthropic messages API request. The system prompt is a top-level field
/// rather than a message.
#[derive(Debug, Serialize, Clone)]
pub struct AnthropicRequest {
    pub model: String,
    pub max_tokens: u32,
    pub system: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnthropicContent {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnthropicResponse {
    pub content: Vec<AnthropicContent>,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderErrorDetail {
    pub message: String,
}

/// Error envelope shared by both providers: `{"error": {"message": ...}}`.
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderErrorResponse {
    pub error: ProviderErrorDetail,
}
