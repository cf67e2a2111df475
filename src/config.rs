use std::env;
use std::time::Duration;

use dotenv::dotenv;
use tracing::debug;

use crate::api_connection::endpoints::ProviderKind;

pub const PROVIDER_ENV_VAR: &str = "CELLAR_MENU_PROVIDER";
pub const OPENAI_API_KEY_ENV_VAR: &str = "OPENAI_API_KEY";
pub const ANTHROPIC_API_KEY_ENV_VAR: &str = "ANTHROPIC_API_KEY";
pub const OPENROUTER_API_KEY_ENV_VAR: &str = "OPENROUTER_API_KEY";
const BASE_URL_ENV_VAR: &str = "CELLAR_MENU_BASE_URL";
const FAST_MODEL_ENV_VAR: &str = "CELLAR_MENU_FAST_MODEL";
const CAPABLE_MODEL_ENV_VAR: &str = "CELLAR_MENU_CAPABLE_MODEL";
const MENU_TIMEOUT_ENV_VAR: &str = "CELLAR_MENU_MENU_TIMEOUT_SECS";
const EDIT_TIMEOUT_ENV_VAR: &str = "CELLAR_MENU_EDIT_TIMEOUT_SECS";
const DEBUG_LOG_CAP_ENV_VAR: &str = "CELLAR_MENU_DEBUG_LOG_CAP";
const SNAPSHOT_MAX_WINES_ENV_VAR: &str = "CELLAR_MENU_SNAPSHOT_MAX_WINES";
const SNAPSHOT_MAX_CHARS_ENV_VAR: &str = "CELLAR_MENU_SNAPSHOT_MAX_CHARS";
const LANGUAGE_ENV_VAR: &str = "CELLAR_MENU_LANGUAGE";

pub const DEFAULT_MENU_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_EDIT_TIMEOUT_SECS: u64 = 90;
pub const DEFAULT_DEBUG_LOG_CAP: usize = 50;
pub const DEFAULT_SNAPSHOT_MAX_WINES: usize = 120;
pub const DEFAULT_SNAPSHOT_MAX_CHARS: usize = 12_000;
pub const DEFAULT_MENU_MAX_TOKENS: u32 = 8_000;
pub const DEFAULT_EDIT_MAX_TOKENS: u32 = 2_000;

/// Limits applied by the inventory snapshot builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotLimits {
    pub max_wines: usize,
    pub max_chars: usize,
}

impl Default for SnapshotLimits {
    fn default() -> Self {
        Self {
            max_wines: DEFAULT_SNAPSHOT_MAX_WINES,
            max_chars: DEFAULT_SNAPSHOT_MAX_CHARS,
        }
    }
}

/// Runtime settings for the whole pipeline.
///
/// A missing API key is not a load error. The generator reports it as a
/// `PipelineError::Configuration` right before it would assemble a prompt.
#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: ProviderKind,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub fast_model: String,
    pub capable_model: String,
    pub menu_timeout: Duration,
    pub edit_timeout: Duration,
    pub menu_max_tokens: u32,
    pub edit_max_tokens: u32,
    pub debug_log_cap: usize,
    pub snapshot: SnapshotLimits,
    pub language: String,
}

impl Settings {
    /// Defaults for a provider, without consulting the environment.
    pub fn for_provider(provider: ProviderKind) -> Self {
        Self {
            provider,
            api_key: None,
            base_url: None,
            fast_model: provider.default_fast_model().to_string(),
            capable_model: provider.default_capable_model().to_string(),
            menu_timeout: Duration::from_secs(DEFAULT_MENU_TIMEOUT_SECS),
            edit_timeout: Duration::from_secs(DEFAULT_EDIT_TIMEOUT_SECS),
            menu_max_tokens: DEFAULT_MENU_MAX_TOKENS,
            edit_max_tokens: DEFAULT_EDIT_MAX_TOKENS,
            debug_log_cap: DEFAULT_DEBUG_LOG_CAP,
            snapshot: SnapshotLimits::default(),
            language: "English".to_string(),
        }
    }

    /// Loads `.env` if present, then reads every `CELLAR_MENU_*` variable.
    pub fn from_env() -> Self {
        dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as `from_env` but with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let provider = lookup(PROVIDER_ENV_VAR)
            .and_then(|value| ProviderKind::parse(&value))
            .unwrap_or(ProviderKind::OpenAi);
        let mut settings = Self::for_provider(provider);

        settings.api_key = lookup(provider.api_key_env_var()).filter(|key| !key.trim().is_empty());
        settings.base_url = lookup(BASE_URL_ENV_VAR);
        if let Some(model) = lookup(FAST_MODEL_ENV_VAR) {
            settings.fast_model = model;
        }
        if let Some(model) = lookup(CAPABLE_MODEL_ENV_VAR) {
            settings.capable_model = model;
        }
        if let Some(secs) = parse_number::<u64>(&lookup, MENU_TIMEOUT_ENV_VAR) {
            settings.menu_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_number::<u64>(&lookup, EDIT_TIMEOUT_ENV_VAR) {
            settings.edit_timeout = Duration::from_secs(secs);
        }
        if let Some(cap) = parse_number::<usize>(&lookup, DEBUG_LOG_CAP_ENV_VAR) {
            settings.debug_log_cap = cap;
        }
        if let Some(max) = parse_number::<usize>(&lookup, SNAPSHOT_MAX_WINES_ENV_VAR) {
            settings.snapshot.max_wines = max;
        }
        if let Some(max) = parse_number::<usize>(&lookup, SNAPSHOT_MAX_CHARS_ENV_VAR) {
            settings.snapshot.max_chars = max;
        }
        if let Some(language) = lookup(LANGUAGE_ENV_VAR) {
            settings.language = language;
        }

        debug!(
            provider = provider.name(),
            has_key = settings.api_key.is_some(),
            fast_model = %settings.fast_model,
            capable_model = %settings.capable_model,
            "settings loaded"
        );
        settings
    }
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Option<T> {
    lookup(name).and_then(|raw| raw.trim().parse::<T>().ok())
}
