use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument};

use super::decoder::{decode_menu, DecodeOptions};
use super::model::{MenuRequest, MenuResponse};
use super::prompt::build_menu_prompt;
use crate::api_connection::connection::{CompletionClient, CompletionRequest};
use crate::api_connection::endpoints::{JsonSchemaDefinition, ModelTier, Prompt, ProviderKind, ResponseFormat};
use crate::cellar::{build_inventory_snapshot, Cellar, InventorySnapshot};
use crate::config::Settings;
use crate::error::PipelineResult;

/// Snapshot → prompt → completion → decode, plus the single-item edits in
/// `regenerate`. Holds no per-dinner state.
#[derive(Clone)]
pub struct MenuGenerator {
    client: Arc<dyn CompletionClient>,
    settings: Settings,
}

impl MenuGenerator {
    pub fn new(client: Arc<dyn CompletionClient>, settings: Settings) -> Self {
        Self { client, settings }
    }

    pub fn client(&self) -> &dyn CompletionClient {
        self.client.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub(crate) fn snapshot(&self, cellar: &Cellar) -> InventorySnapshot {
        build_inventory_snapshot(&cellar.in_stock(), self.settings.snapshot)
    }

    pub(crate) fn decode_options(request: &MenuRequest, snapshot: &InventorySnapshot) -> DecodeOptions {
        DecodeOptions {
            default_servings: request.person_count.max(1),
            cellar_is_empty: snapshot.is_empty(),
        }
    }

    /// Anthropic has no response_format and relies on the prompt alone.
    /// Schemas go to OpenAI only; OpenRouter routes to models that may not
    /// honour them.
    fn response_format(&self, schema: Option<JsonSchemaDefinition>) -> Option<ResponseFormat> {
        match (self.settings.provider, schema) {
            (ProviderKind::Anthropic, _) => None,
            (ProviderKind::OpenAi, Some(schema)) => Some(ResponseFormat::json_schema(schema)),
            (ProviderKind::OpenAi | ProviderKind::OpenRouter, _) => Some(ResponseFormat::json_object()),
        }
    }

    /// Sends a narrowed single-item prompt with the edit budget.
    pub(crate) async fn complete_edit(
        &self,
        label: &str,
        prompt: Prompt,
        schema: JsonSchemaDefinition,
    ) -> PipelineResult<String> {
        let request = CompletionRequest {
            label: label.to_string(),
            prompt,
            tier: ModelTier::Fast,
            max_tokens: self.settings.edit_max_tokens,
            timeout: self.settings.edit_timeout,
            response_format: self.response_format(Some(schema)),
            temperature: Some(0.9),
        };
        self.client.complete(&request).await
    }

    /// Generates a complete menu for `request` against the in-stock part of
    /// `cellar`. The cellar is only read.
    #[instrument(skip_all, fields(title = %request.title, guests = request.person_count))]
    pub async fn generate(&self, request: &MenuRequest, cellar: &Cellar) -> PipelineResult<MenuResponse> {
        self.client.ensure_configured()?;
        let started = Instant::now();

        let snapshot = self.snapshot(cellar);
        info!(
            listed = snapshot.listed,
            total = snapshot.total,
            truncated = snapshot.is_truncated(),
            "inventory snapshot built"
        );

        let prompt = build_menu_prompt(request, &snapshot, &self.settings.language);
        let completion = CompletionRequest {
            label: "menu".to_string(),
            prompt,
            tier: ModelTier::Capable,
            max_tokens: self.settings.menu_max_tokens,
            timeout: self.settings.menu_timeout,
            response_format: self.response_format(None),
            temperature: Some(0.7),
        };
        let raw = self.client.complete(&completion).await?;
        let menu = decode_menu(&raw, &Self::decode_options(request, &snapshot))?;

        info!(
            dishes = menu.courses.dish_count(),
            pairings = menu.wine_pairings.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "menu generated"
        );
        Ok(menu)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::api_connection::{ScriptedClient, ScriptedReply};
    use crate::cellar::test_support::sample_cellar;
    use crate::error::PipelineError;
    use crate::menu::model::WineSource;
    use crate::menu::prompt::NOTES_PRIORITY_MARKER;

    #[tokio::test]
    async fn test_generate_decodes_and_uses_capable_tier() {
        let client = Arc::new(ScriptedClient::with_replies([MENU_JSON]));
        let menu = generator(client.clone())
            .generate(&request(), &sample_cellar())
            .await
            .unwrap();

        assert_eq!(menu.courses.starters.len(), 2);
        assert_eq!(menu.courses.mains.len(), 1);
        assert_eq!(menu.wine_pairings.len(), 2);
        assert_eq!(menu.courses.starters[0].servings, 4);

        let sent = client.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].tier, ModelTier::Capable);
        assert!(sent[0].prompt.user.contains(NOTES_PRIORITY_MARKER));
        assert_eq!(sent[0].response_format, Some(ResponseFormat::json_object()));
    }

    #[tokio::test]
    async fn test_empty_cellar_yields_only_purchases() {
        let client = Arc::new(ScriptedClient::with_replies([MENU_JSON]));
        let menu = generator(client)
            .generate(&request(), &Cellar::default())
            .await
            .unwrap();
        assert!(menu
            .wine_pairings
            .iter()
            .all(|p| p.wine.source == WineSource::ToPurchase));
    }

    #[tokio::test]
    async fn test_missing_credential_fails_before_any_call() {
        let client = Arc::new(ScriptedClient::unconfigured());
        let err = generator(client.clone())
            .generate(&request(), &sample_cellar())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_client_errors_surface_verbatim() {
        let client = Arc::new(ScriptedClient::new());
        client.push(ScriptedReply::RateLimited(Some(12)));
        let err = generator(client.clone())
            .generate(&request(), &sample_cellar())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::RateLimit { retry_after_secs: Some(12) }));
        // no retry in the core
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_completion_is_decode_error() {
        let client = Arc::new(ScriptedClient::with_replies(["I could not plan this dinner, sorry."]));
        let err = generator(client)
            .generate(&request(), &sample_cellar())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Decode { .. }));
    }
}
