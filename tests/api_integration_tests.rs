use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use cellar_menu::api_connection::{
    CompletionClient, CompletionRequest, DebugOutcome, HttpCompletionClient, ModelTier, Prompt,
    Provider, ProviderKind,
};
use cellar_menu::api_connection::endpoints::ResponseFormat;
use cellar_menu::cellar::Cellar;
use cellar_menu::config::Settings;
use cellar_menu::menu::{DietType, MenuGenerator, MenuRequest};
use cellar_menu::PipelineError;
use chrono::NaiveDate;
use dotenv::dotenv;
use mockito::Matcher;
use serde_json::json;

const FAST_MODEL: &str = "test-fast";
const CAPABLE_MODEL: &str = "test-capable";

fn client_for(kind: ProviderKind, key: Option<&str>, base_url: &str) -> HttpCompletionClient {
    let provider = Provider::new(kind, key.map(str::to_string), Some(base_url.to_string()));
    HttpCompletionClient::new(provider, FAST_MODEL.to_string(), CAPABLE_MODEL.to_string(), 10)
}

fn request(label: &str, tier: ModelTier) -> CompletionRequest {
    CompletionRequest {
        label: label.to_string(),
        prompt: Prompt {
            system: "Reply with JSON.".to_string(),
            user: "Plan a dinner.".to_string(),
        },
        tier,
        max_tokens: 500,
        timeout: Duration::from_secs(10),
        response_format: Some(ResponseFormat::json_object()),
        temperature: Some(0.7),
    }
}

fn chat_body(content: &str) -> String {
    json!({
        "id": "cmpl-1",
        "model": CAPABLE_MODEL,
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17}
    })
    .to_string()
}

#[tokio::test]
async fn test_openai_success_returns_content_and_logs_it() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .match_body(Matcher::PartialJson(json!({
            "model": CAPABLE_MODEL,
            "response_format": {"type": "json_object"},
            "max_tokens": 500
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(chat_body(r#"{"ok": true}"#))
        .create_async()
        .await;

    let client = client_for(ProviderKind::OpenAi, Some("sk-test"), &server.url());
    let text = client.complete(&request("menu", ModelTier::Capable)).await.unwrap();
    assert_eq!(text, r#"{"ok": true}"#);
    mock.assert_async().await;

    let entries = client.shared_debug_log().entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].label, "menu");
    assert_eq!(entries[0].model, CAPABLE_MODEL);
    assert!(matches!(entries[0].outcome, DebugOutcome::Response(_)));
}

#[tokio::test]
async fn test_fast_tier_uses_fast_model() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::PartialJson(json!({"model": FAST_MODEL})))
        .with_status(200)
        .with_body(chat_body("{}"))
        .create_async()
        .await;

    let client = client_for(ProviderKind::OpenAi, Some("sk-test"), &server.url());
    client.complete(&request("dish", ModelTier::Fast)).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .with_status(429)
        .with_header("retry-after", "17")
        .with_body(r#"{"error": {"message": "slow down"}}"#)
        .expect(1)
        .create_async()
        .await;

    let client = client_for(ProviderKind::OpenAi, Some("sk-test"), &server.url());
    let err = client.complete(&request("menu", ModelTier::Capable)).await.unwrap_err();
    assert!(matches!(err, PipelineError::RateLimit { retry_after_secs: Some(17) }));
    // surfaced, not retried
    mock.assert_async().await;

    let entries = client.shared_debug_log().entries();
    assert!(matches!(entries[0].outcome, DebugOutcome::Error(_)));
}

#[tokio::test]
async fn test_server_error_is_network_error_with_provider_message() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(500)
        .with_body(r#"{"error": {"message": "upstream exploded"}}"#)
        .create_async()
        .await;

    let client = client_for(ProviderKind::OpenAi, Some("sk-test"), &server.url());
    match client.complete(&request("menu", ModelTier::Capable)).await {
        Err(PipelineError::Network(message)) => {
            assert!(message.contains("500"));
            assert!(message.contains("upstream exploded"));
        }
        other => panic!("expected a network error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_key_never_reaches_the_network() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .expect(0)
        .create_async()
        .await;

    let client = client_for(ProviderKind::OpenAi, None, &server.url());
    let err = client.complete(&request("menu", ModelTier::Capable)).await.unwrap_err();
    assert!(matches!(err, PipelineError::Configuration(_)));
    assert!(err.to_string().contains("OPENAI_API_KEY"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_anthropic_messages_wire() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/messages")
        .match_header("x-api-key", "sk-ant")
        .match_header("anthropic-version", "2023-06-01")
        .match_body(Matcher::PartialJson(json!({
            "model": CAPABLE_MODEL,
            "system": "Reply with JSON.",
            "messages": [{"role": "user", "content": "Plan a dinner."}]
        })))
        .with_status(200)
        .with_body(
            json!({
                "content": [{"type": "text", "text": "{\"menu\": {}}"}],
                "stop_reason": "end_turn"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = client_for(ProviderKind::Anthropic, Some("sk-ant"), &server.url());
    let mut req = request("menu", ModelTier::Capable);
    req.response_format = None;
    let text = client.complete(&req).await.unwrap();
    assert_eq!(text, r#"{"menu": {}}"#);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_openrouter_sends_attribution_headers() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("x-title", "cellar-menu")
        .match_header("authorization", "Bearer sk-or")
        .with_status(200)
        .with_body(chat_body("{}"))
        .create_async()
        .await;

    let client = client_for(ProviderKind::OpenRouter, Some("sk-or"), &server.url());
    client.complete(&request("menu", ModelTier::Capable)).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_silent_server_times_out() {
    // accepts connections through the backlog but never answers
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());

    let client = client_for(ProviderKind::OpenAi, Some("sk-test"), &url);
    let mut req = request("menu", ModelTier::Capable);
    req.timeout = Duration::from_millis(200);
    let err = client.complete(&req).await.unwrap_err();
    assert!(matches!(err, PipelineError::Timeout { .. }));
    drop(listener);
}

#[tokio::test]
async fn test_generator_decodes_fenced_completion_over_http() {
    let menu_json = json!({
        "menu": {
            "starters": [{"name": "Alici marinate", "description": "Anchovies",
                "recipe": {"ingredients": ["anchovies", "lemon"], "steps": ["Marinate overnight"]}}],
            "mainCourses": [{"name": "Orata al forno", "description": "Baked bream",
                "recipe": {"ingredients": ["bream"], "steps": ["Bake"], "prepMinutes": 15, "cookMinutes": 30}}]
        },
        "winePairings": [
            {"course": "starters", "producer": "Pieropan", "wineName": "Soave Classico", "source": "fromCellar", "quantity": 1, "reasoning": "Saline"}
        ],
        "serviceNotes": "Chill the whites."
    });
    let fenced = format!("Sure! Here is the plan:\n```json\n{}\n```", menu_json);

    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body(chat_body(&fenced))
        .create_async()
        .await;

    let mut settings = Settings::for_provider(ProviderKind::OpenAi);
    settings.api_key = Some("sk-test".to_string());
    settings.base_url = Some(server.url());
    let client = HttpCompletionClient::from_settings(&settings);
    let generator = MenuGenerator::new(Arc::new(client), settings);

    let request = MenuRequest {
        title: "Cena estiva".to_string(),
        date: NaiveDate::from_ymd_opt(2026, 7, 18).unwrap(),
        person_count: 4,
        occasion: None,
        diet: DietType::Pescatarian,
        cuisine: "Italian".to_string(),
        notes: Some("solo pesce".to_string()),
        taste: None,
    };
    // empty cellar: the cellar pick must come back as a purchase
    let menu = generator.generate(&request, &Cellar::default()).await.unwrap();
    assert_eq!(menu.courses.starters.len(), 1);
    assert_eq!(menu.courses.mains.len(), 1);
    assert_eq!(menu.wine_pairings.len(), 1);
    assert_eq!(
        menu.wine_pairings[0].wine.source,
        cellar_menu::menu::WineSource::ToPurchase
    );
}

#[tokio::test]
#[ignore]
async fn test_live_provider_round_trip() {
    dotenv().ok();
    let settings = Settings::from_env();
    if settings.api_key.is_none() {
        println!(
            "Skipping test_live_provider_round_trip: {} not set.",
            settings.provider.api_key_env_var()
        );
        return;
    }

    let client = HttpCompletionClient::from_settings(&settings);
    let mut req = request("live", ModelTier::Fast);
    req.prompt.user = "Return {\"capital\": <capital of France>} as JSON.".to_string();
    if settings.provider == ProviderKind::Anthropic {
        req.response_format = None;
    }
    let text = client.complete(&req).await.unwrap();
    assert!(text.to_lowercase().contains("paris"));
}
