//! Integration test: real Anthropic Haiku call through `Provider::complete`.

use conclave_provider_anthropic::AnthropicProvider;
use conclave_turn::provider::Provider;
use conclave_turn::types::{ContentPart, ProviderMessage, ProviderRequest, Role, StopReason};

#[tokio::test]
#[ignore] // Requires ANTHROPIC_API_KEY environment variable
async fn real_haiku_simple_completion() {
    let api_key = std::env::var("ANTHROPIC_API_KEY").expect("ANTHROPIC_API_KEY not set");
    let provider = AnthropicProvider::new(api_key);

    let request = ProviderRequest {
        model: Some("claude-haiku-4-5-20251001".into()),
        messages: vec![ProviderMessage {
            role: Role::User,
            content: vec![ContentPart::Text {
                text: "Say hello in exactly 3 words.".into(),
            }],
        }],
        tools: vec![],
        max_tokens: Some(128),
        temperature: None,
        system: Some("You are a helpful assistant. Be very concise.".into()),
        extra: serde_json::Value::Null,
    };

    let response = provider.complete(request).await.unwrap();

    assert_eq!(response.stop_reason, StopReason::EndTurn);
    assert!(response.usage.input_tokens > 0);
    assert!(response.usage.output_tokens > 0);
    let text = response
        .content
        .iter()
        .find_map(|part| match part {
            ContentPart::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .expect("text content");
    assert!(!text.is_empty());
}
