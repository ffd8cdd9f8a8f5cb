//! Runtime-selectable provider, so [`crate::AppContext`] can be concrete
//! (not generic) even though [`conclave_turn::Provider`] is intentionally
//! not object-safe.
//!
//! Each variant is gated by the matching `provider-*` cargo feature,
//! mirroring this workspace's facade crate's optional-dependency
//! features for provider/state/orchestration backends.

use conclave_turn::provider::{Provider, ProviderError};
use conclave_turn::types::{ProviderRequest, ProviderResponse};

/// One of the compiled-in provider backends, chosen by name at
/// [`crate::AppContext::init`] time (`provider_name` in `ConclaveConfig`).
#[non_exhaustive]
pub enum AnyProvider {
    /// Anthropic Messages API.
    #[cfg(feature = "provider-anthropic")]
    Anthropic(conclave_provider_anthropic::AnthropicProvider),
    /// OpenAI Chat Completions API.
    #[cfg(feature = "provider-openai")]
    OpenAi(conclave_provider_openai::OpenAIProvider),
    /// Ollama local model server.
    #[cfg(feature = "provider-ollama")]
    Ollama(conclave_provider_ollama::OllamaProvider),
}

impl Provider for AnyProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        match self {
            #[cfg(feature = "provider-anthropic")]
            AnyProvider::Anthropic(p) => p.complete(request).await,
            #[cfg(feature = "provider-openai")]
            AnyProvider::OpenAi(p) => p.complete(request).await,
            #[cfg(feature = "provider-ollama")]
            AnyProvider::Ollama(p) => p.complete(request).await,
        }
    }
}
