//! Environment-driven orchestrator configuration.

use std::env;
use std::str::FromStr;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Static configuration for a [`crate::GroupChatOrchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Provider name used for pricing lookups (e.g. `"anthropic"`).
    pub provider_name: String,
    /// Model used when an agent has no `model_hint`.
    pub default_model: String,
    /// Upper bound on output tokens per call; also the cost-estimation
    /// heuristic's output-token figure before the real call returns usage.
    pub default_max_tokens: u32,
    /// Hard cap on turns for one conversation.
    pub max_turns: u32,
    /// `RAG_TOP_K`. Candidate memories considered per turn.
    pub rag_top_k: usize,
    /// `RAG_THRESHOLD`. Minimum composite score to include a memory.
    pub rag_threshold: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            provider_name: "anthropic".to_string(),
            default_model: String::new(),
            default_max_tokens: 4096,
            max_turns: 25,
            rag_top_k: env_or("RAG_TOP_K", 5),
            rag_threshold: env_or("RAG_THRESHOLD", 0.6),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from the environment, falling back to documented
    /// defaults for any unset variable.
    pub fn from_env() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = OrchestratorConfig::default();
        assert!(cfg.max_turns > 0);
        assert!(cfg.rag_top_k > 0);
        assert!((0.0..=1.0).contains(&cfg.rag_threshold));
    }
}
