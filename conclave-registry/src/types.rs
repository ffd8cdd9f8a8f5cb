//! Agent definition types.

use conclave_core::id::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An agent's role within the group chat, coarse-grained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentTier {
    /// Drives multi-agent coordination. Exactly one coordinator-tier agent
    /// is the designated master orchestrator per process
    /// ([`AgentDefinition::is_master`]).
    Coordinator,
    /// A domain specialist invoked for its expertise.
    Specialist,
    /// Carries out a concrete action (tool call, side effect).
    Executor,
    /// Observes and reports, does not act.
    Monitor,
    /// Relays/summarizes between other agents or the user.
    Communicator,
}

/// Identity of a specialist participant in the group chat.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Stable, unique identifier. Immutable once loaded.
    pub agent_id: AgentId,
    /// Display name.
    pub name: String,
    /// Free-form role description.
    pub role: String,
    /// Coarse-grained tier.
    pub tier: AgentTier,
    /// Category used for grouping/filtering (e.g. "finance", "legal").
    pub category: String,
    /// Keywords this agent matches against for expertise-based search and
    /// speaker selection.
    pub expertise_keywords: BTreeSet<String>,
    /// Tool names this agent may invoke.
    pub tools: BTreeSet<String>,
    /// System prompt text.
    pub system_prompt: String,
    /// Preferred model, if this agent should bypass the default.
    pub model_hint: Option<String>,
    /// Whether this is the single designated master orchestrator agent.
    /// Only meaningful when `tier == AgentTier::Coordinator`.
    #[serde(default)]
    pub is_master: bool,
}

impl AgentDefinition {
    /// Build a definition with the required fields; `expertise_keywords`,
    /// `tools`, `model_hint` and `is_master` default to empty/`false`.
    pub fn new(
        agent_id: AgentId,
        name: impl Into<String>,
        role: impl Into<String>,
        tier: AgentTier,
        category: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            agent_id,
            name: name.into(),
            role: role.into(),
            tier,
            category: category.into(),
            expertise_keywords: BTreeSet::new(),
            tools: BTreeSet::new(),
            system_prompt: system_prompt.into(),
            model_hint: None,
            is_master: false,
        }
    }

    /// `true` if `term` (case-insensitive) is one of this agent's
    /// expertise keywords.
    pub fn matches_expertise(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.expertise_keywords
            .iter()
            .any(|k| k.to_lowercase() == term)
    }
}
