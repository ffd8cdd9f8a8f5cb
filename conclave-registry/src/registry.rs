//! The agent catalogue: read-only after load, no locking needed.

use crate::types::{AgentDefinition, AgentTier};
use conclave_core::id::AgentId;
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while loading a [`Registry`]. Loading fails the whole
/// batch fast — a single malformed definition rejects everything, matching
/// a fail-fast style for misconfiguration rather
/// than partial degradation.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A definition was missing one of the required fields.
    #[error("agent definition missing required field: {0}")]
    MissingField(&'static str),

    /// Two definitions shared the same `agent_id`.
    #[error("duplicate agent_id: {0}")]
    Duplicate(String),

    /// Zero, or more than one, `is_master` coordinator was found.
    #[error("expected exactly one master coordinator agent, found {0}")]
    MasterCoordinatorCount(usize),

    /// The source could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Immutable catalogue of agents for one process. Loaded once at startup
/// (optionally reloaded on signal); never mutated in place by request flow.
pub struct Registry {
    agents: HashMap<AgentId, AgentDefinition>,
}

impl Registry {
    /// Validate and load a batch of agent definitions. Rejects the whole
    /// batch on the first malformed or duplicate definition, or if the
    /// single-master-coordinator invariant does not hold.
    pub fn load(definitions: Vec<AgentDefinition>) -> Result<Self, RegistryError> {
        let mut agents = HashMap::with_capacity(definitions.len());
        let mut masters = 0usize;
        for def in definitions {
            if def.agent_id.as_str().is_empty() {
                return Err(RegistryError::MissingField("agent_id"));
            }
            if def.name.is_empty() {
                return Err(RegistryError::MissingField("name"));
            }
            if def.role.is_empty() {
                return Err(RegistryError::MissingField("role"));
            }
            if def.category.is_empty() {
                return Err(RegistryError::MissingField("category"));
            }
            if def.is_master && def.tier == AgentTier::Coordinator {
                masters += 1;
            }
            if agents.contains_key(&def.agent_id) {
                return Err(RegistryError::Duplicate(def.agent_id.to_string()));
            }
            agents.insert(def.agent_id.clone(), def);
        }
        if masters != 1 {
            return Err(RegistryError::MasterCoordinatorCount(masters));
        }
        Ok(Self { agents })
    }

    /// Parse a JSON array of agent definitions and load it.
    pub fn load_json(raw: &str) -> Result<Self, RegistryError> {
        let definitions: Vec<AgentDefinition> =
            serde_json::from_str(raw).map_err(|e| RegistryError::Parse(e.to_string()))?;
        Self::load(definitions)
    }

    /// Constant-time lookup by id.
    pub fn get(&self, agent_id: &AgentId) -> Option<&AgentDefinition> {
        self.agents.get(agent_id)
    }

    /// Case-insensitive keyword search against `expertise_keywords`. Ties
    /// broken by ascending `agent_id`, stable under repeated calls.
    pub fn find_by_expertise(&self, term: &str) -> Vec<&AgentDefinition> {
        let mut matches: Vec<&AgentDefinition> = self
            .agents
            .values()
            .filter(|a| a.matches_expertise(term))
            .collect();
        matches.sort_by(|a, b| a.agent_id.as_str().cmp(b.agent_id.as_str()));
        matches
    }

    /// Every loaded agent, in ascending `agent_id` order.
    pub fn all(&self) -> Vec<&AgentDefinition> {
        let mut all: Vec<&AgentDefinition> = self.agents.values().collect();
        all.sort_by(|a, b| a.agent_id.as_str().cmp(b.agent_id.as_str()));
        all
    }

    /// The single designated master orchestrator agent.
    pub fn master_coordinator(&self) -> &AgentDefinition {
        self.agents
            .values()
            .find(|a| a.is_master && a.tier == AgentTier::Coordinator)
            .expect("Registry::load enforces exactly one master coordinator")
    }
}
