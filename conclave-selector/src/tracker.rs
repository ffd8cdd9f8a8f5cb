//! Per-agent running stats (EMA success rate, coordination score, load).

use conclave_core::id::AgentId;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Exponential moving average smoothing factor for
/// [`AgentStats::record_outcome`].
const SUCCESS_EMA_ALPHA: f64 = 0.2;
/// Smoothing factor for the coordination score update.
const COORDINATION_EMA_ALPHA: f64 = 0.1;

#[derive(Debug, Clone, Copy)]
struct AgentStats {
    success_ema: f64,
    coordination_score: f64,
    load: f64,
}

impl Default for AgentStats {
    fn default() -> Self {
        Self {
            success_ema: 0.95,
            coordination_score: 0.80,
            load: 0.0,
        }
    }
}

/// Tracks per-agent historical-success EMA, coordination score, and current
/// load, behind a `RwLock<HashMap<_>>` — the same interior-mutability idiom
/// `conclave-memory`'s in-memory store uses. New agents start at the
/// documented initial values (0.95 success, 0.80 coordination, 0 load).
#[derive(Default)]
pub struct SelectorTracker {
    stats: RwLock<HashMap<AgentId, AgentStats>>,
}

impl SelectorTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// This agent's current historical-success score.
    pub async fn success_score(&self, agent_id: &AgentId) -> f64 {
        self.stats.read().await.get(agent_id).copied().unwrap_or_default().success_ema
    }

    /// This agent's current coordination score.
    pub async fn coordination_score(&self, agent_id: &AgentId) -> f64 {
        self.stats
            .read()
            .await
            .get(agent_id)
            .copied()
            .unwrap_or_default()
            .coordination_score
    }

    /// This agent's current load, in `[0, 1]`.
    pub async fn load(&self, agent_id: &AgentId) -> f64 {
        self.stats.read().await.get(agent_id).copied().unwrap_or_default().load
    }

    /// Set an agent's current load directly (e.g. from in-flight turn
    /// count / capacity).
    pub async fn set_load(&self, agent_id: &AgentId, load: f64) {
        let mut stats = self.stats.write().await;
        stats.entry(agent_id.clone()).or_default().load = load.clamp(0.0, 1.0);
    }

    /// Fold a turn's outcome into the agent's success EMA and coordination
    /// score.
    pub async fn record_outcome(&self, agent_id: &AgentId, success: bool) {
        let mut stats = self.stats.write().await;
        let entry = stats.entry(agent_id.clone()).or_default();
        let observed = if success { 1.0 } else { 0.0 };
        entry.success_ema = SUCCESS_EMA_ALPHA * observed + (1.0 - SUCCESS_EMA_ALPHA) * entry.success_ema;
        entry.coordination_score =
            COORDINATION_EMA_ALPHA * observed + (1.0 - COORDINATION_EMA_ALPHA) * entry.coordination_score;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_agent_starts_at_documented_defaults() {
        let tracker = SelectorTracker::new();
        let id = AgentId::new("finance");
        assert_eq!(tracker.success_score(&id).await, 0.95);
        assert_eq!(tracker.coordination_score(&id).await, 0.80);
        assert_eq!(tracker.load(&id).await, 0.0);
    }

    #[tokio::test]
    async fn record_outcome_moves_ema_toward_observation() {
        let tracker = SelectorTracker::new();
        let id = AgentId::new("finance");
        tracker.record_outcome(&id, false).await;
        assert!(tracker.success_score(&id).await < 0.95);
    }

    #[tokio::test]
    async fn set_load_clamps_to_unit_interval() {
        let tracker = SelectorTracker::new();
        let id = AgentId::new("finance");
        tracker.set_load(&id, 1.5).await;
        assert_eq!(tracker.load(&id).await, 1.0);
    }
}
