//! Scoring and selection.

use crate::tracker::SelectorTracker;
use crate::types::{contains_completion_marker, SelectionContext, TerminationReason};
use conclave_core::id::AgentId;
use conclave_registry::{AgentDefinition, AgentTier};

const WEIGHT_EXPERTISE: f64 = 0.40;
const WEIGHT_TOOLS: f64 = 0.20;
const WEIGHT_HISTORY: f64 = 0.15;
const WEIGHT_LOAD: f64 = 0.10;
const WEIGHT_COORDINATION: f64 = 0.15;

/// Chooses the next speaker from a candidate set and decides when the
/// conversation is complete.
pub struct SpeakerSelector<'a> {
    tracker: &'a SelectorTracker,
}

impl<'a> SpeakerSelector<'a> {
    /// Build a selector over the given tracker.
    pub fn new(tracker: &'a SelectorTracker) -> Self {
        Self { tracker }
    }

    /// Score one candidate in `[0, 1]` using a weighted formula.
    pub async fn score(&self, agent: &AgentDefinition, ctx: &SelectionContext) -> f64 {
        let expertise = if ctx.task_terms.is_empty() {
            0.0
        } else {
            let hits = agent
                .expertise_keywords
                .iter()
                .filter(|k| ctx.task_terms.iter().any(|t| t.eq_ignore_ascii_case(k)))
                .count();
            hits as f64 / ctx.task_terms.len() as f64
        };
        let tools = {
            let denom = ctx.required_tools.len().max(1);
            let hits = agent.tools.iter().filter(|t| ctx.required_tools.contains(*t)).count();
            hits as f64 / denom as f64
        };
        let history = self.tracker.success_score(&agent.agent_id).await;
        let load = self.tracker.load(&agent.agent_id).await;
        let coordination = self.tracker.coordination_score(&agent.agent_id).await;

        WEIGHT_EXPERTISE * expertise
            + WEIGHT_TOOLS * tools
            + WEIGHT_HISTORY * history
            + WEIGHT_LOAD * (1.0 - load)
            + WEIGHT_COORDINATION * coordination
    }

    /// Pick the next speaker. `None` if no candidate scores above zero.
    ///
    /// For a complex task, the designated master coordinator (if present
    /// among `candidates`) is always selected first. Otherwise the
    /// highest-scoring candidate wins; ties break by lowest current load,
    /// then lowest `agent_id`.
    pub async fn select(
        &self,
        candidates: &[&AgentDefinition],
        ctx: &SelectionContext,
    ) -> Option<AgentId> {
        if ctx.is_complex {
            if let Some(coordinator) = candidates
                .iter()
                .find(|a| a.tier == AgentTier::Coordinator && a.is_master)
            {
                return Some(coordinator.agent_id.clone());
            }
        }

        let mut scored = Vec::with_capacity(candidates.len());
        for agent in candidates {
            let score = self.score(agent, ctx).await;
            let load = self.tracker.load(&agent.agent_id).await;
            scored.push((agent.agent_id.clone(), score, load));
        }

        scored.retain(|(_, score, _)| *score > 0.0);
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.0.as_str().cmp(b.0.as_str()))
        });

        scored.into_iter().next().map(|(id, _, _)| id)
    }
}

/// Decide whether the conversation should terminate. Checked in order:
/// max turns, then completion marker, then circuit state, then
/// "no viable speaker".
pub fn check_termination(
    turn_count: u32,
    max_turns: u32,
    last_message: &str,
    breaker_open: bool,
    selected: Option<&AgentId>,
) -> Option<TerminationReason> {
    if turn_count >= max_turns {
        return Some(TerminationReason::MaxTurns);
    }
    if contains_completion_marker(last_message) {
        return Some(TerminationReason::CompletionMarker);
    }
    if breaker_open {
        return Some(TerminationReason::CircuitOpen);
    }
    if selected.is_none() {
        return Some(TerminationReason::NoCandidate);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn agent(id: &str, tier: AgentTier, is_master: bool, keywords: &[&str]) -> AgentDefinition {
        AgentDefinition {
            agent_id: AgentId::new(id),
            name: id.to_string(),
            role: "role".to_string(),
            tier,
            category: "general".to_string(),
            expertise_keywords: keywords.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
            tools: BTreeSet::new(),
            system_prompt: "You help.".to_string(),
            model_hint: None,
            is_master,
        }
    }

    #[tokio::test]
    async fn complex_task_always_picks_master_coordinator() {
        let tracker = SelectorTracker::new();
        let selector = SpeakerSelector::new(&tracker);
        let lead = agent("lead", AgentTier::Coordinator, true, &[]);
        let finance = agent("finance", AgentTier::Specialist, false, &["budget"]);
        let ctx = SelectionContext {
            is_complex: true,
            ..Default::default()
        };
        let picked = selector.select(&[&finance, &lead], &ctx).await;
        assert_eq!(picked, Some(AgentId::new("lead")));
    }

    #[tokio::test]
    async fn highest_expertise_match_wins() {
        let tracker = SelectorTracker::new();
        let selector = SpeakerSelector::new(&tracker);
        let finance = agent("finance", AgentTier::Specialist, false, &["budget", "tax"]);
        let legal = agent("legal", AgentTier::Specialist, false, &["contract"]);
        let ctx = SelectionContext {
            task_terms: ["budget".to_string(), "tax".to_string()].into(),
            ..Default::default()
        };
        let picked = selector.select(&[&legal, &finance], &ctx).await;
        assert_eq!(picked, Some(AgentId::new("finance")));
    }

    #[tokio::test]
    async fn no_candidate_scores_above_zero_returns_none() {
        let tracker = SelectorTracker::new();
        let selector = SpeakerSelector::new(&tracker);
        // Zero out every weighted factor: no expertise/tool match, and
        // history/load/coordination alone still sum > 0 normally, so this
        // asserts the selector only returns None when truly nothing
        // scores — exercised via an empty candidate list instead.
        let ctx = SelectionContext::default();
        let picked = selector.select(&[], &ctx).await;
        assert_eq!(picked, None);
    }

    #[test]
    fn termination_checks_in_priority_order() {
        let id = AgentId::new("finance");
        assert_eq!(
            check_termination(5, 5, "still working", false, Some(&id)),
            Some(TerminationReason::MaxTurns)
        );
        assert_eq!(
            check_termination(1, 5, "all done here", false, Some(&id)),
            Some(TerminationReason::CompletionMarker)
        );
        assert_eq!(
            check_termination(1, 5, "still working", true, Some(&id)),
            Some(TerminationReason::CircuitOpen)
        );
        assert_eq!(
            check_termination(1, 5, "still working", false, None),
            Some(TerminationReason::NoCandidate)
        );
        assert_eq!(check_termination(1, 5, "still working", false, Some(&id)), None);
    }
}
