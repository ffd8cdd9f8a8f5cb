//! Scenario execution and grading.
//!
//! Each scenario replays its scripted messages through one conversation,
//! then grades the aggregated outcome against [`crate::types::SuccessCriteria`]
//! rather than a fixed `assert!`.

use crate::types::{BenchReport, CategoryRollup, Scenario, ScenarioResult};
use conclave_core::id::{AgentId, ConversationId};
use conclave_orchestrator::{GroupChatOrchestrator, OrchestrateRequest};
use conclave_turn::Provider;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::warn;

/// Errors raised while running a scenario set, as opposed to a scenario
/// merely failing its criteria (that's `ScenarioResult::passed = false`).
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BenchError {
    /// A request inside a scenario was malformed (e.g. an unknown pinned
    /// agent configured into `expected_agents`).
    #[error("scenario {0} failed to run: {1}")]
    RunFailed(String, String),
}

/// Runs scenarios against one orchestrator instance and grades them.
pub struct BenchmarkRunner<P: Provider> {
    orchestrator: Arc<GroupChatOrchestrator<P>>,
    registry_size: usize,
}

impl<P: Provider> BenchmarkRunner<P> {
    /// `registry_size` is the full agent catalogue size, used to compute
    /// `agent_diversity` (fraction of the registry a scenario involved).
    pub fn new(orchestrator: Arc<GroupChatOrchestrator<P>>, registry_size: usize) -> Self {
        Self {
            orchestrator,
            registry_size,
        }
    }

    /// Run every scenario in order and produce the aggregate report.
    pub async fn run_all(&self, scenarios: &[Scenario]) -> BenchReport {
        let mut results = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            results.push(self.run_scenario(scenario).await);
        }
        build_report(results)
    }

    /// Run one scenario: each `test_messages` entry continues the same
    /// conversation, then the aggregated outcome is graded against
    /// `success_criteria`.
    pub async fn run_scenario(&self, scenario: &Scenario) -> ScenarioResult {
        let start = Instant::now();
        let conversation_id = ConversationId::new(format!("bench-{}", scenario.scenario_id));

        let mut agents_used: Vec<AgentId> = Vec::new();
        let mut transcript_text = String::new();
        let mut total_cost = Decimal::ZERO;
        let mut total_tokens: u64 = 0;
        let mut turn_count: u32 = 0;
        let mut timed_out = false;

        for message in &scenario.test_messages {
            let request = OrchestrateRequest::new(message.clone(), "bench-runner", conversation_id.clone());
            let run = tokio::time::timeout(scenario.timeout, self.orchestrator.orchestrate(request, None)).await;
            let outcome = match run {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    warn!(scenario = %scenario.scenario_id, error = %e, "scenario message failed to run");
                    break;
                }
                Err(_) => {
                    timed_out = true;
                    break;
                }
            };

            for agent in &outcome.agents_used {
                if !agents_used.contains(agent) {
                    agents_used.push(agent.clone());
                }
            }
            transcript_text.push_str(&outcome.response);
            transcript_text.push('\n');
            total_cost += outcome.cost_breakdown.total_cost;
            total_tokens += outcome.cost_breakdown.input_tokens + outcome.cost_breakdown.output_tokens;
            turn_count += outcome.turn_count;
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        let failures = grade(scenario, &agents_used, &transcript_text, total_cost, duration_ms, turn_count, self.registry_size);
        let passed = failures.is_empty() && !timed_out;

        ScenarioResult {
            scenario_id: scenario.scenario_id.clone(),
            name: scenario.name.clone(),
            category: scenario.category.clone(),
            passed,
            failures,
            turn_count,
            duration_ms,
            agents_used,
            total_cost,
            total_tokens,
            timed_out,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn grade(
    scenario: &Scenario,
    agents_used: &[AgentId],
    transcript_text: &str,
    total_cost: Decimal,
    duration_ms: u64,
    turn_count: u32,
    registry_size: usize,
) -> Vec<String> {
    let criteria = &scenario.success_criteria;
    let mut failures = Vec::new();

    if let Some(min_agents) = criteria.min_agents {
        if agents_used.len() < min_agents {
            failures.push(format!("min_agents: wanted >= {min_agents}, got {}", agents_used.len()));
        }
    }

    let turn_budget = criteria.max_turns.unwrap_or(scenario.max_turns).min(scenario.max_turns);
    if turn_count > turn_budget {
        failures.push(format!("max_turns: wanted <= {turn_budget}, got {turn_count}"));
    }

    if let Some(keywords) = &criteria.required_keywords {
        if !keywords.is_empty() {
            let lower = transcript_text.to_lowercase();
            let hits = keywords.iter().filter(|k| lower.contains(&k.to_lowercase())).count();
            if hits * 2 < keywords.len() {
                failures.push(format!(
                    "required_keywords: wanted >= 50% of {} to appear, got {hits}",
                    keywords.len()
                ));
            }
        }
    }

    if let Some(max_cost) = criteria.max_cost {
        if total_cost > max_cost {
            failures.push(format!("max_cost: wanted <= {max_cost}, got {total_cost}"));
        }
    }

    if let Some(max_duration_ms) = criteria.max_duration_ms {
        if duration_ms > max_duration_ms {
            failures.push(format!("max_duration_ms: wanted <= {max_duration_ms}, got {duration_ms}"));
        }
    }

    if let Some(diversity) = criteria.agent_diversity {
        let actual = if registry_size == 0 {
            0.0
        } else {
            let distinct: HashSet<&AgentId> = agents_used.iter().collect();
            distinct.len() as f64 / registry_size as f64
        };
        if actual < diversity {
            failures.push(format!("agent_diversity: wanted >= {diversity:.2}, got {actual:.2}"));
        }
    }

    failures
}

fn build_report(results: Vec<ScenarioResult>) -> BenchReport {
    let total = results.len();
    let passed = results.iter().filter(|r| r.passed).count();
    let pass_rate = if total == 0 { 0.0 } else { passed as f64 / total as f64 };

    let mut durations: Vec<u64> = results.iter().map(|r| r.duration_ms).collect();
    durations.sort_unstable();
    let mean_duration_ms = mean(&durations.iter().map(|d| *d as f64).collect::<Vec<_>>());
    let p50_duration_ms = percentile(&durations, 0.50);
    let p95_duration_ms = percentile(&durations, 0.95);

    let mean_tokens = mean(&results.iter().map(|r| r.total_tokens as f64).collect::<Vec<_>>());
    let mean_cost = if total == 0 {
        Decimal::ZERO
    } else {
        results.iter().map(|r| r.total_cost).sum::<Decimal>() / Decimal::from(total)
    };

    let mut per_category: HashMap<String, CategoryRollup> = HashMap::new();
    for result in &results {
        let rollup = per_category.entry(result.category.clone()).or_default();
        rollup.total += 1;
        if result.passed {
            rollup.passed += 1;
        }
    }
    for rollup in per_category.values_mut() {
        rollup.pass_rate = if rollup.total == 0 { 0.0 } else { rollup.passed as f64 / rollup.total as f64 };
    }

    BenchReport {
        results,
        pass_rate,
        mean_duration_ms,
        p50_duration_ms,
        p95_duration_ms,
        mean_tokens,
        mean_cost,
        per_category,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// `sorted` must already be sorted ascending. Nearest-rank method.
fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((p * sorted.len() as f64).ceil() as usize).clamp(1, sorted.len());
    sorted[rank - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SuccessCriteria;
    use std::time::Duration;

    fn scenario() -> Scenario {
        Scenario {
            scenario_id: "s1".to_string(),
            name: "Simple greeting".to_string(),
            category: "smoke".to_string(),
            complexity: "simple".to_string(),
            expected_agents: vec![AgentId::new("lead")],
            max_turns: 5,
            timeout: Duration::from_secs(5),
            success_criteria: SuccessCriteria {
                min_agents: Some(1),
                max_turns: Some(5),
                required_keywords: Some(vec!["hello".to_string()]),
                max_cost: Some(Decimal::from(10)),
                max_duration_ms: Some(60_000),
                agent_diversity: None,
            },
            test_messages: vec!["hi there".to_string()],
        }
    }

    #[test]
    fn grading_passes_when_all_criteria_hold() {
        let s = scenario();
        let failures = grade(&s, &[AgentId::new("lead")], "hello there", Decimal::ONE, 100, 1, 3);
        assert!(failures.is_empty(), "{failures:?}");
    }

    #[test]
    fn grading_fails_on_missing_keyword() {
        let s = scenario();
        let failures = grade(&s, &[AgentId::new("lead")], "goodbye", Decimal::ONE, 100, 1, 3);
        assert!(failures.iter().any(|f| f.contains("required_keywords")));
    }

    #[test]
    fn grading_fails_on_cost_overrun() {
        let s = scenario();
        let failures = grade(&s, &[AgentId::new("lead")], "hello", Decimal::from(100), 100, 1, 3);
        assert!(failures.iter().any(|f| f.contains("max_cost")));
    }

    #[test]
    fn percentile_nearest_rank() {
        let sorted = vec![10, 20, 30, 40, 50];
        assert_eq!(percentile(&sorted, 0.50), 30);
        assert_eq!(percentile(&sorted, 0.95), 50);
    }

    #[test]
    fn report_rolls_up_by_category() {
        let results = vec![ScenarioResult {
            scenario_id: "s1".to_string(),
            name: "n".to_string(),
            category: "smoke".to_string(),
            passed: true,
            failures: vec![],
            turn_count: 1,
            duration_ms: 50,
            agents_used: vec![AgentId::new("lead")],
            total_cost: Decimal::ONE,
            total_tokens: 10,
            timed_out: false,
        }];
        let report = build_report(results);
        assert_eq!(report.pass_rate, 1.0);
        assert_eq!(report.per_category["smoke"].passed, 1);
    }
}
