//! Scenario and report types for the benchmark runner.

use conclave_core::id::AgentId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Success criteria for one scenario. Every `Some` field must hold; all
/// are combined by AND.
#[non_exhaustive]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuccessCriteria {
    /// At least this many distinct agents must have spoken.
    pub min_agents: Option<usize>,
    /// The conversation must finish in at most this many turns.
    pub max_turns: Option<u32>,
    /// At least half of these keywords must appear somewhere in the
    /// transcript (case-insensitive).
    pub required_keywords: Option<Vec<String>>,
    /// Total cost must not exceed this.
    pub max_cost: Option<Decimal>,
    /// Wall-clock duration must not exceed this.
    pub max_duration_ms: Option<u64>,
    /// Fraction of the full registry that must have participated.
    pub agent_diversity: Option<f64>,
}

/// One named, reproducible conversation scenario.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Stable identifier.
    pub scenario_id: String,
    /// Display name.
    pub name: String,
    /// Grouping used for per-category rollups.
    pub category: String,
    /// Free-form complexity label (e.g. `"simple"`, `"complex"`).
    pub complexity: String,
    /// Agents this scenario is expected to involve. Informational only —
    /// not itself a pass/fail criterion.
    pub expected_agents: Vec<AgentId>,
    /// Turn budget passed through to the orchestrator run.
    pub max_turns: u32,
    /// Wall-clock budget for the whole scenario.
    pub timeout: Duration,
    /// Criteria the run is graded against.
    pub success_criteria: SuccessCriteria,
    /// User messages sent in order; each starts (or continues) the
    /// conversation in the same `conversation_id`.
    pub test_messages: Vec<String>,
}

/// Outcome of running one scenario.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    /// Scenario this result grades.
    pub scenario_id: String,
    /// Scenario name, carried for report readability.
    pub name: String,
    /// Scenario category, carried for per-category rollups.
    pub category: String,
    /// Whether every applicable criterion held.
    pub passed: bool,
    /// Human-readable reasons for each criterion that failed. Empty when
    /// `passed`.
    pub failures: Vec<String>,
    /// Turns the conversation actually ran.
    pub turn_count: u32,
    /// Wall-clock duration of the scenario run.
    pub duration_ms: u64,
    /// Distinct agents that spoke, in first-speaking order.
    pub agents_used: Vec<AgentId>,
    /// Total cost across the scenario's conversation(s).
    pub total_cost: Decimal,
    /// Total input + output tokens across the scenario's conversation(s).
    pub total_tokens: u64,
    /// `true` if the scenario hit its wall-clock timeout before finishing.
    pub timed_out: bool,
}

/// Aggregate numbers for one `category`.
#[non_exhaustive]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryRollup {
    /// Scenarios run in this category.
    pub total: usize,
    /// Scenarios that passed.
    pub passed: usize,
    /// `passed / total`, `0.0` if `total == 0`.
    pub pass_rate: f64,
}

/// A full benchmark run's report — the single structured document CI
/// ingests.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchReport {
    /// Per-scenario results, in run order.
    pub results: Vec<ScenarioResult>,
    /// Fraction of scenarios that passed.
    pub pass_rate: f64,
    /// Mean duration across all scenarios.
    pub mean_duration_ms: f64,
    /// Median duration.
    pub p50_duration_ms: u64,
    /// 95th-percentile duration.
    pub p95_duration_ms: u64,
    /// Mean total tokens (input + output) across all scenarios.
    pub mean_tokens: f64,
    /// Mean total cost across all scenarios.
    pub mean_cost: Decimal,
    /// Rollups keyed by `category`.
    pub per_category: HashMap<String, CategoryRollup>,
}
