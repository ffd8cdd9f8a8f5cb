//! `WorkflowDefinition` — a named, validated DAG of steps.

use conclave_core::id::{AgentId, WorkflowId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// What kind of work a step performs. Informs how the executor logs and
/// reports it; does not change dispatch mechanics.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// Gathers and interprets information.
    Analysis,
    /// Chooses among options.
    Decision,
    /// Performs a side-effecting action.
    Action,
    /// Checks a prior result against a rule.
    Validation,
}

/// How a workflow's runnable steps are scheduled.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationPattern {
    /// Topological order, one step at a time.
    Sequential,
    /// Steps whose inputs are all ready run concurrently, by level.
    Parallel,
    /// A coordinator step delegates to worker steps that run in parallel,
    /// then consumes their outputs.
    Hierarchical,
}

/// One node in a [`WorkflowDefinition`]'s DAG.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Unique (within the definition) step identifier.
    pub step_id: String,
    /// The agent that executes this step.
    pub agent_id: AgentId,
    /// What kind of work this step performs.
    pub step_type: StepType,
    /// Ids of steps whose outputs feed this step.
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Named output schema (informational; not enforced at runtime).
    #[serde(default)]
    pub outputs: serde_json::Value,
    /// Optional gating condition evaluated against prior step outputs.
    pub conditions: Option<serde_json::Value>,
    /// Per-step wall-clock timeout, in seconds.
    pub timeout_seconds: u64,
    /// Number of retries on timeout, with exponential backoff.
    pub retry_count: u32,
    /// Whether this step requires external approval before running.
    /// The executor surfaces this as a pending state; it does not implement
    /// an approval channel itself.
    #[serde(default)]
    pub approval_required: bool,
}

/// A named, validated DAG of [`WorkflowStep`]s.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique identifier for this workflow.
    pub workflow_id: WorkflowId,
    /// Human-readable name.
    pub name: String,
    /// All steps in the DAG.
    pub steps: Vec<WorkflowStep>,
    /// Step ids with no unmet dependencies — where execution starts.
    pub entry_points: Vec<String>,
    /// Step ids whose completion satisfies the workflow's exit condition.
    pub exit_conditions: Vec<String>,
    /// Which coordination pattern governs scheduling.
    pub pattern: CoordinationPattern,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Why a [`WorkflowDefinition`] failed validation.
#[non_exhaustive]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Two steps share a `step_id`.
    #[error("duplicate step id: {0}")]
    DuplicateStep(String),
    /// An `entry_points` id has no matching step.
    #[error("entry point references unknown step: {0}")]
    UnknownEntryPoint(String),
    /// An `exit_conditions` id has no matching step.
    #[error("exit condition references unknown step: {0}")]
    UnknownExitCondition(String),
    /// A step's `inputs` references a step id that does not exist.
    #[error("step {step} references unknown input step: {input}")]
    UnknownInput {
        /// The step with the dangling reference.
        step: String,
        /// The referenced, missing step id.
        input: String,
    },
    /// The induced input graph has a cycle.
    #[error("workflow contains a cycle involving step: {0}")]
    Cycle(String),
    /// No step is reachable from the declared entry points.
    #[error("no steps reachable from entry points")]
    Unreachable,
}

impl WorkflowDefinition {
    /// Validate acyclicity and referential integrity. Per the data model
    /// invariants: the induced input graph must be acyclic, and every
    /// `entry_points`/`exit_conditions`/`inputs` id must name a real step.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        let mut by_id: HashMap<&str, &WorkflowStep> = HashMap::new();
        for step in &self.steps {
            if !seen.insert(step.step_id.as_str()) {
                return Err(ValidationError::DuplicateStep(step.step_id.clone()));
            }
            by_id.insert(step.step_id.as_str(), step);
        }

        for entry in &self.entry_points {
            if !by_id.contains_key(entry.as_str()) {
                return Err(ValidationError::UnknownEntryPoint(entry.clone()));
            }
        }
        for exit in &self.exit_conditions {
            if !by_id.contains_key(exit.as_str()) {
                return Err(ValidationError::UnknownExitCondition(exit.clone()));
            }
        }
        for step in &self.steps {
            for input in &step.inputs {
                if !by_id.contains_key(input.as_str()) {
                    return Err(ValidationError::UnknownInput {
                        step: step.step_id.clone(),
                        input: input.clone(),
                    });
                }
            }
        }

        self.check_acyclic(&by_id)?;
        self.check_reachable(&by_id)?;
        Ok(())
    }

    fn check_acyclic(&self, by_id: &HashMap<&str, &WorkflowStep>) -> Result<(), ValidationError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }
        let mut marks: HashMap<&str, Mark> = HashMap::new();

        fn visit<'a>(
            id: &'a str,
            by_id: &HashMap<&'a str, &'a WorkflowStep>,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> Result<(), ValidationError> {
            match marks.get(id) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => return Err(ValidationError::Cycle(id.to_string())),
                None => {}
            }
            marks.insert(id, Mark::Visiting);
            if let Some(step) = by_id.get(id) {
                for input in &step.inputs {
                    visit(input.as_str(), by_id, marks)?;
                }
            }
            marks.insert(id, Mark::Done);
            Ok(())
        }

        for step in self.steps.iter() {
            visit(step.step_id.as_str(), by_id, &mut marks)?;
        }
        Ok(())
    }

    fn check_reachable(&self, by_id: &HashMap<&str, &WorkflowStep>) -> Result<(), ValidationError> {
        if self.steps.is_empty() {
            return Ok(());
        }
        // Reachability is defined over the "feeds into" direction: a step is
        // reachable if it is an entry point, or it consumes a reachable step.
        let mut reachable: HashSet<&str> = self.entry_points.iter().map(|s| s.as_str()).collect();
        let mut changed = true;
        while changed {
            changed = false;
            for step in &self.steps {
                if reachable.contains(step.step_id.as_str()) {
                    continue;
                }
                if step.inputs.iter().any(|i| reachable.contains(i.as_str())) {
                    reachable.insert(step.step_id.as_str());
                    changed = true;
                }
            }
        }
        if reachable.is_empty() || !by_id.keys().any(|id| reachable.contains(id)) {
            return Err(ValidationError::Unreachable);
        }
        Ok(())
    }
}
