//! Execution of a [`WorkflowDefinition`] against the agent pool.

use crate::definition::{CoordinationPattern, WorkflowDefinition, WorkflowStep};
use crate::execution::{ExecutionStatus, WorkflowExecution};
use async_trait::async_trait;
use chrono::Utc;
use conclave_core::content::Content;
use conclave_core::error::OrchError;
use conclave_core::id::ExecutionId;
use conclave_core::operator::{OperatorInput, TriggerType};
use conclave_core::orchestrator::Orchestrator;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Errors raised while executing a workflow.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The definition failed validation before execution could start.
    #[error("invalid workflow definition: {0}")]
    InvalidDefinition(#[from] crate::definition::ValidationError),
    /// A step exhausted its retries.
    #[error("step {step} failed after {attempts} attempt(s): {source}")]
    StepFailed {
        /// The step that failed.
        step: String,
        /// Number of attempts made.
        attempts: u32,
        /// The underlying dispatch error.
        #[source]
        source: OrchError,
    },
    /// A step did not complete within `timeout_seconds` on its final attempt.
    #[error("step {0} timed out on its final attempt")]
    StepTimedOut(String),
}

/// A handle used to request cancellation of a running execution. Cancelling
/// stops admission of new steps; steps already dispatched are allowed to
/// complete and their results are recorded.
#[derive(Clone, Default)]
pub struct CancellationHandle(Arc<AtomicBool>);

impl CancellationHandle {
    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Sink for persisting [`WorkflowExecution`] at each state transition.
/// Implementations decide durability; an in-memory map is sufficient for
/// tests and single-process deployments.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Persist (upsert) the current state of an execution.
    async fn save(&self, execution: &WorkflowExecution);
}

/// An [`ExecutionStore`] backed by a `RwLock<HashMap<_>>`.
#[derive(Default)]
pub struct InMemoryExecutionStore {
    runs: tokio::sync::RwLock<HashMap<String, WorkflowExecution>>,
}

impl InMemoryExecutionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the last-persisted state of an execution, if any.
    pub async fn get(&self, execution_id: &ExecutionId) -> Option<WorkflowExecution> {
        self.runs.read().await.get(execution_id.as_str()).cloned()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn save(&self, execution: &WorkflowExecution) {
        self.runs
            .write()
            .await
            .insert(execution.execution_id.as_str().to_string(), execution.clone());
    }
}

/// Executes [`WorkflowDefinition`]s against an [`Orchestrator`], dispatching
/// each step as an agent invocation and gating retries/timeouts per step.
pub struct WorkflowExecutor {
    orch: Arc<dyn Orchestrator>,
    store: Arc<dyn ExecutionStore>,
}

impl WorkflowExecutor {
    /// Build an executor over the given orchestrator and execution store.
    pub fn new(orch: Arc<dyn Orchestrator>, store: Arc<dyn ExecutionStore>) -> Self {
        Self { orch, store }
    }

    /// Run `definition` end to end, returning the final [`WorkflowExecution`]
    /// record (terminal status is always `Completed`, `Failed`, or
    /// `Cancelled`; a validation failure returns `Err` before any step runs).
    pub async fn run(
        &self,
        definition: &WorkflowDefinition,
        user_id: impl Into<String>,
        execution_id: ExecutionId,
    ) -> Result<WorkflowExecution, ExecutorError> {
        self.run_cancellable(definition, user_id, execution_id, CancellationHandle::default())
            .await
    }

    /// Like [`Self::run`] but accepts a [`CancellationHandle`] the caller
    /// can use to request cancellation from another task.
    pub async fn run_cancellable(
        &self,
        definition: &WorkflowDefinition,
        user_id: impl Into<String>,
        execution_id: ExecutionId,
        cancel: CancellationHandle,
    ) -> Result<WorkflowExecution, ExecutorError> {
        definition.validate()?;

        let now = Utc::now();
        let mut execution =
            WorkflowExecution::new(execution_id, definition.workflow_id.clone(), user_id, now);
        execution.transition(ExecutionStatus::Running, now);
        self.store.save(&execution).await;

        let by_id: HashMap<&str, &WorkflowStep> =
            definition.steps.iter().map(|s| (s.step_id.as_str(), s)).collect();
        let levels = topological_levels(&definition.steps);

        'levels: for (level_idx, level) in levels.iter().enumerate() {
            if cancel.is_cancelled() {
                break 'levels;
            }

            let mut ordered = level.clone();
            ordered.sort();

            let run_sequentially = matches!(definition.pattern, CoordinationPattern::Sequential)
                || (matches!(definition.pattern, CoordinationPattern::Hierarchical) && level_idx == 0);

            if run_sequentially {
                for step_id in &ordered {
                    if cancel.is_cancelled() {
                        break 'levels;
                    }
                    let step = by_id[step_id.as_str()];
                    execution.current_step = Some(step_id.clone());
                    self.store.save(&execution).await;
                    match self.run_step(step, &execution).await {
                        Ok(output) => {
                            execution.step_results.insert(step_id.clone(), output);
                        }
                        Err(e) => {
                            execution.error_message = Some(e.to_string());
                            execution.transition(ExecutionStatus::Failed, Utc::now());
                            self.store.save(&execution).await;
                            return Err(e);
                        }
                    }
                }
            } else {
                let results = self.run_level_parallel(&ordered, &by_id, &execution).await;
                for (step_id, result) in ordered.iter().zip(results) {
                    match result {
                        Ok(output) => {
                            execution.step_results.insert(step_id.clone(), output);
                        }
                        Err(e) => {
                            execution.error_message = Some(e.to_string());
                            execution.transition(ExecutionStatus::Failed, Utc::now());
                            self.store.save(&execution).await;
                            return Err(e);
                        }
                    }
                }
            }
            self.store.save(&execution).await;
        }

        let final_status = if cancel.is_cancelled() {
            ExecutionStatus::Cancelled
        } else {
            ExecutionStatus::Completed
        };
        execution.current_step = None;
        execution.transition(final_status, Utc::now());
        self.store.save(&execution).await;
        Ok(execution)
    }

    async fn run_level_parallel(
        &self,
        step_ids: &[String],
        by_id: &HashMap<&str, &WorkflowStep>,
        execution: &WorkflowExecution,
    ) -> Vec<Result<serde_json::Value, ExecutorError>> {
        let futures: Vec<_> = step_ids
            .iter()
            .map(|id| {
                let step = by_id[id.as_str()];
                self.run_step(step, execution)
            })
            .collect();
        futures::future::join_all(futures).await
    }

    async fn run_step(
        &self,
        step: &WorkflowStep,
        execution: &WorkflowExecution,
    ) -> Result<serde_json::Value, ExecutorError> {
        let inputs: HashMap<&str, &serde_json::Value> = step
            .inputs
            .iter()
            .filter_map(|id| execution.step_results.get(id).map(|v| (id.as_str(), v)))
            .collect();
        let input_payload = serde_json::to_value(&inputs).unwrap_or(serde_json::Value::Null);

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let mut operator_input =
                OperatorInput::new(Content::text(input_payload.to_string()), TriggerType::Task);
            operator_input.metadata = input_payload.clone();

            let dispatch = self.orch.dispatch(&step.agent_id, operator_input);
            let timeout = Duration::from_secs(step.timeout_seconds.max(1));

            match tokio::time::timeout(timeout, dispatch).await {
                Ok(Ok(output)) => {
                    info!(step = %step.step_id, attempt, "step completed");
                    return Ok(serde_json::to_value(&output).unwrap_or(serde_json::Value::Null));
                }
                Ok(Err(e)) => {
                    if attempt > step.retry_count {
                        return Err(ExecutorError::StepFailed {
                            step: step.step_id.clone(),
                            attempts: attempt,
                            source: e,
                        });
                    }
                    warn!(step = %step.step_id, attempt, error = %e, "step failed, retrying");
                }
                Err(_elapsed) => {
                    if attempt > step.retry_count {
                        return Err(ExecutorError::StepTimedOut(step.step_id.clone()));
                    }
                    warn!(step = %step.step_id, attempt, "step timed out, retrying");
                }
            }

            let backoff = Duration::from_millis(100u64.saturating_mul(2u64.saturating_pow(attempt)));
            tokio::time::sleep(backoff).await;
        }
    }
}

/// Group steps into dependency levels: level 0 has no inputs, level N's
/// steps depend only on steps in levels < N. Within a level, step order is
/// not yet sorted — callers sort by `step_id` for the ascending tie-break.
fn topological_levels(steps: &[WorkflowStep]) -> Vec<Vec<String>> {
    let mut remaining: HashMap<&str, &WorkflowStep> =
        steps.iter().map(|s| (s.step_id.as_str(), s)).collect();
    let mut done: HashSet<&str> = HashSet::new();
    let mut levels = Vec::new();

    while !remaining.is_empty() {
        let ready: Vec<&str> = remaining
            .iter()
            .filter(|(_, step)| step.inputs.iter().all(|i| done.contains(i.as_str())))
            .map(|(id, _)| *id)
            .collect();

        if ready.is_empty() {
            // Cycle or dangling reference should have been caught by
            // validate(); bail out with whatever remains as a final level
            // rather than looping forever.
            levels.push(remaining.keys().map(|s| s.to_string()).collect());
            break;
        }

        for id in &ready {
            remaining.remove(id);
            done.insert(id);
        }
        levels.push(ready.into_iter().map(|s| s.to_string()).collect());
    }

    levels
}
