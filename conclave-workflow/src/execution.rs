//! `WorkflowExecution` — one run of a [`crate::WorkflowDefinition`].

use chrono::{DateTime, Utc};
use conclave_core::id::{ExecutionId, WorkflowId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where a [`WorkflowExecution`] currently stands. Terminal statuses are
/// monotone: once `completed`, `failed`, or `cancelled`, no further
/// transitions occur.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Accepted but not yet started.
    Pending,
    /// Steps are actively being dispatched.
    Running,
    /// Every step reachable from the exit conditions completed.
    Completed,
    /// A step exhausted its retries, or validation failed before start.
    Failed,
    /// `cancel()` was called; in-flight steps finished, no new steps started.
    Cancelled,
}

impl ExecutionStatus {
    /// Whether this status is terminal (no further transitions permitted).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

/// State of one run of a workflow, persisted at each transition.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// Unique id of this run.
    pub execution_id: ExecutionId,
    /// The workflow this run executes.
    pub workflow_id: WorkflowId,
    /// Current lifecycle status.
    pub status: ExecutionStatus,
    /// The step currently dispatched, if any (meaningful mainly under
    /// `sequential`; under `parallel`/`hierarchical` this is the most
    /// recently started step of the current level).
    pub current_step: Option<String>,
    /// Structured output recorded per completed step.
    pub step_results: HashMap<String, serde_json::Value>,
    /// When the run started.
    pub start_time: DateTime<Utc>,
    /// When the run reached a terminal status.
    pub end_time: Option<DateTime<Utc>>,
    /// Populated when `status == Failed`.
    pub error_message: Option<String>,
    /// The user on whose behalf this run executes.
    pub user_id: String,
}

impl WorkflowExecution {
    /// Start a new, `Pending` execution record.
    pub fn new(
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
        user_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            execution_id,
            workflow_id,
            status: ExecutionStatus::Pending,
            current_step: None,
            step_results: HashMap::new(),
            start_time: now,
            end_time: None,
            error_message: None,
            user_id: user_id.into(),
        }
    }

    /// Transition to a new status, refusing to leave a terminal state.
    /// Returns `false` (no-op) if already terminal.
    pub fn transition(&mut self, status: ExecutionStatus, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        if status.is_terminal() {
            self.end_time = Some(now);
        }
        true
    }
}
