#![deny(missing_docs)]
//! Graph workflow executor: a validated DAG of steps dispatched against an
//! orchestrator under sequential, parallel, or hierarchical coordination.
//!
//! This crate is intentionally "boring glue": it helps assemble and run
//! systems built from the `conclave-core` protocols without forcing a
//! bespoke workflow DSL.
//!
//! Design goals:
//! - register arbitrary agents/operators behind an `Orchestrator`
//! - validate a workflow definition before any step runs
//! - pluggable effect execution policy (WriteMemory/Delegate/Handoff/Signal)
//! - zero lock-in: callers can bypass defaults and wire directly against
//!   `conclave-core`

mod definition;
mod execution;
mod executor;
mod kit;
mod runner;

pub use definition::{
    CoordinationPattern, StepType, ValidationError, WorkflowDefinition, WorkflowStep,
};
pub use execution::{ExecutionStatus, WorkflowExecution};
pub use executor::{
    CancellationHandle, ExecutionStore, ExecutorError, InMemoryExecutionStore, WorkflowExecutor,
};
pub use kit::Kit;
pub use runner::{
    EffectExecutor, ExecutionEvent, ExecutionTrace, KitError, LocalEffectExecutor,
    OrchestratedRunner,
};
