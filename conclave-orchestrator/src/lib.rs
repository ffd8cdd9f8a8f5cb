#![deny(missing_docs)]
//! Group-chat orchestrator: runs one conversation end-to-end across a
//! multi-agent pool.
//!
//! Each turn assembles context, selects a speaker, checks cost admission,
//! calls the model, and records the outcome, looping until a termination
//! condition fires.

mod config;
mod orchestrator;
mod types;

pub use config::OrchestratorConfig;
pub use orchestrator::{GroupChatOrchestrator, OrchestratorError};
pub use types::{
    CostSummary, OrchestrateRequest, OrchestrationResult, OrchestrationTermination, TurnMessage,
};
