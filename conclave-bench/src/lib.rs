#![deny(missing_docs)]
//! Benchmark runner: executes fixed conversational scenarios against the
//! group-chat orchestrator and grades them against declarative success
//! criteria.
//!
//! Scenario replay and grading are separated: grading is a set of pure
//! functions over an aggregated outcome, so criteria can be unit-tested
//! without spinning up a conversation.

mod runner;
mod types;

pub use runner::{BenchError, BenchmarkRunner};
pub use types::{BenchReport, CategoryRollup, Scenario, ScenarioResult, SuccessCriteria};
