#![deny(missing_docs)]
//! Cost circuit breaker and budget monitor (C3 + C4).
//!
//! [`CostCircuitBreaker`] gates every about-to-happen provider call against
//! the closed/open/half-open state machine, consulting [`conclave_ledger::CostLedger`]
//! for conversation/daily totals. [`BudgetMonitor`] runs independently on a
//! timer, sweeping the ledger for alerts and spend projections and tripping
//! the breaker when utilization crosses the critical threshold.
//!
//! [`BreakerAdmissionCheck`] exposes the breaker's open/closed state to the
//! hook pipeline, so a `BudgetHook` registered there reflects the same trip
//! state the orchestrator enforces directly on every call.

mod breaker;
mod config;
mod hook_check;
mod monitor;
mod store;
mod types;

pub use breaker::CostCircuitBreaker;
pub use config::BreakerConfig;
pub use hook_check::BreakerAdmissionCheck;
pub use monitor::{BudgetMonitor, BudgetReport, SessionAnomaly, SpendingPrediction};
pub use store::{BreakerStore, InMemoryBreakerStore, PersistedBreakerState, UnavailableBreakerStore};
pub use types::{AdmitDecision, BreakerStateKind, BudgetLevel, CircuitBreakerState, RejectReason};
