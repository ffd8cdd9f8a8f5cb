#![deny(missing_docs)]
//! Append-only cost ledger: one [`CostRecord`] per provider call,
//! folded into running per-conversation, per-session, per-day, and
//! per-provider totals as it's appended.
//!
//! `CostLedger` is the source of truth the circuit breaker (`conclave-breaker`)
//! consults for conversation/daily totals on every admission check. It also
//! holds each conversation's [`ConversationSession`] aggregate, opened and
//! closed by the orchestrator, with `total_cost`/`total_interactions` kept
//! in sync by `record` as matching records arrive.

mod ledger;
mod session;
mod types;

pub use ledger::CostLedger;
pub use session::{ConversationSession, ConversationStatus};
pub use types::CostRecord;
