//! Conversation-level aggregate: totals and status across every call in
//! one logical conversation.

use chrono::{DateTime, Utc};
use conclave_core::id::{ConversationId, SessionId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Where a [`ConversationSession`] sits in its lifecycle.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    /// Still accepting turns.
    Active,
    /// Ended normally (completion marker or max turns).
    Completed,
    /// Ended without producing a result (no candidate speaker, provider
    /// failure).
    Aborted,
    /// Ended because the circuit breaker blocked or was open.
    CircuitBlocked,
}

/// Aggregate of calls in one logical conversation.
///
/// `total_cost` and `total_interactions` are folded in by
/// [`crate::CostLedger::record`] as each [`crate::CostRecord`] for this
/// session is appended, so `total_cost = Σ CostRecord.total_cost` holds by
/// construction rather than by a separate reconciliation pass.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    /// Streaming/connection-lifetime session id this aggregate tracks.
    pub session_id: SessionId,
    /// Logical conversation id.
    pub conversation_id: ConversationId,
    /// The human user driving the conversation.
    pub user_id: String,
    /// When the session was opened.
    pub started_at: DateTime<Utc>,
    /// When the session was closed, `None` while `status == Active`.
    pub ended_at: Option<DateTime<Utc>>,
    /// Running sum of every recorded call's `total_cost`.
    pub total_cost: Decimal,
    /// Number of calls recorded against this session.
    pub total_interactions: u64,
    /// Current lifecycle status.
    pub status: ConversationStatus,
}

impl ConversationSession {
    /// Open a new session at `started_at`, with zeroed totals.
    pub fn open(
        session_id: SessionId,
        conversation_id: ConversationId,
        user_id: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            conversation_id,
            user_id: user_id.into(),
            started_at,
            ended_at: None,
            total_cost: Decimal::ZERO,
            total_interactions: 0,
            status: ConversationStatus::Active,
        }
    }
}
