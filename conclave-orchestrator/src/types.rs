//! Request/result types for [`crate::GroupChatOrchestrator::orchestrate`].

use chrono::{DateTime, Utc};
use conclave_core::id::{AgentId, ConversationId};
use conclave_turn::Role;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single turn's request to start or continue a conversation.
#[derive(Debug, Clone)]
pub struct OrchestrateRequest {
    /// Free-text message that triggers this conversation.
    pub message: String,
    /// The human user driving this conversation.
    pub user_id: String,
    /// Logical conversation id; new for a fresh conversation, reused to
    /// continue one (governs the conversation-level budget/rate scope).
    pub conversation_id: ConversationId,
    /// Optional prior context to prepend before `message`.
    pub context: Option<String>,
    /// Restrict speaker selection to this one agent for every turn.
    pub pinned_agent: Option<AgentId>,
}

impl OrchestrateRequest {
    /// Build a request with only the required fields.
    pub fn new(message: impl Into<String>, user_id: impl Into<String>, conversation_id: ConversationId) -> Self {
        Self {
            message: message.into(),
            user_id: user_id.into(),
            conversation_id,
            context: None,
            pinned_agent: None,
        }
    }
}

/// One entry in the conversation transcript.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnMessage {
    /// Zero-based position in the conversation.
    pub turn_index: u32,
    /// The speaker, `None` for the initiating human turn.
    pub agent_id: Option<AgentId>,
    /// Speaker role.
    pub role: Role,
    /// The turn's text content.
    pub content: String,
    /// Input tokens this turn consumed (0 for the human turn).
    pub tokens_in: u64,
    /// Output tokens this turn produced (0 for the human turn).
    pub tokens_out: u64,
    /// This turn's cost (zero for the human turn).
    pub cost: Decimal,
    /// When this turn was recorded.
    pub created_at: DateTime<Utc>,
}

/// Aggregated token/cost totals across a conversation.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CostSummary {
    /// Total input tokens across every turn.
    pub input_tokens: u64,
    /// Total output tokens across every turn.
    pub output_tokens: u64,
    /// Total cost across every turn.
    pub total_cost: Decimal,
}

/// Why `orchestrate` stopped producing turns.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationTermination {
    /// A selector rule (max turns, completion marker) ended the
    /// conversation normally.
    Complete,
    /// `max_turns` was reached.
    MaxTurns,
    /// No candidate speaker scored above zero.
    NoSpeaker,
    /// The circuit breaker rejected an about-to-happen call.
    CostBlocked,
    /// The circuit breaker was (or became) open mid-conversation.
    CircuitOpen,
    /// The provider failed twice in a row (one retry exhausted).
    ProviderError,
    /// A registered hook halted the turn (e.g. a budget admission check).
    HookHalted,
}

/// The result of running a conversation end-to-end.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationResult {
    /// The final assembled text (last agent turn's content, or empty if no
    /// turn completed).
    pub response: String,
    /// Agents that spoke, in speaking order (may repeat).
    pub agents_used: Vec<AgentId>,
    /// Number of turns that ran.
    pub turn_count: u32,
    /// Token/cost totals across the conversation.
    pub cost_breakdown: CostSummary,
    /// Wall-clock duration of the whole conversation.
    pub duration_ms: u64,
    /// Why the conversation stopped.
    pub termination_reason: OrchestrationTermination,
    /// The full transcript, in speaking order.
    pub transcript: Vec<TurnMessage>,
}
