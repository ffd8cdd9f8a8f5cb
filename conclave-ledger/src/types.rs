//! The ledger's append-only unit: one provider call.

use chrono::{DateTime, Utc};
use conclave_core::id::{AgentId, ConversationId, SessionId};
use conclave_pricing::{calculate_cost, ProviderPricing};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One priced provider call. `total_cost` is always
/// `input_cost + output_cost + request_fee`, computed from the pricing row
/// active at `created_at` — [`CostRecord::priced`] is the only constructor
/// that can build one, so the invariant holds by construction.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRecord {
    /// Unique id of this record.
    pub id: String,
    /// Streaming/connection-lifetime session this call belongs to.
    pub session_id: SessionId,
    /// Logical conversation this call belongs to.
    pub conversation_id: ConversationId,
    /// Turn index within the conversation (`TurnMessage.turn_index`).
    pub turn_id: u64,
    /// Agent that made this call, if attributable to one.
    pub agent_id: Option<AgentId>,
    /// Provider name.
    pub provider: String,
    /// Model name.
    pub model: String,
    /// Input tokens consumed.
    pub input_tokens: u64,
    /// Output tokens produced.
    pub output_tokens: u64,
    /// Cost of the input tokens.
    pub input_cost: Decimal,
    /// Cost of the output tokens.
    pub output_cost: Decimal,
    /// Flat per-request fee, if the provider charges one.
    pub request_fee: Option<Decimal>,
    /// `input_cost + output_cost + request_fee`.
    pub total_cost: Decimal,
    /// When this record was created.
    pub created_at: DateTime<Utc>,
}

impl CostRecord {
    /// Price a call against `pricing` and build the resulting record.
    #[allow(clippy::too_many_arguments)]
    pub fn priced(
        id: impl Into<String>,
        session_id: SessionId,
        conversation_id: ConversationId,
        turn_id: u64,
        agent_id: Option<AgentId>,
        pricing: &ProviderPricing,
        input_tokens: u64,
        output_tokens: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        let breakdown = calculate_cost(pricing, input_tokens, output_tokens);
        Self {
            id: id.into(),
            session_id,
            conversation_id,
            turn_id,
            agent_id,
            provider: pricing.provider.clone(),
            model: pricing.model.clone(),
            input_tokens,
            output_tokens,
            input_cost: breakdown.input_cost,
            output_cost: breakdown.output_cost,
            request_fee: pricing.price_per_request,
            total_cost: breakdown.total_cost,
            created_at,
        }
    }
}
