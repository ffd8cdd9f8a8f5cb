//! Wire types for the streaming engine.

use chrono::{DateTime, Utc};
use conclave_core::id::{AgentId, SessionId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a streaming session.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Open and able to receive/emit chunks.
    Active,
    /// Temporarily suspended (client backgrounded, no data expected).
    Paused,
    /// Closed normally.
    Completed,
    /// Closed due to an unrecoverable error.
    Error,
}

/// A streaming session's tracked state.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSession {
    /// Session identifier.
    pub session_id: SessionId,
    /// The human user this session serves.
    pub user_id: String,
    /// The agent currently speaking on this session.
    pub agent_id: AgentId,
    /// When the session was created.
    pub start_time: DateTime<Utc>,
    /// Last time a chunk, heartbeat, or status event was sent.
    pub last_activity: DateTime<Utc>,
    /// Total events emitted on this session.
    pub message_count: u64,
    /// Current lifecycle state.
    pub status: SessionStatus,
}

impl StreamSession {
    /// Start a new active session.
    pub fn new(session_id: SessionId, user_id: impl Into<String>, agent_id: AgentId, now: DateTime<Utc>) -> Self {
        Self {
            session_id,
            user_id: user_id.into(),
            agent_id,
            start_time: now,
            last_activity: now,
            message_count: 0,
            status: SessionStatus::Active,
        }
    }

    /// Whether `now` is past the idle ceiling.
    pub fn is_idle(&self, now: DateTime<Utc>, max_idle_minutes: u64) -> bool {
        (now - self.last_activity) > chrono::Duration::minutes(max_idle_minutes as i64)
    }
}

/// Events emitted to the client over the lifetime of a stream.
///
/// Chunk order per `(session, turn)` is preserved by construction — a
/// [`crate::StreamProducer`] is the only writer for its session and emits
/// strictly in call order.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Lifecycle marker (`session_created`, `session_closed`, heartbeat).
    Status {
        /// Monotonic id for at-least-once dedup on the client.
        chunk_id: u64,
        /// The marker name.
        detail: String,
    },
    /// Opaque pre-token signal that the model is working.
    Thinking {
        /// Monotonic id for at-least-once dedup on the client.
        chunk_id: u64,
    },
    /// A content chunk, at least one token and at most `chunk_byte_size`.
    Text {
        /// Monotonic id for at-least-once dedup on the client.
        chunk_id: u64,
        /// The chunk's text.
        text: String,
    },
    /// End-of-turn marker with aggregated metrics.
    Final {
        /// Monotonic id for at-least-once dedup on the client.
        chunk_id: u64,
        /// Input tokens consumed this turn.
        tokens_in: u64,
        /// Output tokens generated this turn.
        tokens_out: u64,
        /// This turn's cost.
        cost: Decimal,
        /// Wall-clock duration of this turn, in milliseconds.
        duration_ms: u64,
    },
    /// A typed failure. The conversation may continue or not, per the
    /// orchestrator's failure semantics.
    Error {
        /// Monotonic id for at-least-once dedup on the client.
        chunk_id: u64,
        /// Human-readable failure description.
        message: String,
        /// Whether the conversation may continue after this error.
        recoverable: bool,
    },
}

/// Why a session closed.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The turn/conversation finished normally.
    Normal,
    /// The client disconnected.
    ClientGone,
    /// The session was idle past `max_idle_minutes`.
    Idle,
    /// The process is shutting down.
    ServerShutdown,
}
