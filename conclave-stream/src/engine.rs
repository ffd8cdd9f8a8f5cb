//! Session registry and buffered, backpressured chunk delivery.

use crate::config::StreamConfig;
use crate::types::{CloseReason, SessionStatus, StreamEvent, StreamSession};
use chrono::Utc;
use conclave_core::id::{AgentId, SessionId};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

/// Errors raised while producing or managing a stream.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StreamError {
    /// The session was not found in the engine's registry.
    #[error("unknown session {0}")]
    UnknownSession(String),
    /// The client's receiver was dropped (client gone).
    #[error("client disconnected")]
    ClientGone,
}

/// Emits [`StreamEvent`]s for one session, applying chunk splitting,
/// window-based adaptive delay, and at-least-once `chunk_id` sequencing.
///
/// One producer per session — there is exactly one logical writer, matching
/// the "one producer, fan-out not required" concurrency contract.
pub struct StreamProducer {
    session_id: SessionId,
    sender: mpsc::Sender<StreamEvent>,
    config: StreamConfig,
    next_chunk_id: AtomicU64,
    outstanding: AtomicU64,
    current_delay: tokio::sync::Mutex<std::time::Duration>,
}

impl StreamProducer {
    fn new(session_id: SessionId, sender: mpsc::Sender<StreamEvent>, config: StreamConfig) -> Self {
        let chunk_delay = config.chunk_delay;
        Self {
            session_id,
            sender,
            config,
            next_chunk_id: AtomicU64::new(0),
            outstanding: AtomicU64::new(0),
            current_delay: tokio::sync::Mutex::new(chunk_delay),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_chunk_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn send(&self, event: StreamEvent) -> Result<(), StreamError> {
        self.sender.send(event).await.map_err(|_| StreamError::ClientGone)
    }

    /// Emit a `status` lifecycle marker.
    pub async fn send_status(&self, detail: impl Into<String>) -> Result<(), StreamError> {
        self.send(StreamEvent::Status {
            chunk_id: self.next_id(),
            detail: detail.into(),
        })
        .await
    }

    /// Emit an opaque `thinking` signal.
    pub async fn send_thinking(&self) -> Result<(), StreamError> {
        self.send(StreamEvent::Thinking { chunk_id: self.next_id() }).await
    }

    /// Emit `text`, split into at most `chunk_byte_size`-byte pieces on
    /// char boundaries, applying the window-based adaptive delay between
    /// pieces.
    pub async fn send_text(&self, text: &str) -> Result<(), StreamError> {
        for piece in split_on_char_boundary(text, self.config.chunk_byte_size) {
            self.apply_backpressure().await;
            self.send(StreamEvent::Text {
                chunk_id: self.next_id(),
                text: piece.to_string(),
            })
            .await?;
            self.outstanding.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Emit the end-of-turn `final` marker, resetting the outstanding-chunk
    /// window and adaptive delay for the next turn.
    pub async fn send_final(
        &self,
        tokens_in: u64,
        tokens_out: u64,
        cost: Decimal,
        duration_ms: u64,
    ) -> Result<(), StreamError> {
        self.outstanding.store(0, Ordering::SeqCst);
        *self.current_delay.lock().await = self.config.chunk_delay;
        self.send(StreamEvent::Final {
            chunk_id: self.next_id(),
            tokens_in,
            tokens_out,
            cost,
            duration_ms,
        })
        .await
    }

    /// Emit a typed `error` event.
    pub async fn send_error(&self, message: impl Into<String>, recoverable: bool) -> Result<(), StreamError> {
        self.send(StreamEvent::Error {
            chunk_id: self.next_id(),
            message: message.into(),
            recoverable,
        })
        .await
    }

    /// The session this producer writes to.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Awaits the adaptive delay when the outstanding-chunk window is
    /// exceeded, doubling the delay up to `max_chunk_delay`; otherwise
    /// halves it back toward the configured floor.
    async fn apply_backpressure(&self) {
        let mut delay = self.current_delay.lock().await;
        if self.outstanding.load(Ordering::SeqCst) as usize >= self.config.window_size {
            let next = (*delay * 2).min(self.config.max_chunk_delay);
            debug!(session_id = self.session_id.as_str(), delay_ms = next.as_millis() as u64, "backpressure: widening chunk delay");
            tokio::time::sleep(*delay).await;
            *delay = next;
        } else {
            *delay = std::cmp::max(*delay / 2, self.config.chunk_delay);
        }
    }
}

/// Helper for splitting text for chunk splitting and byte-size enforcement
/// in the char-boundary-safe piece.
fn split_on_char_boundary(text: &str, max_bytes: usize) -> Vec<&str> {
    if max_bytes == 0 || text.is_empty() {
        return vec![text];
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + max_bytes).min(text.len());
        while end < text.len() && !text.is_char_boundary(end) {
            end -= 1;
        }
        pieces.push(&text[start..end]);
        start = end;
    }
    pieces
}

/// A receiver handle plus the producer writing into it, returned by
/// [`StreamEngine::open_session`].
pub struct StreamHandle {
    /// Writes events into `receiver`.
    pub producer: Arc<StreamProducer>,
    /// What the transport layer forwards to the client.
    pub receiver: mpsc::Receiver<StreamEvent>,
}

/// Registry of active streaming sessions, grounded on the same
/// `RwLock<HashMap<_>>` idiom used by every other in-memory store in this
/// workspace.
#[derive(Default)]
pub struct StreamEngine {
    sessions: RwLock<HashMap<String, StreamSession>>,
    config: StreamConfig,
}

impl StreamEngine {
    /// Build an engine with the given configuration.
    pub fn new(config: StreamConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Open a new session, registering it and returning a producer/receiver
    /// pair. The channel is bounded by `max_buffer_size / chunk_byte_size`
    /// messages — an approximation of the byte-budget contract, since
    /// `mpsc` bounds by message count, not payload size.
    pub async fn open_session(
        &self,
        session_id: SessionId,
        user_id: impl Into<String>,
        agent_id: AgentId,
    ) -> StreamHandle {
        let now = Utc::now();
        let session = StreamSession::new(session_id.clone(), user_id, agent_id, now);
        self.sessions.write().await.insert(session_id.as_str().to_string(), session);

        let capacity = (self.config.max_buffer_size / self.config.chunk_byte_size.max(1)).max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let producer = Arc::new(StreamProducer::new(session_id, tx, self.config.clone()));
        StreamHandle { producer, receiver: rx }
    }

    /// Record that a session produced activity, bumping `message_count` and
    /// `last_activity`.
    pub async fn touch(&self, session_id: &SessionId) {
        if let Some(session) = self.sessions.write().await.get_mut(session_id.as_str()) {
            session.last_activity = Utc::now();
            session.message_count += 1;
        }
    }

    /// Close a session with the given reason, marking it `completed` or
    /// `error` in the registry.
    pub async fn close_session(&self, session_id: &SessionId, reason: CloseReason) -> Result<(), StreamError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id.as_str())
            .ok_or_else(|| StreamError::UnknownSession(session_id.as_str().to_string()))?;
        session.status = match reason {
            CloseReason::Normal | CloseReason::ClientGone | CloseReason::Idle | CloseReason::ServerShutdown => {
                SessionStatus::Completed
            }
        };
        debug!(session_id = session_id.as_str(), ?reason, "stream session closed");
        Ok(())
    }

    /// Current snapshot of a session, if it exists.
    pub async fn session(&self, session_id: &SessionId) -> Option<StreamSession> {
        self.sessions.read().await.get(session_id.as_str()).cloned()
    }

    /// Whether a heartbeat keep-alive is due for this session, given the
    /// configured `heartbeat_interval`.
    pub async fn heartbeat_due(&self, session_id: &SessionId) -> bool {
        let now = Utc::now();
        self.sessions
            .read()
            .await
            .get(session_id.as_str())
            .map(|s| {
                let interval = chrono::Duration::from_std(self.config.heartbeat_interval)
                    .unwrap_or(chrono::Duration::max_value());
                (now - s.last_activity) >= interval
            })
            .unwrap_or(false)
    }

    /// Sweep all active sessions, closing any idle past `max_idle_minutes`.
    /// Returns the closed session ids.
    pub async fn sweep_idle(&self) -> Vec<SessionId> {
        let now = Utc::now();
        let mut closed = Vec::new();
        let mut sessions = self.sessions.write().await;
        for session in sessions.values_mut() {
            if session.status == SessionStatus::Active && session.is_idle(now, self.config.max_idle_minutes) {
                session.status = SessionStatus::Completed;
                closed.push(session.session_id.clone());
            }
        }
        if !closed.is_empty() {
            debug!(count = closed.len(), "sweep_idle closed stale sessions");
        }
        closed
    }

    /// Mark every still-active session `error` with `server_shutdown`,
    /// per the process-wide `shutdown()` contract.
    pub async fn shutdown(&self) {
        let mut sessions = self.sessions.write().await;
        let mut marked = 0;
        for session in sessions.values_mut() {
            if session.status == SessionStatus::Active {
                session.status = SessionStatus::Error;
                marked += 1;
            }
        }
        if marked > 0 {
            warn!(count = marked, "stream engine shutdown: marking active sessions errored");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_session_registers_it_active() {
        let engine = StreamEngine::new(StreamConfig::default());
        let sid = SessionId::new("s1");
        let handle = engine.open_session(sid.clone(), "user", AgentId::new("agent")).await;
        let session = engine.session(&sid).await.unwrap();
        assert_eq!(session.status, SessionStatus::Active);
        drop(handle);
    }

    #[tokio::test]
    async fn text_splits_into_byte_bounded_chunks() {
        let mut config = StreamConfig::default();
        config.chunk_byte_size = 4;
        let engine = StreamEngine::new(config);
        let sid = SessionId::new("s1");
        let mut handle = engine.open_session(sid, "user", AgentId::new("agent")).await;
        handle.producer.send_text("hello world").await.unwrap();
        drop(handle.producer);

        let mut total = String::new();
        while let Some(event) = handle.receiver.recv().await {
            if let StreamEvent::Text { text, .. } = event {
                assert!(text.len() <= 4);
                total.push_str(&text);
            }
        }
        assert_eq!(total, "hello world");
    }

    #[tokio::test]
    async fn close_unknown_session_errors() {
        let engine = StreamEngine::new(StreamConfig::default());
        let sid = SessionId::new("ghost");
        let err = engine.close_session(&sid, CloseReason::Normal).await.unwrap_err();
        assert!(matches!(err, StreamError::UnknownSession(_)));
    }

    #[tokio::test]
    async fn sweep_idle_closes_stale_sessions() {
        let mut config = StreamConfig::default();
        config.max_idle_minutes = 0;
        let engine = StreamEngine::new(config);
        let sid = SessionId::new("s1");
        let _handle = engine.open_session(sid.clone(), "user", AgentId::new("agent")).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let closed = engine.sweep_idle().await;
        assert_eq!(closed, vec![sid]);
    }

    #[tokio::test]
    async fn shutdown_marks_active_sessions_error() {
        let engine = StreamEngine::new(StreamConfig::default());
        let sid = SessionId::new("s1");
        let _handle = engine.open_session(sid.clone(), "user", AgentId::new("agent")).await;
        engine.shutdown().await;
        assert_eq!(engine.session(&sid).await.unwrap().status, SessionStatus::Error);
    }
}
