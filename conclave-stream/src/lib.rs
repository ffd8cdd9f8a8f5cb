#![deny(missing_docs)]
//! Streaming engine: buffered, backpressured delivery of partial provider
//! output to clients.
//!
//! Operates one layer up from provider-side SSE parsing, at the
//! server-to-client delivery boundary. Reuses the workspace's
//! `tokio::mpsc` channel idiom and the `RwLock<HashMap<_>>` session
//! registry pattern used throughout.

mod config;
mod engine;
mod types;

pub use config::StreamConfig;
pub use engine::{StreamEngine, StreamError, StreamHandle, StreamProducer};
pub use types::{CloseReason, SessionStatus, StreamEvent, StreamSession};
