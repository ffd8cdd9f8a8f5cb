#![deny(missing_docs)]
//! Shared toolkit for building operators that call out to an LLM provider.
//!
//! Key traits defined here:
//! - [`Provider`] — LLM provider interface (not object-safe, uses RPITIT)
//! - [`ContextStrategy`] — context window management
//!
//! `conclave-provider-anthropic`/`-openai`/`-ollama` implement [`Provider`];
//! the ReAct operator in `conclave-orchestrator` is generic over it.

pub mod config;
pub mod context;
pub mod convert;
pub mod provider;
pub mod types;

pub use config::TurnConfig;
pub use context::{ContextStrategy, NoCompaction};
pub use convert::{
    content_block_to_part, content_part_to_block, content_to_parts, content_to_user_message,
    parts_to_content,
};
pub use provider::{Provider, ProviderError};
pub use types::*;
