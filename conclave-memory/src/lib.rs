#![deny(missing_docs)]
//! Typed memory store and RAG context assembly (C5, C6).
//!
//! `MemoryStore` keeps conversation/knowledge/preference/relationship
//! entries behind a `RwLock<HashMap<_>>`, the same interior-mutability
//! idiom `conclave-core`'s `StateStore` implementations use, generalized to
//! typed entries with embeddings and cosine-similarity search. `RagRetriever`
//! builds scored, deduplicated context blocks on top of a `MemoryStore`.

mod entry;
mod rag;
mod store;

pub use entry::{MemoryEntry, MemoryFilters, MemoryType};
pub use rag::{ContextBlock, RagConfig, RagRetriever};
pub use store::{MemoryError, MemoryStore};
