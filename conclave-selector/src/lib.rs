#![deny(missing_docs)]
//! Speaker selection and conversation termination.
//!
//! Built as a pure scoring function over `&[AgentDefinition]` plus a small
//! per-agent EMA/load tracker behind a `RwLock<HashMap<_>>`, the same
//! interior-mutability idiom `conclave-memory`'s store uses.

mod selector;
mod tracker;
mod types;

pub use selector::{check_termination, SpeakerSelector};
pub use tracker::SelectorTracker;
pub use types::{contains_completion_marker, SelectionContext, TerminationReason, COMPLETION_KEYWORDS};
