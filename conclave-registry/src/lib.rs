#![deny(missing_docs)]
//! Agent registry: the immutable catalogue of agent definitions for
//! one process, loaded fail-fast at startup.
//!
//! Grounded on `conclave-core::id::AgentId` plus the
//! `HashMap<String, Arc<dyn T>>` register/get/iter shape used for tool
//! registries elsewhere in this workspace, specialized to plain data
//! (`AgentDefinition` is not a trait object — there's nothing to dispatch,
//! only to look up).

mod registry;
mod types;

pub use registry::{Registry, RegistryError};
pub use types::{AgentDefinition, AgentTier};
