//! Error types for each protocol.

use thiserror::Error;

/// Operator execution errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum OperatorError {
    /// An error from the model/LLM provider.
    #[error("model error: {0}")]
    Model(String),

    /// An error during tool execution.
    #[error("tool error in {tool}: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Error message.
        message: String,
    },

    /// Context assembly failed before the model call.
    #[error("context assembly failed: {0}")]
    ContextAssembly(String),

    /// The operator failed but retrying might succeed.
    /// The orchestrator's retry policy decides.
    #[error("retryable: {0}")]
    Retryable(String),

    /// The operator failed and retrying won't help.
    /// Budget exceeded, invalid input, safety refusal.
    #[error("non-retryable: {0}")]
    NonRetryable(String),

    /// Catch-all. Include context.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Orchestration errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum OrchError {
    /// The requested agent was not found.
    #[error("agent not found: {0}")]
    AgentNotFound(String),

    /// The requested workflow was not found.
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    /// Dispatching a turn failed.
    #[error("dispatch failed: {0}")]
    DispatchFailed(String),

    /// Signal delivery failed.
    #[error("signal delivery failed: {0}")]
    SignalFailed(String),

    /// An operator error propagated through orchestration.
    #[error("operator error: {0}")]
    OperatorError(#[from] OperatorError),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// State errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StateError {
    /// Key not found in the given scope.
    #[error("not found: {scope}/{key}")]
    NotFound {
        /// The scope that was searched.
        scope: String,
        /// The key that was not found.
        key: String,
    },

    /// A write operation failed.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Hook errors. These are logged but do NOT halt the operator
/// (use HookAction::Halt to halt).
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum HookError {
    /// The hook execution failed.
    #[error("hook failed: {0}")]
    Failed(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// The error taxonomy surfaced to callers at the orchestrator, workflow,
/// and streaming boundaries. Inner components keep their own typed errors
/// ([`OperatorError`], [`OrchError`], [`StateError`], [`HookError`]) and
/// translate into this enum only at the edge — callers never see a raw
/// component error.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConclaveError {
    /// Rejected by policy: budget exhausted, circuit open, rate limited.
    #[error("policy: {0}")]
    Policy(String),

    /// A provider failure that may succeed on retry (timeout, 429, 5xx).
    #[error("provider transient error: {0}")]
    ProviderTransient(String),

    /// A provider failure that will not succeed on retry (auth, 4xx other
    /// than rate limit, malformed request).
    #[error("provider permanent error: {0}")]
    ProviderPermanent(String),

    /// No pricing row exists for the requested provider/model.
    #[error("pricing unknown for {provider}/{model}")]
    PricingUnknown {
        /// Provider name.
        provider: String,
        /// Model name.
        model: String,
    },

    /// The backing state/memory store is unavailable.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// An unexpected internal error. Never exposed with implementation
    /// detail to external callers beyond this message.
    #[error("internal error: {0}")]
    Internal(String),

    /// The operation was cancelled (session closed, workflow aborted).
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl From<OperatorError> for ConclaveError {
    fn from(e: OperatorError) -> Self {
        match e {
            OperatorError::Retryable(msg) => ConclaveError::ProviderTransient(msg),
            OperatorError::NonRetryable(msg) => ConclaveError::ProviderPermanent(msg),
            OperatorError::Model(msg) => ConclaveError::ProviderPermanent(msg),
            OperatorError::Tool { tool, message } => {
                ConclaveError::Internal(format!("tool error in {tool}: {message}"))
            }
            OperatorError::ContextAssembly(msg) => ConclaveError::Internal(msg),
            OperatorError::Other(err) => ConclaveError::Internal(err.to_string()),
            _ => ConclaveError::Internal(e.to_string()),
        }
    }
}

impl From<OrchError> for ConclaveError {
    fn from(e: OrchError) -> Self {
        match e {
            OrchError::AgentNotFound(id) => ConclaveError::Policy(format!("agent not found: {id}")),
            OrchError::WorkflowNotFound(id) => {
                ConclaveError::Policy(format!("workflow not found: {id}"))
            }
            OrchError::OperatorError(inner) => inner.into(),
            other => ConclaveError::Internal(other.to_string()),
        }
    }
}

impl From<StateError> for ConclaveError {
    fn from(e: StateError) -> Self {
        ConclaveError::StoreUnavailable(e.to_string())
    }
}
