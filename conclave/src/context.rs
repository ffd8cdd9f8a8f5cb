//! Composition root: builds every component once at process start and
//! wires dependencies one way, per the "no hidden singletons" redesign
//! rule — gives a
//! single import/assembly surface over feature-gated implementations.

use conclave_breaker::{BreakerAdmissionCheck, BreakerConfig, BudgetMonitor, CostCircuitBreaker, InMemoryBreakerStore};
use conclave_hooks::{BudgetHook, HookRegistry};
use conclave_ledger::CostLedger;
use conclave_memory::{MemoryStore, RagConfig, RagRetriever};
use conclave_orchestrator::{GroupChatOrchestrator, OrchestratorConfig};
use conclave_pricing::PricingTable;
use conclave_registry::{AgentDefinition, Registry, RegistryError};
use conclave_selector::SelectorTracker;
use conclave_stream::{StreamConfig, StreamEngine};
use thiserror::Error;

use crate::provider::AnyProvider;

/// Errors raised while assembling an [`AppContext`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ContextError {
    /// The supplied agent definitions failed to load into a [`Registry`].
    #[error("agent registry failed to load: {0}")]
    Registry(#[from] RegistryError),
}

/// Everything needed to build an [`AppContext`].
pub struct ConclaveConfig {
    /// Agent catalogue loaded at startup.
    pub agents: Vec<AgentDefinition>,
    /// Circuit breaker / budget monitor limits.
    pub breaker_config: BreakerConfig,
    /// Orchestrator turn/provider defaults.
    pub orchestrator_config: OrchestratorConfig,
    /// Streaming engine buffer/backpressure settings.
    pub stream_config: StreamConfig,
    /// Enable the memory store + RAG retriever. When `false`,
    /// `AppContext::rag` is `None` and turns run with no retrieved
    /// context, per spec's "memory unavailable degrades silently" rule.
    pub enable_memory: bool,
    /// The provider backend this process talks to.
    pub provider: AnyProvider,
}

/// The process-wide composition root.
///
/// Dependency direction is one-way: `Registry` and `SelectorTracker` feed
/// the `Orchestrator`; `CostLedger` and `CostCircuitBreaker` feed the
/// `Orchestrator`. Nothing here is a global/static — every caller builds
/// and holds its own `AppContext`.
pub struct AppContext {
    /// Agent catalogue.
    pub registry: std::sync::Arc<Registry>,
    /// Active pricing rows per (provider, model).
    pub pricing: std::sync::Arc<PricingTable>,
    /// Append-only record of every provider call's cost.
    pub ledger: std::sync::Arc<CostLedger>,
    /// Per-turn admission and open/closed/half-open state.
    pub breaker: std::sync::Arc<CostCircuitBreaker>,
    /// Periodic spend/anomaly reporting over the same ledger/breaker.
    pub budget_monitor: std::sync::Arc<BudgetMonitor>,
    /// Speaker-selection scoring state (EMA success/load/coordination).
    pub tracker: std::sync::Arc<SelectorTracker>,
    /// Retrieval-augmented context assembly, if memory is enabled.
    pub rag: Option<std::sync::Arc<RagRetriever>>,
    /// Cross-cutting hook pipeline (pre/post-inference, tool-call, etc).
    pub hooks: std::sync::Arc<HookRegistry>,
    /// Per-session chunk fan-out and backpressure.
    pub stream_engine: std::sync::Arc<StreamEngine>,
    /// Runs one conversation end-to-end across the agent pool.
    pub orchestrator: std::sync::Arc<GroupChatOrchestrator<AnyProvider>>,
}

impl AppContext {
    /// Build every component from `config` and wire them together. Fails
    /// only if the agent catalogue itself is malformed — every other
    /// component starts from an empty/default state.
    pub async fn init(config: ConclaveConfig) -> Result<Self, ContextError> {
        let registry = std::sync::Arc::new(Registry::load(config.agents)?);
        let pricing = std::sync::Arc::new(PricingTable::new());
        let ledger = std::sync::Arc::new(CostLedger::new());
        let breaker = std::sync::Arc::new(
            CostCircuitBreaker::init(
                config.breaker_config.clone(),
                ledger.clone(),
                std::sync::Arc::new(InMemoryBreakerStore::new()),
            )
            .await,
        );
        let budget_monitor = std::sync::Arc::new(BudgetMonitor::new(
            config.breaker_config,
            ledger.clone(),
            breaker.clone(),
        ));
        let tracker = std::sync::Arc::new(SelectorTracker::new());
        let mut hook_registry = HookRegistry::new();
        hook_registry.add(std::sync::Arc::new(BudgetHook::new(std::sync::Arc::new(BreakerAdmissionCheck::new(
            breaker.clone(),
        )))));
        let hooks = std::sync::Arc::new(hook_registry);
        let stream_engine = std::sync::Arc::new(StreamEngine::new(config.stream_config));

        let rag = if config.enable_memory {
            let store = std::sync::Arc::new(MemoryStore::new());
            Some(std::sync::Arc::new(RagRetriever::new(store, RagConfig::default())))
        } else {
            None
        };

        let orchestrator = std::sync::Arc::new(GroupChatOrchestrator::new(
            registry.clone(),
            tracker.clone(),
            breaker.clone(),
            ledger.clone(),
            pricing.clone(),
            rag.clone(),
            hooks.clone(),
            config.provider,
            config.orchestrator_config,
        ));

        Ok(Self {
            registry,
            pricing,
            ledger,
            breaker,
            budget_monitor,
            tracker,
            rag,
            hooks,
            stream_engine,
            orchestrator,
        })
    }

    /// Drain active streams and mark open sessions aborted with reason
    /// `server_shutdown`.
    pub async fn shutdown(&self) {
        self.stream_engine.shutdown().await;
    }
}
