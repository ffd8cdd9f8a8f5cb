//! Persistence for breaker state, so a restart restores behavior within
//! the same day bucket.

use crate::types::BreakerStateKind;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// The subset of breaker state worth persisting across a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedBreakerState {
    /// State at the time of the snapshot.
    pub state: BreakerStateKind,
    /// When that state was entered.
    pub state_changed_at: DateTime<Utc>,
    /// Spike/probe failure count at the time of the snapshot.
    pub failures: u32,
    /// Recent call costs, for the spike-detection moving average.
    pub cost_history: Vec<Decimal>,
    /// The UTC day this snapshot belongs to. A snapshot from a prior day is
    /// not restored — the breaker starts fresh for the new day bucket.
    pub day: NaiveDate,
}

/// Storage backend for [`PersistedBreakerState`].
#[async_trait]
pub trait BreakerStore: Send + Sync {
    /// Load the last persisted snapshot, if any.
    async fn load(&self) -> Option<PersistedBreakerState>;
    /// Persist a snapshot, replacing whatever was stored before.
    async fn save(&self, state: &PersistedBreakerState);
}

/// In-memory breaker store. The only backend shipped in this workspace —
/// a durable backend is a drop-in `impl BreakerStore`, matching
/// `conclave-memory`'s in-memory-only `MemoryStore`.
#[derive(Default)]
pub struct InMemoryBreakerStore {
    slot: RwLock<Option<PersistedBreakerState>>,
}

impl InMemoryBreakerStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BreakerStore for InMemoryBreakerStore {
    async fn load(&self) -> Option<PersistedBreakerState> {
        self.slot.read().await.clone()
    }

    async fn save(&self, state: &PersistedBreakerState) {
        *self.slot.write().await = Some(state.clone());
    }
}

/// A store that always fails to load and silently drops saves — used to
/// exercise the "storage unavailable" failure path in tests.
#[derive(Default)]
pub struct UnavailableBreakerStore;

#[async_trait]
impl BreakerStore for UnavailableBreakerStore {
    async fn load(&self) -> Option<PersistedBreakerState> {
        None
    }

    async fn save(&self, _state: &PersistedBreakerState) {}
}
