//! Bridges [`CostCircuitBreaker`] state into the hook pipeline.
//!
//! `conclave-hooks` keeps [`conclave_hooks::AdmissionCheck`] free of any
//! dependency on this crate's pricing/ledger-aware admission logic — the
//! orchestrator's own `estimate_and_admit` call remains the source of truth
//! for per-call admission. This check only reflects whether the breaker is
//! currently open, so any hook-dispatching caller sees the same trip state
//! the orchestrator already enforces directly.

use crate::breaker::CostCircuitBreaker;
use crate::types::BreakerStateKind;
use async_trait::async_trait;
use conclave_core::hook::HookContext;
use conclave_hooks::AdmissionCheck;
use std::sync::Arc;

/// [`AdmissionCheck`] backed by a [`CostCircuitBreaker`]'s current state.
pub struct BreakerAdmissionCheck {
    breaker: Arc<CostCircuitBreaker>,
}

impl BreakerAdmissionCheck {
    /// Wrap a breaker for hook-pipeline consultation.
    pub fn new(breaker: Arc<CostCircuitBreaker>) -> Self {
        Self { breaker }
    }
}

#[async_trait]
impl AdmissionCheck for BreakerAdmissionCheck {
    async fn check(&self, _ctx: &HookContext) -> Option<String> {
        if self.breaker.snapshot().await.state == BreakerStateKind::Open {
            Some("circuit breaker open".to_string())
        } else {
            None
        }
    }
}
