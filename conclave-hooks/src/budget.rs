//! A hook that halts an operator mid-turn when a budget check fails.
//!
//! Grounded on `conclave_core::hook`'s `ExitCheck`/`PreInference` hook points
//! plus the `BudgetEvent`/`BudgetDecision` lifecycle vocabulary — this hook
//! is the seam the circuit breaker and budget monitor use to gate
//! admission without the operator loop knowing anything about cost.

use async_trait::async_trait;
use conclave_core::error::HookError;
use conclave_core::hook::{Hook, HookAction, HookContext, HookPoint};
use std::sync::Arc;

/// A check run at hook time to decide whether a turn may proceed.
/// Implemented by the breaker/budget components; kept as a trait here so
/// this crate has no dependency on `conclave-breaker`.
#[async_trait]
pub trait AdmissionCheck: Send + Sync {
    /// Return `Some(reason)` to halt, `None` to allow the turn to continue.
    async fn check(&self, ctx: &HookContext) -> Option<String>;
}

/// Hook that consults an [`AdmissionCheck`] at [`HookPoint::PreInference`]
/// and [`HookPoint::ExitCheck`], halting with the check's reason if it
/// rejects.
pub struct BudgetHook {
    check: Arc<dyn AdmissionCheck>,
}

impl BudgetHook {
    /// Wrap an admission check as a hook.
    pub fn new(check: Arc<dyn AdmissionCheck>) -> Self {
        Self { check }
    }
}

#[async_trait]
impl Hook for BudgetHook {
    fn points(&self) -> &[HookPoint] {
        &[HookPoint::PreInference, HookPoint::ExitCheck]
    }

    async fn on_event(&self, ctx: &HookContext) -> Result<HookAction, HookError> {
        match self.check.check(ctx).await {
            Some(reason) => Ok(HookAction::Halt { reason }),
            None => Ok(HookAction::Continue),
        }
    }
}
