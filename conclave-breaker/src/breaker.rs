//! Per-turn admission and the closed/open/half-open state machine.

use crate::config::BreakerConfig;
use crate::store::{BreakerStore, PersistedBreakerState};
use crate::types::{AdmitDecision, BreakerStateKind, BudgetLevel, CircuitBreakerState, RejectReason};
use chrono::{DateTime, Utc};
use conclave_ledger::CostLedger;
use conclave_pricing::{calculate_cost, PricingTable};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

struct Internal {
    state: BreakerStateKind,
    state_changed_at: DateTime<Utc>,
    failures: u32,
    half_open_successes: u32,
    half_open_probes: u32,
    cost_history: VecDeque<Decimal>,
    turn_timestamps: VecDeque<DateTime<Utc>>,
    conversation_starts: VecDeque<(DateTime<Utc>, String)>,
    level_last_emitted: HashMap<BudgetLevel, DateTime<Utc>>,
}

impl Internal {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            state: BreakerStateKind::Closed,
            state_changed_at: now,
            failures: 0,
            half_open_successes: 0,
            half_open_probes: 0,
            cost_history: VecDeque::new(),
            turn_timestamps: VecDeque::new(),
            conversation_starts: VecDeque::new(),
            level_last_emitted: HashMap::new(),
        }
    }
}

/// Cost circuit breaker: admits or rejects every about-to-happen provider
/// call and drives the closed/open/half-open state machine.
///
/// Consults [`CostLedger`] for conversation/daily totals — the ledger's
/// aggregates are the source of truth, per spec's "caller records the
/// actual `CostRecord`; the ledger's aggregates govern subsequent checks".
pub struct CostCircuitBreaker {
    config: BreakerConfig,
    ledger: Arc<CostLedger>,
    store: Arc<dyn BreakerStore>,
    inner: RwLock<Internal>,
}

impl CostCircuitBreaker {
    /// Construct a breaker, restoring persisted state from `store` if it
    /// belongs to the current UTC day. A stale or unavailable snapshot
    /// starts the breaker fresh and `closed`.
    pub async fn init(
        config: BreakerConfig,
        ledger: Arc<CostLedger>,
        store: Arc<dyn BreakerStore>,
    ) -> Self {
        let now = Utc::now();
        let mut internal = Internal::fresh(now);
        if let Some(persisted) = store.load().await {
            if persisted.day == now.date_naive() {
                internal.state = persisted.state;
                internal.state_changed_at = persisted.state_changed_at;
                internal.failures = persisted.failures;
                internal.cost_history = persisted.cost_history.into();
            }
        }
        Self {
            config,
            ledger,
            store,
            inner: RwLock::new(internal),
        }
    }

    async fn persist(&self, internal: &Internal) {
        self.store
            .save(&PersistedBreakerState {
                state: internal.state,
                state_changed_at: internal.state_changed_at,
                failures: internal.failures,
                cost_history: internal.cost_history.iter().copied().collect(),
                day: Utc::now().date_naive(),
            })
            .await;
    }

    /// Look up pricing, estimate the cost of `input_tokens`/`output_tokens`,
    /// and run [`CostCircuitBreaker::admit`]. Rejects with
    /// [`RejectReason::PricingUnknown`] if no active pricing row exists.
    pub async fn estimate_and_admit(
        &self,
        pricing: &PricingTable,
        provider: &str,
        model: &str,
        conversation_id: &str,
        is_new_conversation: bool,
        input_tokens: u64,
        output_tokens: u64,
    ) -> AdmitDecision {
        let Some(row) = pricing.get_active(provider, model).await else {
            return AdmitDecision::Reject(RejectReason::PricingUnknown {
                provider: provider.to_string(),
                model: model.to_string(),
            });
        };
        let estimated = calculate_cost(&row, input_tokens, output_tokens).total_cost;
        self.admit(conversation_id, is_new_conversation, estimated).await
    }

    /// Admission check for a prospective call costing `estimated_cost`.
    pub async fn admit(
        &self,
        conversation_id: &str,
        is_new_conversation: bool,
        estimated_cost: Decimal,
    ) -> AdmitDecision {
        let now = Utc::now();
        let mut internal = self.inner.write().await;

        if internal.state == BreakerStateKind::Open {
            let elapsed = (now - internal.state_changed_at).num_seconds().max(0) as u64;
            if elapsed >= self.config.timeout_seconds {
                internal.state = BreakerStateKind::HalfOpen;
                internal.state_changed_at = now;
                internal.half_open_successes = 0;
                internal.half_open_probes = 0;
                debug!("circuit breaker: open -> half_open after {elapsed}s");
            } else {
                let retry_after_secs = self.config.timeout_seconds - elapsed;
                return AdmitDecision::Reject(RejectReason::CircuitOpen { retry_after_secs });
            }
        }

        if internal.state == BreakerStateKind::HalfOpen
            && internal.half_open_probes >= self.config.success_threshold
        {
            return AdmitDecision::Reject(RejectReason::CircuitOpen { retry_after_secs: 0 });
        }

        let minute_ago = now - chrono::Duration::seconds(60);
        while internal.turn_timestamps.front().is_some_and(|t| *t < minute_ago) {
            internal.turn_timestamps.pop_front();
        }
        if internal.turn_timestamps.len() as u32 >= self.config.max_turns_per_minute {
            return AdmitDecision::Reject(RejectReason::RateLimited);
        }

        let hour_ago = now - chrono::Duration::hours(1);
        while internal
            .conversation_starts
            .front()
            .is_some_and(|(t, _)| *t < hour_ago)
        {
            internal.conversation_starts.pop_front();
        }
        if is_new_conversation {
            let distinct: std::collections::HashSet<&str> = internal
                .conversation_starts
                .iter()
                .map(|(_, id)| id.as_str())
                .collect();
            if distinct.len() as u32 >= self.config.max_conversations_per_hour {
                return AdmitDecision::Reject(RejectReason::RateLimited);
            }
        }

        if estimated_cost > self.config.turn_limit {
            return AdmitDecision::Reject(RejectReason::TurnLimitExceeded);
        }

        let conversation_total = self.ledger.conversation_total(conversation_id).await;
        if conversation_total + estimated_cost > self.config.conversation_limit {
            return AdmitDecision::Reject(RejectReason::ConversationLimitExceeded);
        }

        let daily_total = self.ledger.today_total().await;
        if daily_total + estimated_cost > self.config.budget_limit_daily {
            self.trip_locked(&mut internal, now);
            self.persist(&internal).await;
            return AdmitDecision::Reject(RejectReason::DailyBudgetExceeded);
        }

        if internal.cost_history.len() >= self.config.window_size.max(1) {
            let average: Decimal = internal.cost_history.iter().sum::<Decimal>()
                / Decimal::from(internal.cost_history.len());
            let spike_factor = Decimal::try_from(self.config.spike_factor).unwrap_or(Decimal::ONE);
            if average > Decimal::ZERO && estimated_cost > spike_factor * average {
                internal.failures += 1;
                warn!(failures = internal.failures, "cost_spike detected");
                if internal.failures >= self.config.failure_threshold {
                    self.trip_locked(&mut internal, now);
                    self.persist(&internal).await;
                    return AdmitDecision::Reject(RejectReason::CircuitOpen { retry_after_secs: self.config.timeout_seconds });
                }
            }
        }

        internal.cost_history.push_back(estimated_cost);
        while internal.cost_history.len() > self.config.window_size.max(1) {
            internal.cost_history.pop_front();
        }
        internal.turn_timestamps.push_back(now);
        if is_new_conversation {
            internal
                .conversation_starts
                .push_back((now, conversation_id.to_string()));
        }
        if internal.state == BreakerStateKind::HalfOpen {
            internal.half_open_probes += 1;
        }

        self.check_budget_level(&mut internal, daily_total + estimated_cost, now);
        self.persist(&internal).await;
        AdmitDecision::Admit
    }

    /// Report that an admitted call's provider call succeeded. In
    /// `half_open`, advances toward closing the breaker.
    pub async fn record_success(&self) {
        let now = Utc::now();
        let mut internal = self.inner.write().await;
        if internal.state == BreakerStateKind::HalfOpen {
            internal.half_open_successes += 1;
            if internal.half_open_successes >= self.config.success_threshold && internal.failures == 0 {
                internal.state = BreakerStateKind::Closed;
                internal.state_changed_at = now;
                internal.failures = 0;
                debug!("circuit breaker: half_open -> closed");
            }
        }
        self.persist(&internal).await;
    }

    /// Report that an admitted call's provider call failed. In
    /// `half_open` this immediately re-opens the breaker; in `closed` it
    /// counts toward `failure_threshold`.
    pub async fn record_failure(&self) {
        let now = Utc::now();
        let mut internal = self.inner.write().await;
        match internal.state {
            BreakerStateKind::HalfOpen => self.trip_locked(&mut internal, now),
            BreakerStateKind::Closed => {
                internal.failures += 1;
                if internal.failures >= self.config.failure_threshold {
                    self.trip_locked(&mut internal, now);
                }
            }
            BreakerStateKind::Open => {}
        }
        self.persist(&internal).await;
    }

    /// Trip the breaker open from the outside — used by the budget monitor
    /// when a sweep finds utilization past the critical threshold.
    pub async fn trip(&self, reason: &str) {
        let now = Utc::now();
        let mut internal = self.inner.write().await;
        warn!(reason, "circuit breaker tripped by external caller");
        self.trip_locked(&mut internal, now);
        self.persist(&internal).await;
    }

    /// Force the breaker closed, bypassing the half-open probe sequence.
    /// Corresponds to `POST circuit-breaker/override`; callers are expected
    /// to audit-log this themselves, since authorization is outside this
    /// crate's scope.
    pub async fn override_closed(&self) {
        let now = Utc::now();
        let mut internal = self.inner.write().await;
        warn!("circuit breaker force-closed by override");
        internal.state = BreakerStateKind::Closed;
        internal.state_changed_at = now;
        internal.failures = 0;
        internal.half_open_successes = 0;
        internal.half_open_probes = 0;
        self.persist(&internal).await;
    }

    fn trip_locked(&self, internal: &mut Internal, now: DateTime<Utc>) {
        internal.state = BreakerStateKind::Open;
        internal.state_changed_at = now;
        internal.failures = 0;
        internal.half_open_successes = 0;
        internal.half_open_probes = 0;
    }

    fn check_budget_level(&self, internal: &mut Internal, projected_total: Decimal, now: DateTime<Utc>) {
        if self.config.budget_limit_daily <= Decimal::ZERO {
            return;
        }
        let utilization: f64 = (projected_total / self.config.budget_limit_daily)
            .to_string()
            .parse()
            .unwrap_or(0.0);
        let level = BudgetLevel::classify(
            utilization,
            self.config.warning_threshold,
            self.config.critical_threshold,
        );
        let last = internal.level_last_emitted.get(&level).copied();
        if last.is_none_or(|t| now - t >= chrono::Duration::hours(1)) {
            debug!(?level, utilization, "budget level transition");
            internal.level_last_emitted.insert(level, now);
        }
    }

    /// Point-in-time snapshot, the shape of `GET circuit-breaker`.
    pub async fn snapshot(&self) -> CircuitBreakerState {
        let internal = self.inner.read().await;
        CircuitBreakerState {
            state: internal.state,
            state_changed_at: internal.state_changed_at,
            failures: internal.failures,
            total_cost: self.ledger.today_total().await,
            turn_count: internal.turn_timestamps.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryBreakerStore;

    fn config() -> BreakerConfig {
        BreakerConfig {
            budget_limit_daily: Decimal::from(100),
            conversation_limit: Decimal::from(10),
            turn_limit: Decimal::from(1),
            warning_threshold: 0.8,
            critical_threshold: 0.95,
            max_turns_per_minute: 60,
            max_conversations_per_hour: 60,
            spike_factor: 3.0,
            timeout_seconds: 0,
            success_threshold: 2,
            failure_threshold: 2,
            window_size: 5,
        }
    }

    async fn breaker() -> CostCircuitBreaker {
        CostCircuitBreaker::init(
            config(),
            Arc::new(CostLedger::new()),
            Arc::new(InMemoryBreakerStore::new()),
        )
        .await
    }

    #[tokio::test]
    async fn admits_small_calls() {
        let b = breaker().await;
        let decision = b.admit("conv-1", true, Decimal::new(10, 2)).await;
        assert_eq!(decision, AdmitDecision::Admit);
    }

    #[tokio::test]
    async fn rejects_above_turn_limit() {
        let b = breaker().await;
        let decision = b.admit("conv-1", true, Decimal::from(2)).await;
        assert_eq!(
            decision,
            AdmitDecision::Reject(RejectReason::TurnLimitExceeded)
        );
    }

    #[tokio::test]
    async fn daily_budget_exceeded_trips_breaker() {
        let mut cfg = config();
        cfg.budget_limit_daily = Decimal::new(50, 2);
        cfg.turn_limit = Decimal::from(10);
        cfg.conversation_limit = Decimal::from(10);
        let b = CostCircuitBreaker::init(
            cfg,
            Arc::new(CostLedger::new()),
            Arc::new(InMemoryBreakerStore::new()),
        )
        .await;

        let decision = b.admit("conv-1", true, Decimal::from(1)).await;
        assert_eq!(
            decision,
            AdmitDecision::Reject(RejectReason::DailyBudgetExceeded)
        );
        assert_eq!(b.snapshot().await.state, BreakerStateKind::Open);
    }

    #[tokio::test]
    async fn half_open_recovers_to_closed_after_successes() {
        let b = breaker().await;
        b.trip("test").await;
        assert_eq!(b.snapshot().await.state, BreakerStateKind::Open);

        // timeout_seconds is 0, so the very next admit call probes half-open.
        let decision = b.admit("conv-1", false, Decimal::new(10, 2)).await;
        assert_eq!(decision, AdmitDecision::Admit);
        assert_eq!(b.snapshot().await.state, BreakerStateKind::HalfOpen);

        b.record_success().await;
        b.record_success().await;
        assert_eq!(b.snapshot().await.state, BreakerStateKind::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let b = breaker().await;
        b.trip("test").await;
        let _ = b.admit("conv-1", false, Decimal::new(10, 2)).await;
        assert_eq!(b.snapshot().await.state, BreakerStateKind::HalfOpen);

        b.record_failure().await;
        assert_eq!(b.snapshot().await.state, BreakerStateKind::Open);
    }

    #[tokio::test]
    async fn pricing_unknown_rejects() {
        let b = breaker().await;
        let pricing = PricingTable::new();
        let decision = b
            .estimate_and_admit(&pricing, "openai", "gpt-4o-mini", "conv-1", true, 100, 50)
            .await;
        assert_eq!(
            decision,
            AdmitDecision::Reject(RejectReason::PricingUnknown {
                provider: "openai".to_string(),
                model: "gpt-4o-mini".to_string(),
            })
        );
    }
}
