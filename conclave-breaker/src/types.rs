//! Breaker state machine vocabulary.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Circuit breaker state: closed/open/half-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerStateKind {
    /// Admitting requests that pass all checks.
    Closed,
    /// Rejecting every request until the recovery timeout elapses.
    Open,
    /// Admitting a limited number of probe calls.
    HalfOpen,
}

/// Why a call was rejected.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    /// The breaker is open.
    CircuitOpen {
        /// Seconds until the breaker will probe half-open.
        retry_after_secs: u64,
    },
    /// More than `max_turns_per_minute` turns in the last 60s.
    RateLimited,
    /// `estimated_cost > turn_limit`.
    TurnLimitExceeded,
    /// `conversation_total + estimated_cost > conversation_limit`.
    ConversationLimitExceeded,
    /// `daily_total + estimated_cost > budget_limit_daily`. Also trips the
    /// breaker open.
    DailyBudgetExceeded,
    /// No pricing row for the requested (provider, model).
    PricingUnknown {
        /// Provider name.
        provider: String,
        /// Model name.
        model: String,
    },
    /// The backing store was unavailable; the breaker fails closed.
    StoreUnavailable,
}

/// Result of an admission check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AdmitDecision {
    /// The call may proceed.
    Admit,
    /// The call is rejected for the given reason.
    Reject(RejectReason),
}

impl AdmitDecision {
    /// `true` if this decision allows the call to proceed.
    pub fn is_admit(&self) -> bool {
        matches!(self, AdmitDecision::Admit)
    }
}

/// Daily budget utilization level, published at most once per hour per
/// level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetLevel {
    /// Below the warning threshold.
    Healthy,
    /// Between warning and critical.
    Moderate,
    /// At or above the warning threshold.
    Warning,
    /// At or above the critical threshold.
    Critical,
    /// At or above the daily limit.
    Exceeded,
}

impl BudgetLevel {
    /// Classify a utilization fraction (`used / limit`) against the
    /// configured warning/critical thresholds.
    pub fn classify(utilization: f64, warning_threshold: f64, critical_threshold: f64) -> Self {
        if utilization >= 1.0 {
            BudgetLevel::Exceeded
        } else if utilization >= critical_threshold {
            BudgetLevel::Critical
        } else if utilization >= warning_threshold {
            BudgetLevel::Warning
        } else if utilization >= warning_threshold * 0.5 {
            BudgetLevel::Moderate
        } else {
            BudgetLevel::Healthy
        }
    }
}

/// Point-in-time snapshot of [`crate::CostCircuitBreaker`] state, the shape
/// returned by `GET circuit-breaker`.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    /// Current state.
    pub state: BreakerStateKind,
    /// When the current state was entered.
    pub state_changed_at: DateTime<Utc>,
    /// Consecutive spike/probe failures counted toward tripping.
    pub failures: u32,
    /// Today's running total, from the ledger.
    pub total_cost: Decimal,
    /// Turns admitted in the current 60s window.
    pub turn_count: usize,
}
