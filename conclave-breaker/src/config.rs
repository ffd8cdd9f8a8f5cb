//! Environment-driven breaker configuration.

use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

/// Configured limits for the circuit breaker and budget monitor.
///
/// Every numeric field is loaded from an environment variable with a
/// documented default — no external config crate, following the ambient
/// "plain `std::env::var` parsing" convention used across this workspace.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// `BUDGET_DAILY_LIMIT`. Daily spend cap across all conversations.
    pub budget_limit_daily: Decimal,
    /// `BUDGET_CONVERSATION_LIMIT`. Spend cap for a single conversation.
    pub conversation_limit: Decimal,
    /// `BUDGET_TURN_LIMIT`. Spend cap for a single turn.
    pub turn_limit: Decimal,
    /// Fraction of `budget_limit_daily` at which a `warning` alert fires.
    pub warning_threshold: f64,
    /// Fraction of `budget_limit_daily` at which a `critical` alert fires.
    pub critical_threshold: f64,
    /// `RATE_TURNS_PER_MINUTE`. Turns admitted per rolling 60s window.
    pub max_turns_per_minute: u32,
    /// `RATE_CONVERSATIONS_PER_HOUR`. New conversations admitted per hour bucket.
    pub max_conversations_per_hour: u32,
    /// `CIRCUIT_SPIKE_FACTOR`. A call costing more than
    /// `spike_factor * moving_average` counts as a spike.
    pub spike_factor: f64,
    /// `CIRCUIT_RECOVERY_TIMEOUT_S`. Seconds an open breaker waits before
    /// probing half-open.
    pub timeout_seconds: u64,
    /// `CIRCUIT_SUCCESS_THRESHOLD`. Consecutive half-open successes needed
    /// to close the breaker.
    pub success_threshold: u32,
    /// `CIRCUIT_FAILURE_THRESHOLD`. Spike failures needed to trip the
    /// breaker open from `closed`.
    pub failure_threshold: u32,
    /// Number of recent calls kept for the spike-detection moving average.
    /// Fixed at 10 (spec requires "implementer chooses, >= 5").
    pub window_size: usize,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            budget_limit_daily: env_or("BUDGET_DAILY_LIMIT", Decimal::from(100)),
            conversation_limit: env_or("BUDGET_CONVERSATION_LIMIT", Decimal::from(5)),
            turn_limit: env_or("BUDGET_TURN_LIMIT", Decimal::new(50, 2)),
            warning_threshold: 0.8,
            critical_threshold: 0.95,
            max_turns_per_minute: env_or("RATE_TURNS_PER_MINUTE", 60),
            max_conversations_per_hour: env_or("RATE_CONVERSATIONS_PER_HOUR", 120),
            spike_factor: env_or("CIRCUIT_SPIKE_FACTOR", 3.0),
            timeout_seconds: env_or("CIRCUIT_RECOVERY_TIMEOUT_S", 60),
            success_threshold: env_or("CIRCUIT_SUCCESS_THRESHOLD", 3),
            failure_threshold: env_or("CIRCUIT_FAILURE_THRESHOLD", 5),
            window_size: 10,
        }
    }
}

impl BreakerConfig {
    /// Load configuration from the environment, falling back to documented
    /// defaults for any unset variable.
    pub fn from_env() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = BreakerConfig::default();
        assert!(cfg.warning_threshold < cfg.critical_threshold);
        assert!(cfg.spike_factor >= 1.0);
        assert!(cfg.window_size >= 5);
    }
}
