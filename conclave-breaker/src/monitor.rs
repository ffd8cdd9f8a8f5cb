//! Periodic budget sweep: reads the ledger's aggregates, predicts
//! future spend, flags anomalous sessions, and trips the breaker when
//! utilization crosses the critical threshold.

use crate::breaker::CostCircuitBreaker;
use crate::config::BreakerConfig;
use chrono::{Datelike, NaiveDate, Utc};
use conclave_ledger::CostLedger;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// A day-over-day spend projection, or an explicit "not enough history"
/// marker when fewer than 3 days of data are on record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SpendingPrediction {
    /// Fewer than 3 days of history; no projection made.
    InsufficientData,
    /// Linear-regression projections over the available history.
    Projected {
        /// Projected spend tomorrow.
        tomorrow: Decimal,
        /// Projected spend over the next 7 days.
        seven_day: Decimal,
        /// Projected spend over the next 30 days.
        thirty_day: Decimal,
    },
}

/// A session whose total cost is anomalously high relative to recent
/// sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionAnomaly {
    /// The session id.
    pub session_id: String,
    /// That session's total cost.
    pub total_cost: Decimal,
    /// Mean session cost over the trailing 24h window.
    pub baseline_mean: Decimal,
}

/// Output of one [`BudgetMonitor::sweep`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetReport {
    /// Today's total spend.
    pub daily: Decimal,
    /// This calendar month's total spend.
    pub monthly: Decimal,
    /// Per-provider running totals.
    pub per_provider: HashMap<String, Decimal>,
    /// Sessions flagged as anomalous.
    pub session_anomalies: Vec<SessionAnomaly>,
    /// Spending projection.
    pub prediction: SpendingPrediction,
    /// Set when the sweep tripped (or recommends tripping) the breaker.
    pub circuit_recommendation: Option<String>,
}

/// Runs on a timer (caller's choice of cadence, spec recommends <= 1 min)
/// and produces a [`BudgetReport`].
pub struct BudgetMonitor {
    config: BreakerConfig,
    ledger: Arc<CostLedger>,
    breaker: Arc<CostCircuitBreaker>,
}

impl BudgetMonitor {
    /// Build a monitor over the given ledger and breaker.
    pub fn new(config: BreakerConfig, ledger: Arc<CostLedger>, breaker: Arc<CostCircuitBreaker>) -> Self {
        Self {
            config,
            ledger,
            breaker,
        }
    }

    /// Run one sweep: read aggregates, predict, flag anomalies, and trip
    /// the breaker if warranted.
    pub async fn sweep(&self) -> BudgetReport {
        let daily = self.ledger.today_total().await;
        let history = self.ledger.daily_totals(30).await;
        let monthly = monthly_total(&history, Utc::now().date_naive());
        let per_provider = self.ledger.all_provider_totals().await;
        let prediction = predict(&history);
        let session_anomalies = self.session_anomalies().await;

        let mut circuit_recommendation = None;
        if self.config.budget_limit_daily > Decimal::ZERO {
            let utilization: f64 = (daily / self.config.budget_limit_daily)
                .to_string()
                .parse()
                .unwrap_or(0.0);
            if utilization >= self.config.critical_threshold {
                let reason = format!(
                    "daily utilization {:.1}% >= critical threshold {:.1}%",
                    utilization * 100.0,
                    self.config.critical_threshold * 100.0
                );
                warn!(reason, "budget monitor tripping breaker");
                self.breaker.trip(&reason).await;
                circuit_recommendation = Some(reason);
            }
        }
        for (provider, total) in &per_provider {
            if self.config.budget_limit_daily <= Decimal::ZERO {
                continue;
            }
            let share: f64 = (*total / self.config.budget_limit_daily)
                .to_string()
                .parse()
                .unwrap_or(0.0);
            if share >= 0.95 {
                let reason = format!("provider {provider} at {:.1}% of daily budget", share * 100.0);
                warn!(reason, "budget monitor tripping breaker");
                self.breaker.trip(&reason).await;
                circuit_recommendation.get_or_insert(reason);
            }
        }

        BudgetReport {
            daily,
            monthly,
            per_provider,
            session_anomalies,
            prediction,
            circuit_recommendation,
        }
    }

    async fn session_anomalies(&self) -> Vec<SessionAnomaly> {
        let recent = self
            .ledger
            .records_since(Utc::now() - chrono::Duration::hours(24))
            .await;
        let mut per_session: HashMap<String, Decimal> = HashMap::new();
        for record in &recent {
            *per_session
                .entry(record.session_id.as_str().to_string())
                .or_insert(Decimal::ZERO) += record.total_cost;
        }
        if per_session.is_empty() {
            return Vec::new();
        }
        let mean = per_session.values().copied().sum::<Decimal>()
            / Decimal::from(per_session.len());
        let threshold = Decimal::ONE;
        per_session
            .into_iter()
            .filter(|(_, total)| *total > Decimal::from(3) * mean && *total > threshold)
            .map(|(session_id, total_cost)| SessionAnomaly {
                session_id,
                total_cost,
                baseline_mean: mean,
            })
            .collect()
    }
}

fn monthly_total(history: &[(NaiveDate, Decimal)], today: NaiveDate) -> Decimal {
    history
        .iter()
        .filter(|(day, _)| day.year() == today.year() && day.month() == today.month())
        .map(|(_, total)| *total)
        .sum()
}

/// Simple linear regression over the trailing daily totals, per spec's
/// "simple linear regression on the last >= 3 days of totals".
fn predict(history: &[(NaiveDate, Decimal)]) -> SpendingPrediction {
    if history.len() < 3 {
        return SpendingPrediction::InsufficientData;
    }
    let ys: Vec<f64> = history
        .iter()
        .map(|(_, total)| total.to_string().parse().unwrap_or(0.0))
        .collect();
    let n = ys.len() as f64;
    let xs: Vec<f64> = (0..ys.len()).map(|i| i as f64).collect();
    let x_mean = xs.iter().sum::<f64>() / n;
    let y_mean = ys.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for i in 0..ys.len() {
        num += (xs[i] - x_mean) * (ys[i] - y_mean);
        den += (xs[i] - x_mean).powi(2);
    }
    let slope = if den == 0.0 { 0.0 } else { num / den };
    let intercept = y_mean - slope * x_mean;
    let project = |offset: f64| -> Decimal {
        let x = n - 1.0 + offset;
        let y = (intercept + slope * x).max(0.0);
        Decimal::try_from(y).unwrap_or(Decimal::ZERO)
    };
    SpendingPrediction::Projected {
        tomorrow: project(1.0),
        seven_day: (1..=7).map(|d| project(d as f64)).sum(),
        thirty_day: (1..=30).map(|d| project(d as f64)).sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryBreakerStore;
    use chrono::Duration;
    use conclave_core::id::{ConversationId, SessionId};
    use conclave_ledger::CostRecord;
    use conclave_pricing::ProviderPricing;

    async fn ledger_with_history(days: u32) -> Arc<CostLedger> {
        let ledger = Arc::new(CostLedger::new());
        let pricing = ProviderPricing::new(
            "anthropic",
            "claude-3-5-haiku",
            "0.25".parse().unwrap(),
            "1.25".parse().unwrap(),
            200_000,
            Utc::now(),
        );
        for d in 0..days {
            let at = Utc::now() - Duration::days(i64::from(d));
            ledger
                .record(CostRecord::priced(
                    format!("rec-{d}"),
                    SessionId::new(format!("sess-{d}")),
                    ConversationId::new("conv-1"),
                    1,
                    None,
                    &pricing,
                    10_000,
                    2_000,
                    at,
                ))
                .await;
        }
        ledger
    }

    #[tokio::test]
    async fn insufficient_data_below_three_days() {
        let ledger = ledger_with_history(2).await;
        let breaker = Arc::new(
            CostCircuitBreaker::init(
                BreakerConfig::default(),
                ledger.clone(),
                Arc::new(InMemoryBreakerStore::new()),
            )
            .await,
        );
        let monitor = BudgetMonitor::new(BreakerConfig::default(), ledger, breaker);
        let report = monitor.sweep().await;
        assert_eq!(report.prediction, SpendingPrediction::InsufficientData);
    }

    #[tokio::test]
    async fn projects_with_enough_history() {
        let ledger = ledger_with_history(5).await;
        let breaker = Arc::new(
            CostCircuitBreaker::init(
                BreakerConfig::default(),
                ledger.clone(),
                Arc::new(InMemoryBreakerStore::new()),
            )
            .await,
        );
        let monitor = BudgetMonitor::new(BreakerConfig::default(), ledger, breaker);
        let report = monitor.sweep().await;
        assert!(matches!(report.prediction, SpendingPrediction::Projected { .. }));
    }
}
