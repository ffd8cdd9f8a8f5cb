//! The pricing table itself: one active row per (provider, model), plus
//! append-only history.

use crate::types::ProviderPricing;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors raised by [`PricingTable`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PricingError {
    /// No active row for this (provider, model) pair.
    #[error("no active pricing for {provider}/{model}")]
    Unknown {
        /// Provider name.
        provider: String,
        /// Model name.
        model: String,
    },

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Key into the table: `(provider, model)`.
type Key = (String, String);

/// Authoritative active pricing per (provider, model), guarded by a
/// reader-writer lock so writers are serialized while reads stay
/// concurrent. Each key keeps its full effective-dated history; at most
/// one row per key has `is_active == true`.
#[derive(Default)]
pub struct PricingTable {
    rows: RwLock<HashMap<Key, Vec<ProviderPricing>>>,
}

impl PricingTable {
    /// Create an empty pricing table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `pricing` as the new active row for its (provider, model).
    /// Closes the previous active row, if any, by setting its
    /// `effective_to` to `pricing.effective_from`.
    pub async fn set_active(&self, mut pricing: ProviderPricing) {
        pricing.is_active = true;
        let key = (pricing.provider.clone(), pricing.model.clone());
        let mut rows = self.rows.write().await;
        let history = rows.entry(key).or_default();
        for prior in history.iter_mut().filter(|r| r.is_active) {
            prior.is_active = false;
            prior.effective_to = Some(pricing.effective_from);
        }
        history.push(pricing);
    }

    /// The current active row for (provider, model), if one exists.
    pub async fn get_active(&self, provider: &str, model: &str) -> Option<ProviderPricing> {
        let rows = self.rows.read().await;
        rows.get(&(provider.to_string(), model.to_string()))
            .and_then(|history| history.iter().find(|r| r.is_active))
            .cloned()
    }

    /// The row that was active at `at`, which may be a historical one.
    pub async fn active_at(
        &self,
        provider: &str,
        model: &str,
        at: DateTime<Utc>,
    ) -> Option<ProviderPricing> {
        let rows = self.rows.read().await;
        rows.get(&(provider.to_string(), model.to_string()))
            .and_then(|history| history.iter().find(|r| r.covers(at)))
            .cloned()
    }

    /// Full effective-dated history for (provider, model), oldest first.
    pub async fn history(&self, provider: &str, model: &str) -> Vec<ProviderPricing> {
        let rows = self.rows.read().await;
        rows.get(&(provider.to_string(), model.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// All currently active rows across every provider/model.
    pub async fn all_active(&self) -> Vec<ProviderPricing> {
        let rows = self.rows.read().await;
        rows.values()
            .flat_map(|history| history.iter().filter(|r| r.is_active).cloned())
            .collect()
    }
}

/// The three cost components for one provider call, per spec's
/// `total_cost = input_cost + output_cost + request_fee` invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostBreakdown {
    /// Cost of the input tokens.
    pub input_cost: Decimal,
    /// Cost of the output tokens.
    pub output_cost: Decimal,
    /// Flat per-request fee, if any.
    pub request_fee: Decimal,
    /// Sum of the three fields above.
    pub total_cost: Decimal,
}

/// Price `input_tokens`/`output_tokens` against `pricing`. Pure function so
/// both the ledger (actual cost) and the circuit breaker (estimated cost)
/// can share one calculation.
pub fn calculate_cost(
    pricing: &ProviderPricing,
    input_tokens: u64,
    output_tokens: u64,
) -> CostBreakdown {
    let per_thousand = Decimal::from(1000u32);
    let input_cost = pricing.input_price_per_1k * Decimal::from(input_tokens) / per_thousand;
    let output_cost = pricing.output_price_per_1k * Decimal::from(output_tokens) / per_thousand;
    let request_fee = pricing.price_per_request.unwrap_or(Decimal::ZERO);
    CostBreakdown {
        input_cost,
        output_cost,
        request_fee,
        total_cost: input_cost + output_cost + request_fee,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn row(price_in: &str, price_out: &str, from: DateTime<Utc>) -> ProviderPricing {
        ProviderPricing::new(
            "anthropic",
            "claude-3-5-haiku",
            price_in.parse().unwrap(),
            price_out.parse().unwrap(),
            200_000,
            from,
        )
    }

    #[tokio::test]
    async fn set_active_closes_previous_row() {
        let table = PricingTable::new();
        let t0 = Utc::now();
        table.set_active(row("0.25", "1.25", t0)).await;

        let t1 = t0 + Duration::days(30);
        table.set_active(row("0.30", "1.50", t1)).await;

        let active = table.get_active("anthropic", "claude-3-5-haiku").await.unwrap();
        assert_eq!(active.input_price_per_1k, "0.30".parse().unwrap());

        let history = table.history("anthropic", "claude-3-5-haiku").await;
        assert_eq!(history.len(), 2);
        assert!(!history[0].is_active);
        assert_eq!(history[0].effective_to, Some(t1));
        assert!(history[1].is_active);
        assert_eq!(history[1].effective_to, None);
    }

    #[tokio::test]
    async fn active_at_finds_historical_row() {
        let table = PricingTable::new();
        let t0 = Utc::now();
        let t1 = t0 + Duration::days(30);
        table.set_active(row("0.25", "1.25", t0)).await;
        table.set_active(row("0.30", "1.50", t1)).await;

        let mid = t0 + Duration::days(1);
        let historical = table
            .active_at("anthropic", "claude-3-5-haiku", mid)
            .await
            .unwrap();
        assert_eq!(historical.input_price_per_1k, "0.25".parse().unwrap());
    }

    #[tokio::test]
    async fn unknown_pair_returns_none() {
        let table = PricingTable::new();
        assert!(table.get_active("openai", "gpt-4o-mini").await.is_none());
    }

    #[test]
    fn calculate_cost_sums_components() {
        let pricing = row("0.25", "1.25", Utc::now()).with_request_fee("0.001".parse().unwrap());
        let breakdown = calculate_cost(&pricing, 10_000, 2_000);
        assert_eq!(breakdown.input_cost, "2.5".parse().unwrap());
        assert_eq!(breakdown.output_cost, "2.5".parse().unwrap());
        assert_eq!(breakdown.request_fee, "0.001".parse().unwrap());
        assert_eq!(breakdown.total_cost, breakdown.input_cost + breakdown.output_cost + breakdown.request_fee);
    }
}
