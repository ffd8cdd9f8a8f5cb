//! Pricing record types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Unit a price is denominated in. The table only ever stores prices
/// normalized to [`PriceUnit::Per1k`] — ingestion converts any per-million
/// feed into per-1k before a row is inserted. The variant exists to make
/// that normalization self-documenting, not to support mixed storage units.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceUnit {
    /// Price is per 1,000 tokens.
    Per1k,
}

/// One effective-dated price row for a (provider, model) pair.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPricing {
    /// Provider name, e.g. `"anthropic"`.
    pub provider: String,
    /// Model name, e.g. `"claude-3-5-haiku"`.
    pub model: String,
    /// Input price per 1,000 tokens.
    pub input_price_per_1k: Decimal,
    /// Output price per 1,000 tokens.
    pub output_price_per_1k: Decimal,
    /// Flat per-request fee, if the provider charges one.
    pub price_per_request: Option<Decimal>,
    /// Unit the two per-token prices above are denominated in.
    pub unit: PriceUnit,
    /// Context window size in tokens, for admission/estimation callers.
    pub context_window: u32,
    /// When this row became active.
    pub effective_from: DateTime<Utc>,
    /// When this row stopped being active; `None` while still current.
    pub effective_to: Option<DateTime<Utc>>,
    /// Whether this is the current active row for the pair.
    pub is_active: bool,
}

impl ProviderPricing {
    /// Start a new active row. `effective_to` is `None` and `is_active` is
    /// `true`; [`super::PricingTable::set_active`] is responsible for
    /// closing out whatever row this one supersedes.
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        input_price_per_1k: Decimal,
        output_price_per_1k: Decimal,
        context_window: u32,
        effective_from: DateTime<Utc>,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            input_price_per_1k,
            output_price_per_1k,
            price_per_request: None,
            unit: PriceUnit::Per1k,
            context_window,
            effective_from,
            effective_to: None,
            is_active: true,
        }
    }

    /// Attach a flat per-request fee.
    pub fn with_request_fee(mut self, fee: Decimal) -> Self {
        self.price_per_request = Some(fee);
        self
    }

    /// Was this row active at the given instant?
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.effective_from <= at && self.effective_to.is_none_or(|to| at < to)
    }
}
