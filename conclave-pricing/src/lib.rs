#![deny(missing_docs)]
//! Authoritative provider pricing table.
//!
//! `PricingTable` keeps at most one active [`ProviderPricing`] row per
//! (provider, model), behind a `RwLock` the same way `conclave-core`'s
//! `StateStore` implementations do, with an append-only effective-dated
//! history: installing a new active row closes out whatever it supersedes
//! rather than overwriting it.

mod table;
mod types;

pub use table::{calculate_cost, CostBreakdown, PricingError, PricingTable};
pub use types::{PriceUnit, ProviderPricing};
