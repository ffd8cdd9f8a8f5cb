//! Append-only ledger of [`CostRecord`]s with running aggregates.

use crate::session::{ConversationSession, ConversationStatus};
use crate::types::CostRecord;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use conclave_core::id::{ConversationId, SessionId};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;

struct Inner {
    records: Vec<CostRecord>,
    per_conversation: HashMap<String, Decimal>,
    per_session: HashMap<String, Decimal>,
    per_day: HashMap<NaiveDate, Decimal>,
    per_provider: HashMap<String, Decimal>,
    sessions: HashMap<String, ConversationSession>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            per_conversation: HashMap::new(),
            per_session: HashMap::new(),
            per_day: HashMap::new(),
            per_provider: HashMap::new(),
            sessions: HashMap::new(),
        }
    }
}

/// Append-only cost ledger. Every [`CostLedger::record`] call appends the
/// record and updates the per-conversation / per-session / per-day /
/// per-provider running totals in the same write lock, matching spec's
/// "aggregate counters updated atomically, single-writer per key" policy.
#[derive(Default)]
pub struct CostLedger {
    inner: RwLock<Inner>,
}

impl CostLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and fold it into the running aggregates.
    pub async fn record(&self, record: CostRecord) {
        let mut inner = self.inner.write().await;
        let day = record.created_at.date_naive();
        *inner
            .per_conversation
            .entry(record.conversation_id.as_str().to_string())
            .or_insert(Decimal::ZERO) += record.total_cost;
        *inner
            .per_session
            .entry(record.session_id.as_str().to_string())
            .or_insert(Decimal::ZERO) += record.total_cost;
        *inner.per_day.entry(day).or_insert(Decimal::ZERO) += record.total_cost;
        *inner
            .per_provider
            .entry(record.provider.clone())
            .or_insert(Decimal::ZERO) += record.total_cost;
        if let Some(session) = inner.sessions.get_mut(record.session_id.as_str()) {
            session.total_cost += record.total_cost;
            session.total_interactions += 1;
        }
        inner.records.push(record);
    }

    /// Open a new [`ConversationSession`] in the `Active` status. Overwrites
    /// any existing session under the same `session_id`.
    pub async fn open_session(
        &self,
        session_id: SessionId,
        conversation_id: ConversationId,
        user_id: impl Into<String>,
        started_at: DateTime<Utc>,
    ) {
        let session = ConversationSession::open(session_id.clone(), conversation_id, user_id, started_at);
        let mut inner = self.inner.write().await;
        inner.sessions.insert(session_id.as_str().to_string(), session);
    }

    /// Close an open session: sets `status` and `ended_at`. No-op if the
    /// session id is unknown.
    pub async fn close_session(&self, session_id: &str, status: ConversationStatus, ended_at: DateTime<Utc>) {
        let mut inner = self.inner.write().await;
        if let Some(session) = inner.sessions.get_mut(session_id) {
            session.status = status;
            session.ended_at = Some(ended_at);
        }
    }

    /// The current aggregate for one session, if it has been opened.
    pub async fn session(&self, session_id: &str) -> Option<ConversationSession> {
        self.inner.read().await.sessions.get(session_id).cloned()
    }

    /// Running total for one conversation.
    pub async fn conversation_total(&self, conversation_id: &str) -> Decimal {
        self.inner
            .read()
            .await
            .per_conversation
            .get(conversation_id)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Running total for one session.
    pub async fn session_total(&self, session_id: &str) -> Decimal {
        self.inner
            .read()
            .await
            .per_session
            .get(session_id)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Running total for one calendar day (UTC).
    pub async fn daily_total(&self, day: NaiveDate) -> Decimal {
        self.inner
            .read()
            .await
            .per_day
            .get(&day)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Today's running total (UTC).
    pub async fn today_total(&self) -> Decimal {
        self.daily_total(Utc::now().date_naive()).await
    }

    /// Running total for one provider, across all conversations.
    pub async fn provider_total(&self, provider: &str) -> Decimal {
        self.inner
            .read()
            .await
            .per_provider
            .get(provider)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Every provider's running total, unordered.
    pub async fn all_provider_totals(&self) -> HashMap<String, Decimal> {
        self.inner.read().await.per_provider.clone()
    }

    /// Running totals for the last `days` calendar days (UTC), oldest
    /// first, including zero entries for days with no activity.
    pub async fn daily_totals(&self, days: u32) -> Vec<(NaiveDate, Decimal)> {
        let inner = self.inner.read().await;
        let today = Utc::now().date_naive();
        (0..days)
            .rev()
            .map(|offset| {
                let day = today - Duration::days(i64::from(offset));
                let total = inner.per_day.get(&day).copied().unwrap_or(Decimal::ZERO);
                (day, total)
            })
            .collect()
    }

    /// All records created at or after `since`, oldest first.
    pub async fn records_since(&self, since: DateTime<Utc>) -> Vec<CostRecord> {
        self.inner
            .read()
            .await
            .records
            .iter()
            .filter(|r| r.created_at >= since)
            .cloned()
            .collect()
    }

    /// All records for one conversation, in insertion order.
    pub async fn records_for_conversation(&self, conversation_id: &str) -> Vec<CostRecord> {
        self.inner
            .read()
            .await
            .records
            .iter()
            .filter(|r| r.conversation_id.as_str() == conversation_id)
            .cloned()
            .collect()
    }

    /// Every record ever appended, in insertion order. Intended for the
    /// benchmark runner and budget monitor sweeps, not hot-path use.
    pub async fn all_records(&self) -> Vec<CostRecord> {
        self.inner.read().await.records.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use conclave_core::id::{ConversationId, SessionId};
    use conclave_pricing::ProviderPricing;

    fn pricing() -> ProviderPricing {
        ProviderPricing::new(
            "anthropic",
            "claude-3-5-haiku",
            "0.25".parse().unwrap(),
            "1.25".parse().unwrap(),
            200_000,
            Utc::now(),
        )
    }

    fn record(conversation: &str, session: &str, at: DateTime<Utc>) -> CostRecord {
        CostRecord::priced(
            uuid_stub(conversation, session, at),
            SessionId::new(session),
            ConversationId::new(conversation),
            1,
            None,
            &pricing(),
            10_000,
            2_000,
            at,
        )
    }

    fn uuid_stub(a: &str, b: &str, at: DateTime<Utc>) -> String {
        format!("{a}-{b}-{}", at.timestamp_nanos_opt().unwrap_or_default())
    }

    #[tokio::test]
    async fn record_updates_all_aggregates() {
        let ledger = CostLedger::new();
        let now = Utc::now();
        ledger.record(record("conv-1", "sess-1", now)).await;

        let expected = "2.5".parse::<Decimal>().unwrap() + "2.5".parse::<Decimal>().unwrap();
        assert_eq!(ledger.conversation_total("conv-1").await, expected);
        assert_eq!(ledger.session_total("sess-1").await, expected);
        assert_eq!(ledger.daily_total(now.date_naive()).await, expected);
        assert_eq!(ledger.provider_total("anthropic").await, expected);
    }

    #[tokio::test]
    async fn conversation_total_sums_multiple_records() {
        let ledger = CostLedger::new();
        let now = Utc::now();
        ledger.record(record("conv-1", "sess-1", now)).await;
        ledger.record(record("conv-1", "sess-1", now)).await;

        let per_call = "5".parse::<Decimal>().unwrap();
        assert_eq!(ledger.conversation_total("conv-1").await, per_call * Decimal::TWO);
    }

    #[tokio::test]
    async fn records_since_filters_by_time() {
        let ledger = CostLedger::new();
        let now = Utc::now();
        let earlier = now - Duration::hours(2);
        ledger.record(record("conv-1", "sess-1", earlier)).await;
        ledger.record(record("conv-2", "sess-2", now)).await;

        let recent = ledger.records_since(now - Duration::hours(1)).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].conversation_id.as_str(), "conv-2");
    }

    #[tokio::test]
    async fn unknown_keys_total_zero() {
        let ledger = CostLedger::new();
        assert_eq!(ledger.conversation_total("missing").await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn daily_totals_fills_zero_days() {
        let ledger = CostLedger::new();
        let now = Utc::now();
        ledger.record(record("conv-1", "sess-1", now)).await;

        let totals = ledger.daily_totals(3).await;
        assert_eq!(totals.len(), 3);
        assert_eq!(totals.last().unwrap().0, now.date_naive());
        assert!(totals.last().unwrap().1 > Decimal::ZERO);
        assert_eq!(totals[0].1, Decimal::ZERO);
    }

    #[tokio::test]
    async fn all_provider_totals_tracks_every_provider() {
        let ledger = CostLedger::new();
        let now = Utc::now();
        ledger.record(record("conv-1", "sess-1", now)).await;

        let totals = ledger.all_provider_totals().await;
        assert_eq!(totals.len(), 1);
        assert!(totals.contains_key("anthropic"));
    }

    #[tokio::test]
    async fn session_total_cost_matches_sum_of_its_records() {
        let ledger = CostLedger::new();
        let now = Utc::now();
        ledger
            .open_session(SessionId::new("sess-1"), ConversationId::new("conv-1"), "user-1", now)
            .await;
        ledger.record(record("conv-1", "sess-1", now)).await;
        ledger.record(record("conv-1", "sess-1", now)).await;

        let session = ledger.session("sess-1").await.unwrap();
        assert_eq!(session.total_interactions, 2);
        assert_eq!(session.total_cost, ledger.session_total("sess-1").await);
        assert_eq!(session.status, ConversationStatus::Active);
        assert!(session.ended_at.is_none());
    }

    #[tokio::test]
    async fn close_session_sets_status_and_ended_at() {
        let ledger = CostLedger::new();
        let now = Utc::now();
        ledger
            .open_session(SessionId::new("sess-1"), ConversationId::new("conv-1"), "user-1", now)
            .await;
        let closed_at = now + Duration::minutes(5);
        ledger.close_session("sess-1", ConversationStatus::Completed, closed_at).await;

        let session = ledger.session("sess-1").await.unwrap();
        assert_eq!(session.status, ConversationStatus::Completed);
        assert_eq!(session.ended_at, Some(closed_at));
    }

    #[tokio::test]
    async fn unopened_session_is_none() {
        let ledger = CostLedger::new();
        assert!(ledger.session("missing").await.is_none());
    }
}
