//! RAG context assembly on top of a [`crate::MemoryStore`].

use crate::entry::{MemoryEntry, MemoryFilters, MemoryType};
use crate::store::MemoryStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use tokio::sync::RwLock;

/// Weights and knobs for [`RagRetriever::build_context`]. Weights must sum
/// to 1.0; [`RagConfig::default`] uses the documented 0.3/0.4/0.3 split.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RagConfig {
    /// Weight on the similarity-to-query term.
    pub relevance_weight: f64,
    /// Weight on the entry's stored importance.
    pub importance_weight: f64,
    /// Weight on recency (exponential decay over `recency_tau`).
    pub recency_weight: f64,
    /// Recency half-life-style time constant, default 72 hours.
    pub recency_tau: chrono::Duration,
    /// Cache entry TTL, capped at 15 minutes per the retrieval contract.
    pub cache_ttl: chrono::Duration,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            relevance_weight: 0.3,
            importance_weight: 0.4,
            recency_weight: 0.3,
            recency_tau: chrono::Duration::hours(72),
            cache_ttl: chrono::Duration::minutes(15),
        }
    }
}

impl RagConfig {
    /// Validate that the three weights sum to 1.0 (within floating point
    /// tolerance) and the cache TTL does not exceed the 15-minute ceiling.
    pub fn validate(&self) -> bool {
        let sum = self.relevance_weight + self.importance_weight + self.recency_weight;
        (sum - 1.0).abs() < 1e-6 && self.cache_ttl <= chrono::Duration::minutes(15)
    }
}

/// A single scored context item, as assembled by [`RagRetriever::build_context`].
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagItem {
    /// The recalled text.
    pub content: String,
    /// Similarity of the query to this entry's embedding, in [0, 1].
    pub relevance_score: f64,
    /// The entry's stored importance, in [0, 1].
    pub importance_score: f64,
    /// Recency decay score, in [0, 1].
    pub recency_score: f64,
    /// Weighted combination of the three scores above, in [0, 1].
    pub composite_score: f64,
    /// The agent this entry originated from, if any.
    pub source_agent: Option<String>,
    /// The entry's memory type.
    pub memory_type: MemoryType,
    /// When the entry was created.
    pub timestamp: DateTime<Utc>,
}

/// The assembled context returned by [`RagRetriever::build_context`], or
/// `None` when no candidate cleared the threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBlock {
    /// Items that made it into the block, in descending composite-score order.
    pub items: Vec<RagItem>,
    /// Items concatenated with a stable separator, ready to splice into a
    /// prompt.
    pub text: String,
}

impl ContextBlock {
    const SEPARATOR: &'static str = "\n---\n";

    fn from_items(items: Vec<RagItem>) -> Self {
        let text = items
            .iter()
            .map(|i| i.content.as_str())
            .collect::<Vec<_>>()
            .join(Self::SEPARATOR);
        Self { items, text }
    }
}

struct CacheEntry {
    block: Option<ContextBlock>,
    expires_at: DateTime<Utc>,
}

/// Builds scored, deduplicated [`ContextBlock`]s on top of a [`MemoryStore`],
/// caching by `(user_id, agent_id, hash(query), k, threshold)`.
///
/// `build_context` never raises: a store failure or an empty candidate set
/// both degrade to `None`, matching the retrieval contract's "degrade, don't
/// fail" rule.
pub struct RagRetriever {
    store: std::sync::Arc<MemoryStore>,
    config: RagConfig,
    cache: RwLock<HashMap<u64, CacheEntry>>,
}

impl RagRetriever {
    /// Create a retriever over `store` with the given config. Falls back to
    /// `RagConfig::default()` behavior's weights if `config` does not
    /// validate (callers should call [`RagConfig::validate`] up front).
    pub fn new(store: std::sync::Arc<MemoryStore>, config: RagConfig) -> Self {
        Self {
            store,
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn cache_key(user_id: &str, agent_id: &str, query: &str, k: usize, threshold_bits: u64) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        user_id.hash(&mut hasher);
        agent_id.hash(&mut hasher);
        query.hash(&mut hasher);
        k.hash(&mut hasher);
        threshold_bits.hash(&mut hasher);
        hasher.finish()
    }

    /// Build (or return cached) context for `(user_id, agent_id, query)`.
    ///
    /// `query_embedding` is the caller-computed embedding of `query` (via
    /// the embedding interface, §6); if embedding computation upstream
    /// failed, pass an empty slice — relevance then falls back to keyword
    /// Jaccard similarity against `query` text.
    pub async fn build_context(
        &self,
        user_id: &str,
        agent_id: &str,
        query: &str,
        query_embedding: &[f32],
        k: usize,
        threshold: f64,
    ) -> Option<ContextBlock> {
        let key = Self::cache_key(user_id, agent_id, query, k, threshold.to_bits());
        let now = Utc::now();
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(&key) {
                if cached.expires_at > now {
                    return cached.block.clone();
                }
            }
        }

        let block = self
            .build_context_uncached(user_id, agent_id, query, query_embedding, k, threshold, now)
            .await;

        let mut cache = self.cache.write().await;
        cache.insert(
            key,
            CacheEntry {
                block: block.clone(),
                expires_at: now + self.config.cache_ttl,
            },
        );
        block
    }

    async fn build_context_uncached(
        &self,
        user_id: &str,
        agent_id: &str,
        query: &str,
        query_embedding: &[f32],
        k: usize,
        threshold: f64,
        now: DateTime<Utc>,
    ) -> Option<ContextBlock> {
        let filters = MemoryFilters {
            user_id: Some(user_id.to_string()),
            conversation_id: None,
            memory_type: None,
        };

        let mut candidates: Vec<MemoryEntry> = self
            .store
            .search(query_embedding, &filters, k * 4, 0.0)
            .await;
        for memory_type in [
            MemoryType::Conversation,
            MemoryType::Context,
            MemoryType::Knowledge,
            MemoryType::Preference,
            MemoryType::Relationship,
            MemoryType::Document,
        ] {
            candidates.extend(self.store.by_type(memory_type, &filters, k).await);
        }

        if candidates.is_empty() {
            return None;
        }

        let scored: Vec<(String, RagItem)> = candidates
            .iter()
            .map(|entry| (entry.dedup_key(), self.score(entry, query, query_embedding, now)))
            .filter(|(_, item)| item.composite_score >= threshold)
            .collect();

        // Deduplicate by normalized content, keeping the highest composite per group.
        let mut best: HashMap<String, RagItem> = HashMap::new();
        for (dedup_key, item) in scored {
            best.entry(dedup_key)
                .and_modify(|existing| {
                    if item.composite_score > existing.composite_score {
                        *existing = item.clone();
                    }
                })
                .or_insert(item);
        }

        let mut items: Vec<RagItem> = best.into_values().collect();
        items.sort_by(|a, b| b.composite_score.total_cmp(&a.composite_score));
        items.truncate(k);

        if items.is_empty() {
            None
        } else {
            let _ = agent_id;
            Some(ContextBlock::from_items(items))
        }
    }

    fn score(
        &self,
        entry: &MemoryEntry,
        query: &str,
        query_embedding: &[f32],
        now: DateTime<Utc>,
    ) -> RagItem {
        let relevance = match &entry.embedding {
            Some(emb) if !query_embedding.is_empty() => cosine_similarity(query_embedding, emb),
            _ => jaccard_similarity(query, &entry.content),
        };
        let recency = match entry.created_at {
            created_at => {
                let delta = (now - created_at).num_seconds().max(0) as f64;
                let tau = self.config.recency_tau.num_seconds().max(1) as f64;
                (-delta / tau).exp()
            }
        };
        let importance = entry.importance_score.clamp(0.0, 1.0);
        let composite = (self.config.relevance_weight * relevance.clamp(0.0, 1.0))
            + (self.config.importance_weight * importance)
            + (self.config.recency_weight * recency.clamp(0.0, 1.0));
        RagItem {
            content: entry.content.clone(),
            relevance_score: relevance.clamp(0.0, 1.0),
            importance_score: importance,
            recency_score: recency.clamp(0.0, 1.0),
            composite_score: composite.clamp(0.0, 1.0),
            source_agent: entry.agent_id.clone(),
            memory_type: entry.memory_type,
            timestamp: entry.created_at,
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)) as f64
}

fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let set_a: std::collections::HashSet<&str> = a.split_whitespace().collect();
    let set_b: std::collections::HashSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count() as f64;
    let union = set_a.union(&set_b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::MemoryEntry;
    use std::sync::Arc;

    #[test]
    fn default_weights_sum_to_one() {
        assert!(RagConfig::default().validate());
    }

    #[tokio::test]
    async fn build_context_returns_none_when_store_is_empty() {
        let store = Arc::new(MemoryStore::new());
        let retriever = RagRetriever::new(store, RagConfig::default());
        let result = retriever
            .build_context("u1", "a1", "hello", &[], 5, 0.0)
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn build_context_deduplicates_by_normalized_content() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let mut e1 = MemoryEntry::new("a", MemoryType::Knowledge, "The Sky Is Blue", 0.9, now);
        e1.user_id = Some("u1".into());
        let mut e2 = MemoryEntry::new("b", MemoryType::Knowledge, "the sky is blue", 0.1, now);
        e2.user_id = Some("u1".into());
        store.put(e1).await.unwrap();
        store.put(e2).await.unwrap();

        let retriever = RagRetriever::new(store, RagConfig::default());
        let block = retriever
            .build_context("u1", "a1", "sky", &[], 5, 0.0)
            .await
            .expect("context");
        assert_eq!(block.items.len(), 1);
        assert_eq!(block.items[0].importance_score, 0.9);
    }

    #[tokio::test]
    async fn build_context_is_cached_on_second_call() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let mut e1 = MemoryEntry::new("a", MemoryType::Knowledge, "hello there", 0.9, now);
        e1.user_id = Some("u1".into());
        store.put(e1).await.unwrap();

        let retriever = RagRetriever::new(store.clone(), RagConfig::default());
        let first = retriever.build_context("u1", "a1", "hello", &[], 5, 0.0).await;
        let before_access_count = store.len().await;
        let second = retriever.build_context("u1", "a1", "hello", &[], 5, 0.0).await;
        assert_eq!(first.map(|b| b.text), second.map(|b| b.text));
        assert_eq!(store.len().await, before_access_count);
    }
}
