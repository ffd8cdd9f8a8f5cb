//! In-memory, typed store of [`MemoryEntry`] values.

use crate::entry::{matches_filters, MemoryEntry, MemoryFilters};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors raised by [`MemoryStore`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The entry's embedding dimension does not match the store's fixed
    /// dimension (set on the first entry written, or via [`MemoryStore::with_dim`]).
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimMismatch {
        /// The store's fixed dimension.
        expected: usize,
        /// The dimension of the rejected embedding.
        actual: usize,
    },
}

/// In-memory store of [`MemoryEntry`] records, behind a `RwLock<HashMap<_>>` —
/// the same interior-mutability idiom used throughout this workspace's other
/// in-memory backends.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, MemoryEntry>>,
    dim: RwLock<Option<usize>>,
    retention: ChronoDuration,
}

impl MemoryStore {
    /// Create an empty store. Embedding dimension is learned from the first
    /// entry written with a non-`None` embedding.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            dim: RwLock::new(None),
            retention: ChronoDuration::days(30),
        }
    }

    /// Create an empty store with a fixed embedding dimension and retention
    /// window (used by [`MemoryStore::purge`]).
    pub fn with_dim(dim: usize, retention: ChronoDuration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            dim: RwLock::new(Some(dim)),
            retention,
        }
    }

    /// Upsert an entry by `id`. If `embedding` is `None`, the caller is
    /// expected to have already generated one via the embedding interface —
    /// this store does not call out to an embedding provider itself.
    pub async fn put(&self, entry: MemoryEntry) -> Result<(), MemoryError> {
        if let Some(embedding) = &entry.embedding {
            let mut dim_guard = self.dim.write().await;
            match *dim_guard {
                Some(expected) if expected != embedding.len() => {
                    return Err(MemoryError::DimMismatch {
                        expected,
                        actual: embedding.len(),
                    });
                }
                None => *dim_guard = Some(embedding.len()),
                _ => {}
            }
        }
        let mut entries = self.entries.write().await;
        entries.insert(entry.id.clone(), entry);
        Ok(())
    }

    /// Top-k entries by cosine similarity to `query_embedding`, at or above
    /// `threshold`, restricted by `filters`. Entries without an embedding are
    /// skipped. Matching entries are touched (access_count incremented).
    pub async fn search(
        &self,
        query_embedding: &[f32],
        filters: &MemoryFilters,
        k: usize,
        threshold: f64,
    ) -> Vec<MemoryEntry> {
        let entries = self.entries.read().await;
        let mut scored: Vec<(f64, MemoryEntry)> = entries
            .values()
            .filter(|e| matches_filters(e, filters))
            .filter_map(|e| {
                let emb = e.embedding.as_ref()?;
                let score = cosine_similarity(query_embedding, emb);
                if score >= threshold {
                    Some((score, e.clone()))
                } else {
                    None
                }
            })
            .collect();
        drop(entries);
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(k);
        let ids: Vec<String> = scored.iter().map(|(_, e)| e.id.clone()).collect();
        for id in &ids {
            self.touch(id).await;
        }
        scored.into_iter().map(|(_, e)| e).collect()
    }

    /// Non-vector scan by memory type and filters, most-recently-accessed
    /// first, truncated to `k`. Matches are touched.
    pub async fn by_type(
        &self,
        memory_type: crate::entry::MemoryType,
        filters: &MemoryFilters,
        k: usize,
    ) -> Vec<MemoryEntry> {
        let mut type_filters = filters.clone();
        type_filters.memory_type = Some(memory_type);
        let entries = self.entries.read().await;
        let mut matched: Vec<MemoryEntry> = entries
            .values()
            .filter(|e| matches_filters(e, &type_filters))
            .cloned()
            .collect();
        drop(entries);
        matched.sort_by(|a, b| b.last_accessed.cmp(&a.last_accessed));
        matched.truncate(k);
        let ids: Vec<String> = matched.iter().map(|e| e.id.clone()).collect();
        for id in &ids {
            self.touch(id).await;
        }
        matched
    }

    /// Increment `access_count` and bump `last_accessed` to now. No-op if
    /// the id is unknown.
    pub async fn touch(&self, id: &str) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(id) {
            entry.access_count += 1;
            entry.last_accessed = Utc::now();
        }
    }

    /// Delete entries that are past `expires_at`, or are older than the
    /// retention window and have `importance_score < 0.5`. Returns the
    /// number of entries removed.
    pub async fn purge(&self) -> usize {
        self.purge_at(Utc::now()).await
    }

    /// `purge` with an explicit `now`, for deterministic tests.
    pub async fn purge_at(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.retention;
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| {
            let expired = e.expires_at.is_some_and(|exp| exp < now);
            let stale_and_unimportant = e.created_at < cutoff && e.importance_score < 0.5;
            !(expired || stale_and_unimportant)
        });
        before - entries.len()
    }

    /// Number of entries currently stored.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store has no entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
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
