//! `MemoryEntry` — a typed piece of recallable content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of content a memory entry holds. Drives filtering in
/// [`crate::MemoryStore::by_type`] and the RAG retriever's per-type fetch.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// A turn or exchange worth recalling verbatim.
    Conversation,
    /// Ambient context accumulated during a session.
    Context,
    /// A fact the system was told or derived.
    Knowledge,
    /// A stated user preference.
    Preference,
    /// A relationship between entities (user, agent, topic).
    Relationship,
    /// A reference document or excerpt.
    Document,
}

/// A typed, embeddable, recallable piece of content.
///
/// Invariants: embedding dimensionality is identical for every entry in a
/// deployment (enforced at [`crate::MemoryStore::put`]); `access_count` is
/// monotonically non-decreasing for a given `id`.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique identifier; `put` upserts by this field.
    pub id: String,
    /// What kind of content this is.
    pub memory_type: MemoryType,
    /// The recallable text.
    pub content: String,
    /// Fixed-dimension embedding vector. `None` until the store (or the
    /// embedding interface) fills it in on write.
    pub embedding: Option<Vec<f32>>,
    /// Free-form key-value metadata.
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// The user this entry is scoped to, if any.
    pub user_id: Option<String>,
    /// The agent this entry is scoped to, if any.
    pub agent_id: Option<String>,
    /// The conversation this entry was recorded in, if any.
    pub conversation_id: Option<String>,
    /// Importance in [0, 1]. Used by recency/purge and RAG composite scoring.
    pub importance_score: f64,
    /// Number of times this entry has been retrieved. Never decreases.
    pub access_count: u64,
    /// When this entry was first written.
    pub created_at: DateTime<Utc>,
    /// When this entry was last retrieved via `search`/`by_type`/`touch`.
    pub last_accessed: DateTime<Utc>,
    /// Optional expiry. Past-expiry entries are eligible for `purge`.
    pub expires_at: Option<DateTime<Utc>>,
}

impl MemoryEntry {
    /// Build a new entry with `created_at`/`last_accessed` set to `now` and
    /// `access_count` at zero.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        memory_type: MemoryType,
        content: impl Into<String>,
        importance_score: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            memory_type,
            content: content.into(),
            embedding: None,
            metadata: serde_json::Value::Null,
            user_id: None,
            agent_id: None,
            conversation_id: None,
            importance_score: importance_score.clamp(0.0, 1.0),
            access_count: 0,
            created_at: now,
            last_accessed: now,
            expires_at: None,
        }
    }

    /// Normalized content key used for RAG dedup: lowercased, whitespace
    /// collapsed, truncated to 256 chars.
    pub fn dedup_key(&self) -> String {
        let collapsed: String = self
            .content
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        collapsed.chars().take(256).collect()
    }
}

/// Filters applied when searching or scanning a [`crate::MemoryStore`].
#[non_exhaustive]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryFilters {
    /// Restrict to entries for this user.
    pub user_id: Option<String>,
    /// Restrict to entries tied to this conversation.
    pub conversation_id: Option<String>,
    /// Restrict to entries of this memory type.
    pub memory_type: Option<MemoryType>,
}

impl MemoryFilters {
    /// No restrictions — matches every entry.
    pub fn none() -> Self {
        Self::default()
    }

    fn matches(&self, entry: &MemoryEntry) -> bool {
        if let Some(uid) = &self.user_id {
            if entry.user_id.as_deref() != Some(uid.as_str()) {
                return false;
            }
        }
        if let Some(cid) = &self.conversation_id {
            if entry.conversation_id.as_deref() != Some(cid.as_str()) {
                return false;
            }
        }
        if let Some(mt) = self.memory_type {
            if entry.memory_type != mt {
                return false;
            }
        }
        true
    }
}

pub(crate) fn matches_filters(entry: &MemoryEntry, filters: &MemoryFilters) -> bool {
    filters.matches(entry)
}
