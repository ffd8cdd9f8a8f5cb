use conclave_memory::{MemoryEntry, MemoryFilters, MemoryStore, MemoryType, RagConfig, RagRetriever};
use std::sync::Arc;

fn entry(id: &str, content: &str, user_id: &str) -> MemoryEntry {
    let mut e = MemoryEntry::new(id, MemoryType::Knowledge, content, 0.5, chrono::Utc::now());
    e.user_id = Some(user_id.to_string());
    e
}

#[tokio::test]
async fn put_then_by_type_roundtrips() {
    let store = MemoryStore::new();
    store.put(entry("a", "the deploy runbook", "u1")).await.unwrap();

    let found = store.by_type(MemoryType::Knowledge, &MemoryFilters::none(), 10).await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "a");
}

#[tokio::test]
async fn by_type_respects_user_filter() {
    let store = MemoryStore::new();
    store.put(entry("a", "alice's note", "u1")).await.unwrap();
    store.put(entry("b", "bob's note", "u2")).await.unwrap();

    let filters = MemoryFilters {
        user_id: Some("u1".to_string()),
        ..MemoryFilters::none()
    };
    let found = store.by_type(MemoryType::Knowledge, &filters, 10).await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "a");
}

#[tokio::test]
async fn put_is_an_upsert() {
    let store = MemoryStore::new();
    store.put(entry("a", "first version", "u1")).await.unwrap();
    store.put(entry("a", "second version", "u1")).await.unwrap();

    assert_eq!(store.len().await, 1);
    let found = store.by_type(MemoryType::Knowledge, &MemoryFilters::none(), 10).await;
    assert_eq!(found[0].content, "second version");
}

#[tokio::test]
async fn search_ranks_by_cosine_similarity() {
    let store = MemoryStore::new();
    let mut exact = entry("exact", "matches the query vector", "u1");
    exact.embedding = Some(vec![1.0, 0.0]);
    let mut orthogonal = entry("orthogonal", "unrelated", "u1");
    orthogonal.embedding = Some(vec![0.0, 1.0]);
    store.put(exact).await.unwrap();
    store.put(orthogonal).await.unwrap();

    let results = store.search(&[1.0, 0.0], &MemoryFilters::none(), 10, 0.5).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "exact");
}

#[tokio::test]
async fn concurrent_writes_to_different_ids() {
    let store = Arc::new(MemoryStore::new());
    let mut handles = vec![];
    for i in 0..10 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.put(entry(&format!("k{i}"), "content", "u1")).await.unwrap();
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    assert_eq!(store.len().await, 10);
}

#[tokio::test]
async fn rag_retriever_builds_context_from_a_shared_store() {
    let store = Arc::new(MemoryStore::new());
    store.put(entry("a", "the database migration ran at midnight", "u1")).await.unwrap();
    store.put(entry("b", "unrelated weather chat", "u1")).await.unwrap();

    let retriever = RagRetriever::new(store, RagConfig::default());
    let block = retriever
        .build_context("u1", "agent-1", "database migration", &[], 5, 0.0)
        .await
        .expect("non-empty context");
    assert!(block.text.contains("migration"));
}

#[tokio::test]
async fn rag_retriever_degrades_to_none_on_an_empty_store() {
    let store = Arc::new(MemoryStore::new());
    let retriever = RagRetriever::new(store, RagConfig::default());
    let block = retriever.build_context("u1", "agent-1", "anything", &[], 5, 0.0).await;
    assert!(block.is_none());
}
