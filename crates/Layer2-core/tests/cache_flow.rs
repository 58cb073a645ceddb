//! End-to-end flow through the cache layer, against both store backends.

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use toolcache_core::{
    CacheConfig, CacheEntry, CacheLayer, CacheStore, MemoryStore, PreDecision, SqliteStore,
    ToolResultEvent, ToolUseEvent,
};
use toolcache_foundation::store::now_ms;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// The canonical read / cache / mutate / re-read cycle
async fn exercise_end_to_end(layer: Arc<CacheLayer>) {
    let (pre, post) = Arc::clone(&layer).hooks();
    let read_a = json!({"path": "/a.txt"});
    let read_b = json!({"path": "/b.txt"});

    // First read of /a.txt misses and proceeds
    let decision = pre(ToolUseEvent::new("call-1", "read", read_a.clone())).await;
    assert_eq!(decision, PreDecision::Miss);

    // The tool ran; its result is stored
    post(ToolResultEvent::succeeded(
        "call-1",
        "read",
        read_a.clone(),
        json!("contents of a"),
    ))
    .await;

    // Cache /b.txt too
    pre(ToolUseEvent::new("call-2", "read", read_b.clone())).await;
    post(ToolResultEvent::succeeded(
        "call-2",
        "read",
        read_b.clone(),
        json!("contents of b"),
    ))
    .await;

    // Identical second read hits, with the served count reflecting this read
    match pre(ToolUseEvent::new("call-3", "read", read_a.clone())).await {
        PreDecision::Hit { value, hits } => {
            assert_eq!(value, json!("contents of a"));
            assert_eq!(hits, 1);
        }
        other => panic!("expected hit, got {:?}", other),
    }

    // A write to /a.txt invalidates only that path
    post(ToolResultEvent::succeeded(
        "call-4",
        "write",
        json!({"path": "/a.txt", "content": "rewritten"}),
        json!("ok"),
    ))
    .await;

    assert_eq!(
        pre(ToolUseEvent::new("call-5", "read", read_a.clone())).await,
        PreDecision::Miss
    );
    assert!(matches!(
        pre(ToolUseEvent::new("call-6", "read", read_b.clone())).await,
        PreDecision::Hit { .. }
    ));

    let stats = layer.stats().await.unwrap();
    assert!(stats.hit_count >= 2);
    assert!(stats.miss_count >= 2);
}

#[tokio::test]
async fn end_to_end_memory_store() {
    init_tracing();
    exercise_end_to_end(Arc::new(CacheLayer::new())).await;
}

#[tokio::test]
async fn end_to_end_sqlite_store() {
    init_tracing();
    let store: Arc<dyn CacheStore> = Arc::new(SqliteStore::in_memory().unwrap());
    let layer = Arc::new(CacheLayer::with_store(store, CacheConfig::default()));
    exercise_end_to_end(layer).await;
}

#[tokio::test]
async fn concurrent_invocations_do_not_cross_talk() {
    init_tracing();
    let layer = Arc::new(CacheLayer::new());
    let input = json!({"path": "/shared.txt"});

    // Many concurrent invocations of the same tool with the same input, all
    // missing at pre-execution, each correlated by its own invocation id.
    let mut handles = Vec::new();
    for i in 0..16u64 {
        let layer = Arc::clone(&layer);
        let input = input.clone();
        handles.push(tokio::spawn(async move {
            let id = Uuid::new_v4().to_string();
            let decision = layer.on_pre_tool_use(&id, "read", &input).await;
            // Stagger completions so they land out of order
            tokio::time::sleep(std::time::Duration::from_millis((16 - i) % 5)).await;
            layer
                .on_post_tool_use(&id, "read", &input, Some(&json!(i)), true)
                .await;
            decision
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    // Every pending lookup was consumed exactly once
    assert_eq!(layer.pending_count(), 0);

    // Exactly one live entry under the shared key
    let stats = layer.stats().await.unwrap();
    assert_eq!(stats.entries_by_tool.get("read"), Some(&1));
}

/// Both backends give identical answers to the same call sequence
#[tokio::test]
async fn backends_answer_identically() {
    init_tracing();
    let memory: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let sqlite: Arc<dyn CacheStore> = Arc::new(SqliteStore::in_memory().unwrap());

    for store in [&memory, &sqlite] {
        store
            .set(CacheEntry::new("read:a", "read", json!("A"), 60_000))
            .await
            .unwrap();
        store
            .set(CacheEntry::new("glob:a", "glob", json!(["x", "y"]), 60_000))
            .await
            .unwrap();

        let got = store.get("read:a").await.unwrap().unwrap();
        assert_eq!(got.value, json!("A"));
        assert_eq!(got.hits, 1);
        assert!(store.get("missing").await.unwrap().is_none());

        assert!(store.delete("glob:a").await.unwrap());
        assert!(!store.delete("glob:a").await.unwrap());

        assert_eq!(store.clear(Some("read")).await.unwrap(), 1);
        assert_eq!(store.clear(None).await.unwrap(), 0);
    }
}

/// TTL boundary behavior is identical through the shared contract
#[tokio::test]
async fn ttl_boundary_on_both_backends() {
    init_tracing();
    let memory: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let sqlite: Arc<dyn CacheStore> = Arc::new(SqliteStore::in_memory().unwrap());

    for store in [&memory, &sqlite] {
        let mut fresh = CacheEntry::new("read:fresh", "read", json!("v"), 1000);
        fresh.stored_at = now_ms() - 900;
        store.set(fresh).await.unwrap();

        let mut stale = CacheEntry::new("read:stale", "read", json!("v"), 1000);
        stale.stored_at = now_ms() - 1001;
        store.set(stale).await.unwrap();

        assert!(store.get("read:fresh").await.unwrap().is_some());
        assert!(store.get("read:stale").await.unwrap().is_none());
    }
}
