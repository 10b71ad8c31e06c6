//! Failure handling, concurrency and lifecycle of the record cache.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tessera_storage::spawn_refresh_task;
use tessera_test_utils::assertions::{assert_ids, assert_store_error};
use tessera_test_utils::fixtures::*;
use tessera_test_utils::{
    CountingObjectStore, FailingObjectStore, HealthStatus, InMemoryObjectStore, ObjectStore,
    StoreError, Versioning,
};

/// memory <- failing <- counting, so counts include failed calls.
fn layered() -> (
    Arc<InMemoryObjectStore>,
    Arc<FailingObjectStore>,
    Arc<CountingObjectStore>,
) {
    let memory = Arc::new(InMemoryObjectStore::plain("test-bucket"));
    let failing = Arc::new(FailingObjectStore::new(memory.clone()));
    let counting = Arc::new(CountingObjectStore::new(failing.clone()));
    (memory, failing, counting)
}

async fn put_widget(store: &dyn ObjectStore, widget: &Widget) {
    store
        .put(&widget_key(&widget.id), serde_json::to_vec(widget).unwrap())
        .await
        .unwrap();
}

// ============================================================================
// FAILURES
// ============================================================================

#[tokio::test]
async fn test_listing_failure_keeps_previous_snapshot() {
    let (_, failing, _) = layered();
    let cache = widget_cache(failing.clone());
    cache.upsert("w1", Widget::new("w1", "foo")).await.unwrap();
    assert_eq!(cache.all().await.unwrap().len(), 1);
    let before = cache.snapshot().unwrap();

    failing.fail_listing(true);
    cache.upsert("w2", Widget::new("w2", "bar")).await.unwrap();

    assert!(cache.refresh().await.unwrap_err().is_transient());
    assert!(Arc::ptr_eq(&before, &cache.snapshot().unwrap()));

    // `all` serves the previous snapshot instead of failing.
    assert_ids(&cache.all().await.unwrap(), &["w1"]);
    assert_eq!(cache.metrics().refresh_failures, 2);

    failing.heal();
    assert_ids(&cache.all().await.unwrap(), &["w1", "w2"]);
}

#[tokio::test]
async fn test_listing_failure_without_snapshot_is_an_error() {
    let (_, failing, _) = layered();
    let cache = widget_cache(failing.clone());
    failing.fail_listing(true);
    assert!(cache.all().await.unwrap_err().is_transient());
}

#[tokio::test]
async fn test_item_failure_keeps_previous_value() {
    let (memory, failing, _) = layered();
    let cache = widget_cache(failing.clone());
    for id in ["a", "b"] {
        put_widget(memory.as_ref(), &Widget::new(id, "v1")).await;
    }
    cache.refresh().await.unwrap();

    for id in ["a", "b"] {
        put_widget(memory.as_ref(), &Widget::new(id, "v2")).await;
    }
    put_widget(memory.as_ref(), &Widget::new("c", "v1")).await;
    failing.fail_get_of(widget_key("a"));
    failing.fail_get_of(widget_key("c"));

    let snapshot = cache.refresh().await.unwrap();
    assert_eq!(snapshot.get("a").unwrap().record.name, "v1");
    assert_eq!(snapshot.get("b").unwrap().record.name, "v2");
    assert!(!snapshot.contains("c"));
    assert_eq!(cache.metrics().fetch_failures, 2);

    // Still newer remotely, so the next refresh retries.
    failing.heal();
    let snapshot = cache.refresh().await.unwrap();
    assert_eq!(snapshot.get("a").unwrap().record.name, "v2");
    assert!(snapshot.contains("c"));
}

#[tokio::test]
async fn test_marker_read_failure_counts_as_stale() {
    let (_, failing, counting) = layered();
    let cache = widget_cache(counting.clone());
    cache.upsert("w1", Widget::new("w1", "foo")).await.unwrap();
    cache.all().await.unwrap();

    failing.fail_marker_reads(true);
    counting.reset();
    assert_eq!(cache.all().await.unwrap().len(), 1);
    assert_eq!(counting.calls().list, 1);
}

#[tokio::test]
async fn test_corrupt_record_is_dropped() {
    let (memory, _, _) = layered();
    let cache = widget_cache(memory.clone());
    put_widget(memory.as_ref(), &Widget::new("ok", "x")).await;
    memory
        .put(&widget_key("bad"), b"{ not json".to_vec())
        .await
        .unwrap();

    assert_ids(&cache.refresh().await.unwrap().records(), &["ok"]);
    assert!(cache.find_by_id("bad").await.unwrap_err().is_corrupt());
}

// ============================================================================
// WRITES
// ============================================================================

#[tokio::test]
async fn test_bulk_failure_names_ids_and_still_marks() {
    let (memory, failing, _) = layered();
    let cache = widget_cache(failing.clone());
    cache.all().await.unwrap();
    failing.fail_put_of(widget_key("w3"));

    let widgets = (1..=5)
        .map(|i| Widget::new(format!("w{i}"), "x"))
        .collect::<Vec<_>>();
    let err = cache.bulk_upsert(widgets).await.unwrap_err();
    assert_store_error(&err, |e| {
        matches!(e, StoreError::BulkFailed { failed, .. } if failed == &vec!["w3".to_string()])
    });

    assert!(memory.get(WIDGET_MARKER_KEY).await.unwrap().is_some());
    assert_ids(&cache.all().await.unwrap(), &["w1", "w2", "w4", "w5"]);
}

#[tokio::test]
async fn test_bulk_upsert_touches_marker_once() {
    let (_, _, counting) = layered();
    let cache = widget_cache(counting.clone());
    let widgets = (0..12)
        .map(|i| Widget::new(format!("w{i}"), "x"))
        .collect::<Vec<_>>();

    let report = cache.bulk_upsert(widgets).await.unwrap();
    assert_eq!(report.succeeded, 12);
    assert_eq!(counting.calls().put, 13);
}

#[tokio::test]
async fn test_read_only_store_rejects_writes() {
    let (memory, _, _) = layered();
    let cache = widget_cache_with(memory.clone(), test_config().with_read_only(true));

    let err = cache.upsert("w1", Widget::new("w1", "x")).await.unwrap_err();
    assert_store_error(&err, |e| matches!(e, StoreError::ReadOnly { .. }));
    assert!(memory.is_empty());

    // Reads still work.
    put_widget(memory.as_ref(), &Widget::new("w2", "y")).await;
    assert_ids(&cache.all().await.unwrap(), &["w2"]);
}

#[tokio::test]
async fn test_history_of_one_skips_version_listing() {
    let memory = Arc::new(InMemoryObjectStore::versioned("test-bucket"));
    let counting = Arc::new(CountingObjectStore::new(memory));
    let cache = widget_cache(counting.clone());
    assert!(cache.supports_versioning());

    for name in ["a", "b", "c"] {
        cache.upsert("w1", Widget::new("w1", name)).await.unwrap();
    }

    let current = cache.history("w1", 1).await.unwrap();
    assert_eq!(current[0].name, "c");
    assert_eq!(counting.calls().list_versions, 0);

    let names: Vec<String> = cache
        .history("w1", 10)
        .await
        .unwrap()
        .into_iter()
        .map(|w| w.name)
        .collect();
    assert_eq!(names, vec!["c", "b", "a"]);
    assert_eq!(counting.calls().list_versions, 1);
}

#[tokio::test]
async fn test_snapshot_backend_snapshots_before_overwrite() {
    let memory = Arc::new(InMemoryObjectStore::new("test-bucket", Versioning::Snapshot));
    let counting = Arc::new(CountingObjectStore::new(memory));
    let cache = widget_cache(counting.clone());

    cache.upsert("w1", Widget::new("w1", "a")).await.unwrap();
    cache.upsert("w1", Widget::new("w1", "b")).await.unwrap();
    assert_eq!(counting.calls().snapshot, 2);

    let history = cache.history("w1", 10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].name, "a");
}

// ============================================================================
// CONCURRENCY AND LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_concurrent_refreshes_share_one_listing() {
    let (memory, failing, counting) = layered();
    for i in 0..8 {
        put_widget(memory.as_ref(), &Widget::new(format!("w{i}"), "x")).await;
    }
    failing.delay_gets(Some(Duration::from_millis(30)));
    let cache = widget_cache(counting.clone());

    let results = join_all((0..5).map(|_| cache.refresh())).await;
    for result in &results {
        assert_eq!(result.as_ref().unwrap().len(), 8);
    }
    assert_eq!(counting.calls().list, 1);
    assert_eq!(cache.metrics().joined_refreshes, 4);
    assert_eq!(cache.metrics().refresh_cycles, 1);
}

#[tokio::test]
async fn test_concurrent_refreshes_share_one_failure() {
    let (_, failing, counting) = layered();
    failing.fail_listing(true);
    failing.delay_listing(Some(Duration::from_millis(50)));
    let cache = widget_cache(counting.clone());

    let started = std::time::Instant::now();
    let results = join_all((0..5).map(|_| cache.all())).await;
    for result in &results {
        assert!(result.as_ref().unwrap_err().is_transient());
    }
    assert_eq!(counting.calls().list, 1);
    assert_eq!(cache.metrics().joined_refreshes, 4);
    assert_eq!(cache.metrics().refresh_failures, 1);
    assert!(started.elapsed() < Duration::from_millis(200));

    // The next caller retries instead of reusing the old failure.
    failing.heal();
    assert!(cache.all().await.unwrap().is_empty());
    assert_eq!(counting.calls().list, 2);
}

#[tokio::test]
async fn test_shutdown_abandons_slow_refresh() {
    let (memory, failing, _) = layered();
    put_widget(memory.as_ref(), &Widget::new("slow", "x")).await;
    failing.delay_gets(Some(Duration::from_secs(30)));
    let cache = widget_cache(failing.clone());

    let refresh = tokio::spawn({
        let cache = cache.clone();
        async move { cache.refresh().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    cache.shutdown();

    let result = tokio::time::timeout(Duration::from_secs(2), refresh)
        .await
        .expect("refresh finished within the grace period")
        .unwrap();
    assert!(result.unwrap_err().is_abandoned());
    assert!(!cache.snapshot().unwrap().is_populated());
}

#[tokio::test]
async fn test_health_follows_refreshes() {
    let (_, failing, _) = layered();
    let cache = widget_cache_with(
        failing.clone(),
        test_config().with_health_interval(Duration::from_millis(40)),
    );
    assert_eq!(cache.health().status, HealthStatus::Degraded);

    cache.refresh().await.unwrap();
    assert!(cache.is_healthy());
    assert!(cache.health().last_refreshed_at.is_some());

    failing.fail_listing(true);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(cache.refresh().await.is_err());
    let check = cache.health();
    assert_eq!(check.status, HealthStatus::Degraded);
    assert!(check.message.unwrap().contains("no refresh completed"));

    failing.heal();
    cache.refresh().await.unwrap();
    assert!(cache.is_healthy());
}

#[tokio::test]
async fn test_background_task_refreshes_and_stops() {
    let (memory, _, _) = layered();
    let cache = widget_cache(memory.clone());
    let task = spawn_refresh_task(cache.clone());

    let writer = widget_cache(memory.clone());
    writer.upsert("w1", Widget::new("w1", "foo")).await.unwrap();

    let mut seen = false;
    for _ in 0..80 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if cache.snapshot().unwrap().contains("w1") {
            seen = true;
            break;
        }
    }
    assert!(seen, "background refresh never picked up w1");

    // Nothing changes: ticks are skipped, and the cache stays healthy.
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(cache.is_healthy());

    cache.shutdown();
    let metrics = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .unwrap()
        .unwrap();
    assert!(metrics.refresh_cycles >= 1);
    assert!(metrics.skipped_cycles >= 1);
}

#[tokio::test]
async fn test_background_task_keeps_running_after_failed_ticks() {
    let (memory, failing, _) = layered();
    put_widget(memory.as_ref(), &Widget::new("w1", "foo")).await;
    failing.fail_listing(true);
    let cache = widget_cache(failing.clone());
    let task = spawn_refresh_task(cache.clone());

    let mut failures = 0;
    for _ in 0..80 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        failures = cache.metrics().refresh_failures;
        if failures >= 2 {
            break;
        }
    }
    assert!(failures >= 2, "scheduled refreshes never ran");
    assert!(!task.is_finished());

    failing.heal();
    let mut seen = false;
    for _ in 0..80 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if cache.snapshot().unwrap().contains("w1") {
            seen = true;
            break;
        }
    }
    assert!(seen, "task stopped retrying after failures");

    cache.shutdown();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .unwrap()
        .unwrap();
}
