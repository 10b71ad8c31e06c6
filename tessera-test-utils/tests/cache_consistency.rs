//! Consistency properties of the record cache against in-memory stores.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use proptest::prelude::*;
use tessera_test_utils::assertions::{assert_ids, ids_of};
use tessera_test_utils::fixtures::*;
use tessera_test_utils::generators::arb_widget_set;
use tessera_test_utils::{
    EventuallyConsistentObjectStore, InMemoryObjectStore, ObjectStore, RecordCache,
};

fn memory() -> Arc<InMemoryObjectStore> {
    Arc::new(InMemoryObjectStore::plain("test-bucket"))
}

async fn put_widget(store: &dyn ObjectStore, widget: &Widget) {
    store
        .put(&widget_key(&widget.id), serde_json::to_vec(widget).unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_widget_lifecycle() {
    let (_, counting) = counted_memory_store();
    let cache = widget_cache(counting.clone());

    cache.upsert("w1", Widget::new("w1", "foo")).await.unwrap();
    let all = cache.all().await.unwrap();
    assert_ids(&all, &["w1"]);
    assert_eq!(all[0].name, "foo");
    assert_eq!(counting.calls().list, 1);
    assert_eq!(counting.gets_of(&widget_key("w1")), 1);

    let echo = cache.upsert("w1", Widget::new("w1", "bar")).await.unwrap();
    assert_eq!(echo.name, "bar");
    assert!(echo.last_modified.is_some());
    assert_eq!(cache.find_by_id("w1").await.unwrap().name, "bar");

    let all = cache.all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].name, "bar");
    assert_eq!(cache.metrics().refresh_cycles, 2);
    assert_eq!(counting.calls().list, 2);

    cache.delete("w1").await.unwrap();
    assert!(cache.all().await.unwrap().is_empty());
    assert!(cache.find_by_id("w1").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_unchanged_marker_skips_listing() {
    let (_, counting) = counted_memory_store();
    let cache = widget_cache(counting.clone());

    cache.upsert("w1", Widget::new("w1", "foo")).await.unwrap();
    cache.upsert("w2", Widget::new("w2", "baz")).await.unwrap();
    assert_eq!(cache.all().await.unwrap().len(), 2);

    counting.reset();
    for _ in 0..3 {
        assert_eq!(cache.all().await.unwrap().len(), 2);
    }

    let calls = counting.calls();
    assert_eq!(calls.list, 0);
    assert_eq!(calls.get, 3);
    assert_eq!(counting.gets_of(WIDGET_MARKER_KEY), 3);
}

#[tokio::test]
async fn test_repeated_refresh_fetches_nothing() {
    let (memory, counting) = counted_memory_store();
    for i in 0..6 {
        put_widget(memory.as_ref(), &Widget::new(format!("w{i}"), "x")).await;
    }
    let cache = widget_cache(counting.clone());

    let first = cache.refresh().await.unwrap();
    assert_eq!(counting.calls().get, 6);

    counting.reset();
    let second = cache.refresh().await.unwrap();
    assert_eq!(counting.calls().get, 0);
    assert_eq!(counting.calls().list, 1);

    let mut a = first.records();
    let mut b = second.records();
    a.sort_by(|x, y| x.id.cmp(&y.id));
    b.sort_by(|x, y| x.id.cmp(&y.id));
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_refresh_fetches_only_new_and_changed() {
    let (memory, counting) = counted_memory_store();
    for id in ["a", "b", "c", "d"] {
        put_widget(memory.as_ref(), &Widget::new(id, "v1")).await;
    }
    let cache = widget_cache(counting.clone());
    cache.refresh().await.unwrap();

    put_widget(memory.as_ref(), &Widget::new("b", "v2")).await;
    put_widget(memory.as_ref(), &Widget::new("e", "v1")).await;
    memory.delete(&widget_key("d")).await.unwrap();
    counting.reset();

    let snapshot = cache.refresh().await.unwrap();
    assert_eq!(counting.gets_of(&widget_key("a")), 0);
    assert_eq!(counting.gets_of(&widget_key("c")), 0);
    assert_eq!(counting.gets_of(&widget_key("b")), 1);
    assert_eq!(counting.gets_of(&widget_key("e")), 1);
    assert_eq!(counting.calls().get, 2);

    assert_ids(&snapshot.records(), &["a", "b", "c", "e"]);
    assert_eq!(snapshot.get("b").unwrap().record.name, "v2");
}

#[tokio::test]
async fn test_out_of_band_delete_is_evicted() {
    let store = memory();
    let cache = widget_cache(store.clone());
    cache.upsert("gone", Widget::new("gone", "x")).await.unwrap();
    cache.upsert("kept", Widget::new("kept", "y")).await.unwrap();
    assert_eq!(cache.all().await.unwrap().len(), 2);

    store.delete(&widget_key("gone")).await.unwrap();
    let snapshot = cache.refresh().await.unwrap();
    assert_ids(&snapshot.records(), &["kept"]);
}

#[tokio::test]
async fn test_ids_are_case_insensitive() {
    let cache = widget_cache(memory());
    cache.upsert("Deploy-Prod", Widget::new("Deploy-Prod", "x")).await.unwrap();
    assert_eq!(cache.find_by_id("deploy-prod").await.unwrap().name, "x");
    cache.all().await.unwrap();
    assert!(cache.snapshot().unwrap().contains("deploy-prod"));
}

#[tokio::test]
async fn test_eventual_store_becomes_visible_after_flush() {
    let store = Arc::new(EventuallyConsistentObjectStore::plain("test-bucket"));
    let cache = widget_cache(store.clone());

    let echo = cache.upsert("w1", Widget::new("w1", "foo")).await.unwrap();
    assert_eq!(echo.name, "foo");
    assert!(cache.find_by_id("w1").await.unwrap_err().is_not_found());
    assert!(cache.all().await.unwrap().is_empty());

    assert_eq!(store.flush().await.unwrap(), 2);
    assert_eq!(cache.find_by_id("w1").await.unwrap().name, "foo");
    assert_ids(&cache.all().await.unwrap(), &["w1"]);

    cache.upsert("w1", Widget::new("w1", "bar")).await.unwrap();
    assert_eq!(cache.find_by_id("w1").await.unwrap().name, "foo");
    store.flush().await.unwrap();
    assert_eq!(cache.all().await.unwrap()[0].name, "bar");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_partial_snapshot() {
    let store = memory();
    for i in 0..50 {
        put_widget(store.as_ref(), &Widget::new(format!("old-{i}"), "x")).await;
    }
    let cache = widget_cache(store.clone());
    cache.refresh().await.unwrap();

    for i in 0..50 {
        put_widget(store.as_ref(), &Widget::new(format!("new-{i}"), "x")).await;
    }

    let done = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();
    for _ in 0..4 {
        let cache: RecordCache<Widget> = cache.clone();
        let done = done.clone();
        readers.push(tokio::spawn(async move {
            let mut observed = Vec::new();
            while !done.load(Ordering::SeqCst) {
                observed.push(cache.snapshot().unwrap().len());
                tokio::task::yield_now().await;
            }
            observed.push(cache.snapshot().unwrap().len());
            observed
        }));
    }

    cache.refresh().await.unwrap();
    done.store(true, Ordering::SeqCst);

    for reader in readers {
        for len in reader.await.unwrap() {
            assert!(len == 50 || len == 100, "observed partial snapshot of {len}");
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_bulk_written_widgets_are_all_listed(widgets in arb_widget_set(30)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (listed, expected) = runtime.block_on(async {
            let cache = widget_cache(memory());
            let expected = ids_of(&widgets);
            cache.bulk_upsert(widgets).await.unwrap();
            (ids_of(&cache.all().await.unwrap()), expected)
        });
        prop_assert_eq!(listed, expected);
    }
}
