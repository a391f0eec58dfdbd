use crate::error::StorageError;
use crate::{FileStore, MemoryStore, MetricsStore, PostgresStore};
use std::sync::Arc;
use std::time::Duration;
use telemon_common::shutdown;
use telemon_common::types::{Metric, MetricKind, MetricValue};
use tempfile::TempDir;

fn snapshot_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("metrics.json")
}

#[tokio::test]
async fn gauge_write_replaces() {
    let store = MemoryStore::new();
    store.save(&Metric::gauge("Alloc", 1.5)).await.unwrap();
    let stored = store.save(&Metric::gauge("Alloc", 0.25)).await.unwrap();
    assert_eq!(stored, Metric::gauge("Alloc", 0.25));

    let got = store
        .get_by_type_and_id("Alloc", MetricKind::Gauge)
        .await
        .unwrap();
    assert_eq!(got, Some(Metric::gauge("Alloc", 0.25)));
}

#[tokio::test]
async fn counter_write_accumulates() {
    let store = MemoryStore::new();
    store.save(&Metric::counter("PollCount", 5)).await.unwrap();
    let stored = store.save(&Metric::counter("PollCount", 3)).await.unwrap();
    assert_eq!(stored.value, MetricValue::Counter(8));
}

#[tokio::test]
async fn same_id_different_kinds_are_independent() {
    let store = MemoryStore::new();
    store.save(&Metric::gauge("x", 2.0)).await.unwrap();
    store.save(&Metric::counter("x", 7)).await.unwrap();

    assert_eq!(
        store.get_by_type_and_id("x", MetricKind::Gauge).await.unwrap(),
        Some(Metric::gauge("x", 2.0))
    );
    assert_eq!(
        store.get_by_type_and_id("x", MetricKind::Counter).await.unwrap(),
        Some(Metric::counter("x", 7))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_counter_saves_do_not_lose_increments() {
    let store = Arc::new(MemoryStore::new());
    let mut handles = Vec::new();
    for _ in 0..64 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.save(&Metric::counter("hits", 1)).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let got = store
        .get_by_type_and_id("hits", MetricKind::Counter)
        .await
        .unwrap();
    assert_eq!(got, Some(Metric::counter("hits", 64)));
}

#[tokio::test]
async fn missing_metric_is_none() {
    let store = MemoryStore::new();
    let got = store
        .get_by_type_and_id("nope", MetricKind::Gauge)
        .await
        .unwrap();
    assert!(got.is_none());
}

#[tokio::test]
async fn empty_id_is_rejected() {
    let store = MemoryStore::new();
    let err = store.save(&Metric::gauge("", 1.0)).await.unwrap_err();
    assert!(err.is_validation());

    let err = store
        .get_by_type_and_id("", MetricKind::Counter)
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert!(store.is_empty());
}

#[tokio::test]
async fn counter_overflow_is_an_error() {
    let store = MemoryStore::new();
    store.save(&Metric::counter("big", i64::MAX)).await.unwrap();
    let err = store.save(&Metric::counter("big", 1)).await.unwrap_err();
    assert!(matches!(err, StorageError::CounterOverflow { .. }));

    let got = store
        .get_by_type_and_id("big", MetricKind::Counter)
        .await
        .unwrap();
    assert_eq!(got, Some(Metric::counter("big", i64::MAX)));
}

#[tokio::test]
async fn save_all_applies_in_order() {
    let store = MemoryStore::new();
    let stored = store
        .save_all(&[
            Metric::counter("c", 1),
            Metric::gauge("g", 1.0),
            Metric::counter("c", 2),
            Metric::gauge("g", 3.0),
        ])
        .await
        .unwrap();

    assert_eq!(
        stored,
        vec![
            Metric::counter("c", 1),
            Metric::gauge("g", 1.0),
            Metric::counter("c", 3),
            Metric::gauge("g", 3.0),
        ]
    );
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn save_all_is_all_or_nothing() {
    let store = MemoryStore::new();
    store.save(&Metric::counter("big", i64::MAX)).await.unwrap();

    let err = store
        .save_all(&[Metric::gauge("fresh", 1.0), Metric::counter("big", 1)])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::CounterOverflow { .. }));
    assert!(store
        .get_by_type_and_id("fresh", MetricKind::Gauge)
        .await
        .unwrap()
        .is_none());

    let err = store
        .save_all(&[Metric::gauge("ok", 1.0), Metric::gauge("", 2.0)])
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn get_all_by_type_filters_and_sorts() {
    let store = MemoryStore::new();
    store
        .save_all(&[
            Metric::gauge("b", 2.0),
            Metric::counter("z", 1),
            Metric::gauge("a", 1.0),
        ])
        .await
        .unwrap();

    let gauges = store.get_all_by_type(MetricKind::Gauge).await.unwrap();
    assert_eq!(gauges, vec![Metric::gauge("a", 1.0), Metric::gauge("b", 2.0)]);

    let counters = store.get_all_by_type(MetricKind::Counter).await.unwrap();
    assert_eq!(counters, vec![Metric::counter("z", 1)]);
}

#[tokio::test]
async fn file_store_flush_and_restore() {
    let dir = TempDir::new().unwrap();
    let path = snapshot_path(&dir);

    let store = FileStore::new(&path, false);
    store.save(&Metric::gauge("Alloc", 12.5)).await.unwrap();
    store.save(&Metric::counter("PollCount", 4)).await.unwrap();
    assert!(!path.exists(), "nothing is written before a flush");
    store.flush().await.unwrap();

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(raw["Metrics"]["Alloc:gauge"]["value"], 12.5);
    assert_eq!(raw["Metrics"]["PollCount:counter"]["delta"], 4);

    let restored = FileStore::restore(&path, false).await.unwrap();
    assert_eq!(
        restored
            .get_by_type_and_id("PollCount", MetricKind::Counter)
            .await
            .unwrap(),
        Some(Metric::counter("PollCount", 4))
    );

    // Counters keep accumulating on top of the restored total.
    let stored = restored.save(&Metric::counter("PollCount", 1)).await.unwrap();
    assert_eq!(stored.value, MetricValue::Counter(5));
}

#[tokio::test]
async fn file_store_sync_on_write_persists_each_save() {
    let dir = TempDir::new().unwrap();
    let path = snapshot_path(&dir);

    let store = FileStore::new(&path, true);
    store.save(&Metric::gauge("Heap", 3.0)).await.unwrap();

    let restored = FileStore::restore(&path, false).await.unwrap();
    assert_eq!(
        restored
            .get_by_type_and_id("Heap", MetricKind::Gauge)
            .await
            .unwrap(),
        Some(Metric::gauge("Heap", 3.0))
    );
}

#[tokio::test]
async fn failed_snapshot_write_keeps_memory_update() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"").unwrap();
    let path = blocker.join("metrics.json");

    let store = FileStore::new(&path, true);
    let err = store.save(&Metric::counter("c", 2)).await.unwrap_err();
    assert!(matches!(err, StorageError::Io { .. }));

    assert_eq!(
        store
            .get_by_type_and_id("c", MetricKind::Counter)
            .await
            .unwrap(),
        Some(Metric::counter("c", 2))
    );
}

#[tokio::test]
async fn flush_creates_parent_directories() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data").join("nested").join("metrics.json");

    let store = FileStore::new(&path, false);
    store.save(&Metric::gauge("g", 1.0)).await.unwrap();
    store.flush().await.unwrap();
    assert!(path.exists());
}

#[tokio::test]
async fn restore_rejects_garbage() {
    let dir = TempDir::new().unwrap();
    let path = snapshot_path(&dir);
    std::fs::write(&path, b"not json").unwrap();
    assert!(matches!(
        FileStore::restore(&path, false).await,
        Err(StorageError::Json(_))
    ));

    let missing = dir.path().join("absent.json");
    assert!(matches!(
        FileStore::restore(&missing, false).await,
        Err(StorageError::Io { .. })
    ));
}

#[tokio::test]
async fn periodic_flush_writes_final_snapshot_on_shutdown() {
    let dir = TempDir::new().unwrap();
    let path = snapshot_path(&dir);
    let store = Arc::new(FileStore::new(&path, false));
    let (trigger, shutdown) = shutdown::channel();

    let task = tokio::spawn(
        store
            .clone()
            .run_periodic_flush(Duration::from_secs(3600), shutdown),
    );
    store.save(&Metric::gauge("late", 9.0)).await.unwrap();
    trigger.trigger();
    task.await.unwrap();

    let restored = FileStore::restore(&path, false).await.unwrap();
    assert_eq!(
        restored
            .get_by_type_and_id("late", MetricKind::Gauge)
            .await
            .unwrap(),
        Some(Metric::gauge("late", 9.0))
    );
}

#[tokio::test]
async fn non_finite_gauge_never_reaches_the_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = snapshot_path(&dir);
    let store = FileStore::new(&path, true);
    store.save(&Metric::counter("PollCount", 7)).await.unwrap();

    for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        let err = store.save(&Metric::gauge("weird", value)).await.unwrap_err();
        assert!(err.is_validation(), "{value}");
    }
    let err = store
        .save_all(&[Metric::gauge("fine", 1.0), Metric::gauge("weird", f64::NAN)])
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let restored = FileStore::restore(&path, false).await.unwrap();
    assert_eq!(
        restored
            .get_by_type_and_id("PollCount", MetricKind::Counter)
            .await
            .unwrap(),
        Some(Metric::counter("PollCount", 7))
    );
    assert!(restored
        .get_all_by_type(MetricKind::Gauge)
        .await
        .unwrap()
        .is_empty());
}

// PostgreSQL tests run only when TELEMON_TEST_DATABASE_URL points at a
// disposable database. Each test uses its own metric IDs.

async fn postgres_store() -> Option<PostgresStore> {
    let dsn = std::env::var("TELEMON_TEST_DATABASE_URL").ok()?;
    Some(PostgresStore::connect(&dsn).await.unwrap())
}

fn unique_id(prefix: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{prefix}-{nanos}")
}

#[tokio::test]
async fn postgres_upsert_semantics() {
    let Some(store) = postgres_store().await else {
        return;
    };
    let gauge = unique_id("pg-gauge");
    let counter = unique_id("pg-counter");

    store.save(&Metric::gauge(&gauge, 1.0)).await.unwrap();
    store.save(&Metric::gauge(&gauge, 2.0)).await.unwrap();
    store.save(&Metric::counter(&counter, 5)).await.unwrap();
    let stored = store.save(&Metric::counter(&counter, 3)).await.unwrap();
    assert_eq!(stored.value, MetricValue::Counter(8));

    assert_eq!(
        store
            .get_by_type_and_id(&gauge, MetricKind::Gauge)
            .await
            .unwrap(),
        Some(Metric::gauge(&gauge, 2.0))
    );
    assert!(store
        .get_by_type_and_id(&gauge, MetricKind::Counter)
        .await
        .unwrap()
        .is_none());
    store.ping().await.unwrap();
}

#[tokio::test]
async fn postgres_save_all_rolls_back_on_overflow() {
    let Some(store) = postgres_store().await else {
        return;
    };
    let big = unique_id("pg-big");
    let fresh = unique_id("pg-fresh");
    store.save(&Metric::counter(&big, i64::MAX)).await.unwrap();

    let err = store
        .save_all(&[Metric::gauge(&fresh, 1.0), Metric::counter(&big, 1)])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::CounterOverflow { ref id } if *id == big));
    assert!(store
        .get_by_type_and_id(&fresh, MetricKind::Gauge)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn postgres_schema_init_is_idempotent() {
    let Some(store) = postgres_store().await else {
        return;
    };
    store.init_schema().await.unwrap();
    store.init_schema().await.unwrap();
}

#[tokio::test]
async fn postgres_concurrent_counter_saves_do_not_lose_increments() {
    let Some(store) = postgres_store().await else {
        return;
    };
    let store = Arc::new(store);
    let id = unique_id("pg-hits");

    let mut handles = Vec::new();
    for _ in 0..32 {
        let store = store.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            store.save(&Metric::counter(id, 1)).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(
        store
            .get_by_type_and_id(&id, MetricKind::Counter)
            .await
            .unwrap(),
        Some(Metric::counter(&id, 32))
    );
}
