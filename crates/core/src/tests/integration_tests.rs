use bytes::Bytes;
use std::sync::Arc;

use crate::cache::MemoryCacheAdapter;
use crate::config::{CoordinatorConfig, HealthConfig};
use crate::coordinator::{Coordinator, HealthHandle, HealthMonitor};
use crate::database::MemoryRecordStore;
use crate::monitoring::{MetricsExporter, Outcome};
use crate::tests::support::harness;
use crate::types::{Dependency, DependencyState, ErrorKind};

#[tokio::test]
async fn test_user_lifecycle_scenario() {
    let h = harness();

    let record = h.coordinator.put("user:1", "alice").await.unwrap();
    assert_eq!(record.version, 1);

    let record = h.coordinator.get("user:1").await.unwrap();
    assert_eq!(record.value, Bytes::from_static(b"alice"));
    assert_eq!(h.metrics.operation_count("get", Outcome::Hit), 1);

    assert!(h.cache.inner().evict("user:1"));
    let record = h.coordinator.get("user:1").await.unwrap();
    assert_eq!(record.value, Bytes::from_static(b"alice"));
    assert_eq!(h.metrics.operation_count("get", Outcome::Miss), 1);
    assert!(h.cache.inner().peek("user:1").is_some(), "cache repopulated");

    h.coordinator.delete("user:1").await.unwrap();
    let err = h.coordinator.get("user:1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let text = h.metrics.render().unwrap();
    assert!(text.contains("tiergate_operations_total{operation=\"delete\",outcome=\"success\"} 1"));
}

#[tokio::test]
async fn test_monitor_drives_coordinator_degradation() {
    let h = harness();
    let monitor = HealthMonitor::new(
        h.cache.clone(),
        h.store.clone(),
        h.health.clone(),
        h.metrics.clone(),
        HealthConfig::default(),
    );
    h.coordinator.put("k", "v").await.unwrap();

    h.store.set_failing(true);
    for _ in 0..3 {
        monitor.run_cycle().await;
    }
    assert_eq!(h.health.state(Dependency::DurableStore), DependencyState::Unreachable);
    assert_eq!(h.metrics.dependency_gauge(Dependency::DurableStore), 2);

    let attempts = h.store.write_attempts();
    let err = h.coordinator.put("k", "v2").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert_eq!(h.store.write_attempts(), attempts);
    assert_eq!(h.coordinator.get("k").await.unwrap().value, Bytes::from_static(b"v"));

    h.store.set_failing(false);
    monitor.run_cycle().await;
    monitor.run_cycle().await;
    assert_eq!(h.health.state(Dependency::DurableStore), DependencyState::Healthy);
    assert_eq!(h.coordinator.put("k", "v2").await.unwrap().version, 2);
}

#[tokio::test]
async fn test_request_path_errors_degrade_cache() {
    let h = harness();
    let monitor = HealthMonitor::new(
        h.cache.clone(),
        h.store.clone(),
        h.health.clone(),
        h.metrics.clone(),
        HealthConfig::default(),
    );

    // pings keep succeeding, only request-path calls fail
    h.coordinator.put("k", "v").await.unwrap();
    h.cache.set_failing(true);
    for _ in 0..3 {
        h.coordinator.get("k").await.unwrap();
    }
    h.cache.set_failing(false);

    let snapshot = monitor.run_cycle().await;
    assert_eq!(snapshot.cache, DependencyState::Degraded);
}

#[tokio::test]
async fn test_memory_stack() {
    let health = Arc::new(HealthHandle::new());
    let coordinator = Coordinator::new(
        Arc::new(MemoryCacheAdapter::default()),
        Arc::new(MemoryRecordStore::new()),
        health,
        Arc::new(MetricsExporter::new()),
        CoordinatorConfig::default(),
    );

    coordinator.put("a", "10").await.unwrap();
    coordinator.put("b", "10").await.unwrap();
    assert_eq!(coordinator.count_equal(b"10").await.unwrap(), 2);
    coordinator.put("b", "20").await.unwrap();
    assert_eq!(coordinator.count_equal(b"10").await.unwrap(), 1);
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn test_sqlite_stack() {
    use crate::config::{DatabaseConfig, DatabaseEngine};
    use crate::database::{create_connection, run_migrations, SeaOrmRecordStore};

    let config = DatabaseConfig {
        engine: DatabaseEngine::Sqlite,
        url: "sqlite::memory:".to_string(),
        ..Default::default()
    };
    let db = create_connection(&config).await.unwrap();
    run_migrations(&db).await.unwrap();

    let cache = Arc::new(MemoryCacheAdapter::default());
    let coordinator = Coordinator::new(
        cache.clone(),
        Arc::new(SeaOrmRecordStore::new(db)),
        Arc::new(HealthHandle::new()),
        Arc::new(MetricsExporter::new()),
        CoordinatorConfig::default(),
    );

    assert_eq!(coordinator.put("user:1", "alice").await.unwrap().version, 1);
    assert_eq!(coordinator.put("user:1", "bob").await.unwrap().version, 2);
    cache.clear();

    let record = coordinator.get("user:1").await.unwrap();
    assert_eq!(record.value, Bytes::from_static(b"bob"));
    assert_eq!(record.version, 2);

    coordinator.delete("user:1").await.unwrap();
    assert_eq!(
        coordinator.get("user:1").await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
}
