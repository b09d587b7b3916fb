use bytes::Bytes;
use std::time::Duration;

use crate::cache::CacheAdapter;
use crate::database::RecordStore;
use crate::monitoring::Outcome;
use crate::tests::support::harness;
use crate::types::{Dependency, DependencyState, ErrorKind};

#[tokio::test]
async fn test_cache_unreachable_serves_from_store() {
    let h = harness();
    h.coordinator.put("k", "v1").await.unwrap();
    h.health.set_state(Dependency::Cache, DependencyState::Unreachable);
    let calls_before = h.cache.calls();

    let record = h.coordinator.get("k").await.unwrap();
    assert_eq!(record.value, Bytes::from_static(b"v1"));
    assert_eq!(h.metrics.operation_count("get", Outcome::Miss), 1);
    assert_eq!(h.cache.calls(), calls_before, "no cache round trip while unreachable");
}

#[tokio::test]
async fn test_cache_unreachable_put_skips_write_through() {
    let h = harness();
    h.health.set_state(Dependency::Cache, DependencyState::Unreachable);

    let record = h.coordinator.put("k", "v1").await.unwrap();
    assert_eq!(record.version, 1);
    assert!(h.cache.inner().peek("k").is_none());

    // reads stay correct after recovery
    h.health.set_state(Dependency::Cache, DependencyState::Healthy);
    assert_eq!(h.coordinator.get("k").await.unwrap().value, Bytes::from_static(b"v1"));
}

#[tokio::test]
async fn test_cache_unreachable_put_drops_older_copy() {
    let h = harness();
    h.coordinator.put("k", "v1").await.unwrap();
    assert_eq!(h.cache.inner().peek("k").unwrap().version, 1);
    h.health.set_state(Dependency::Cache, DependencyState::Unreachable);

    let record = h.coordinator.put("k", "v2").await.unwrap();
    assert_eq!(record.version, 2);
    assert!(h.cache.inner().peek("k").is_none());

    h.health.set_state(Dependency::Cache, DependencyState::Healthy);
    let record = h.coordinator.get("k").await.unwrap();
    assert_eq!(record.value, Bytes::from_static(b"v2"));
    assert_eq!(record.version, 2);
}

#[tokio::test]
async fn test_cache_unreachable_put_absorbs_invalidation_failure() {
    let h = harness();
    h.health.set_state(Dependency::Cache, DependencyState::Unreachable);
    h.cache.set_failing(true);

    let record = h.coordinator.put("k", "v1").await.unwrap();
    assert_eq!(record.version, 1);
    assert_eq!(h.metrics.snapshot().absorbed_cache_errors, 1);
}

#[tokio::test]
async fn test_cache_unreachable_delete_still_invalidates() {
    let h = harness();
    h.coordinator.put("k", "v1").await.unwrap();
    h.health.set_state(Dependency::Cache, DependencyState::Unreachable);

    h.coordinator.delete("k").await.unwrap();
    assert!(h.cache.inner().peek("k").is_none());

    h.health.set_state(Dependency::Cache, DependencyState::Healthy);
    let err = h.coordinator.get("k").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_degraded_cache_is_still_used() {
    let h = harness();
    h.coordinator.put("k", "v").await.unwrap();
    h.health.set_state(Dependency::Cache, DependencyState::Degraded);

    h.coordinator.get("k").await.unwrap();
    assert_eq!(h.metrics.operation_count("get", Outcome::Hit), 1);
}

#[tokio::test]
async fn test_store_unreachable_fails_writes_fast() {
    let h = harness();
    h.coordinator.put("cached", "v").await.unwrap();
    h.health.set_state(Dependency::DurableStore, DependencyState::Unreachable);
    let attempts = h.store.write_attempts();

    let err = h.coordinator.put("k", "v").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    let err = h.coordinator.delete("cached").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert_eq!(h.store.write_attempts(), attempts, "no buffered or attempted writes");

    // a failed delete leaves the cached copy alone
    assert!(h.cache.inner().peek("cached").is_some());
}

#[tokio::test]
async fn test_store_unreachable_still_serves_cache_hits() {
    let h = harness();
    h.coordinator.put("cached", "v").await.unwrap();
    h.store.set_failing(true);
    h.health.set_state(Dependency::DurableStore, DependencyState::Unreachable);

    let record = h.coordinator.get("cached").await.unwrap();
    assert_eq!(record.value, Bytes::from_static(b"v"));

    let err = h.coordinator.get("uncached").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);

    let err = h.coordinator.count_equal(b"v").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
}

#[tokio::test]
async fn test_store_failure_before_detection() {
    let h = harness();
    h.coordinator.put("k", "v1").await.unwrap();
    h.store.set_failing(true);

    // monitor has not noticed yet: the call reaches the store and fails
    let err = h.coordinator.put("k", "v2").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);

    // durable-first: the cache still holds the last committed value
    let cached = h.cache.inner().peek("k").unwrap();
    assert_eq!(cached.value, Bytes::from_static(b"v1"));
}

#[tokio::test]
async fn test_delete_removes_stale_entry() {
    let h = harness();
    h.store.write("k", Bytes::from_static(b"fresh")).await.unwrap();
    h.store.write("k", Bytes::from_static(b"fresh")).await.unwrap();
    // an out-of-date copy left behind by an earlier failed write-through
    h.cache
        .inner()
        .set("k", Bytes::from_static(b"stale"), 1, Duration::from_secs(60))
        .await
        .unwrap();

    h.coordinator.delete("k").await.unwrap();
    let err = h.coordinator.get("k").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_delete_of_missing_key_clears_leftover_entry() {
    let h = harness();
    h.cache
        .inner()
        .set("ghost", Bytes::from_static(b"x"), 3, Duration::from_secs(60))
        .await
        .unwrap();

    let err = h.coordinator.delete("ghost").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(h.cache.inner().peek("ghost").is_none());
}
