use anyhow::{Context, Result};
use std::sync::Arc;
use tiergate_core::config::{CacheEngine, Config, DatabaseConfig, DatabaseEngine, RedisConfig};
use tiergate_core::{
    database, CacheAdapter, Coordinator, HealthHandle, HealthMonitor, MemoryCacheAdapter,
    MemoryRecordStore, MetricsExporter, RecordStore, RedisCacheAdapter, SeaOrmRecordStore,
};
use tracing::{info, warn};

/// Everything a front-end needs, wired against one configuration.
pub struct Services {
    pub coordinator: Arc<Coordinator>,
    pub monitor: Arc<HealthMonitor>,
    pub metrics: Arc<MetricsExporter>,
}

pub async fn build_services(config: &Config) -> Result<Services> {
    let store = build_store(&config.database).await?;
    let cache = build_cache(&config.redis)?;

    let metrics = Arc::new(MetricsExporter::new());
    let health = Arc::new(HealthHandle::new());

    let monitor = Arc::new(HealthMonitor::new(
        cache.clone(),
        store.clone(),
        health.clone(),
        metrics.clone(),
        config.health.clone(),
    ));
    let coordinator = Arc::new(Coordinator::new(
        cache,
        store,
        health,
        metrics.clone(),
        config.coordinator.clone(),
    ));

    Ok(Services {
        coordinator,
        monitor,
        metrics,
    })
}

async fn build_store(config: &DatabaseConfig) -> Result<Arc<dyn RecordStore>> {
    if config.engine == DatabaseEngine::Memory {
        warn!("Using the in-process record store; data will not survive a restart");
        return Ok(Arc::new(MemoryRecordStore::new()));
    }

    info!("Connecting to database...");
    let conn = database::create_connection(config)
        .await
        .context("failed to connect to the durable store")?;
    database::run_migrations(&conn)
        .await
        .context("failed to prepare the records table")?;
    info!("Database repository initialized");

    Ok(Arc::new(SeaOrmRecordStore::new(conn)))
}

fn build_cache(config: &RedisConfig) -> Result<Arc<dyn CacheAdapter>> {
    match config.engine {
        CacheEngine::Memory => {
            info!(
                "Using the in-process cache with capacity {}",
                config.memory_capacity
            );
            Ok(Arc::new(MemoryCacheAdapter::new(config.memory_capacity)))
        }
        CacheEngine::Redis => {
            // connects lazily; an unreachable Redis only degrades the cache tier
            let adapter = RedisCacheAdapter::from_config(config)
                .context("failed to configure the Redis cache adapter")?;
            Ok(Arc::new(adapter))
        }
    }
}
