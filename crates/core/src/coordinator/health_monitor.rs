// Copyright © 2026 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::CacheAdapter;
use crate::config::HealthConfig;
use crate::database::RecordStore;
use crate::monitoring::MetricsExporter;
use crate::types::{Dependency, DependencyState};

/// Immutable view of both dependencies, swapped in whole by the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    pub cache: DependencyState,
    pub durable_store: DependencyState,
    pub checked_at: Option<DateTime<Utc>>,
}

impl HealthSnapshot {
    pub fn state(&self, dependency: Dependency) -> DependencyState {
        match dependency {
            Dependency::Cache => self.cache,
            Dependency::DurableStore => self.durable_store,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.cache == DependencyState::Healthy && self.durable_store == DependencyState::Healthy
    }
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self {
            cache: DependencyState::Healthy,
            durable_store: DependencyState::Healthy,
            checked_at: None,
        }
    }
}

/// Shared between the monitor (writer) and the coordinator (reader and
/// passive error reporter). Reads never block.
#[derive(Debug, Default)]
pub struct HealthHandle {
    snapshot: ArcSwap<HealthSnapshot>,
    cache_errors: AtomicU64,
    store_errors: AtomicU64,
}

impl HealthHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<HealthSnapshot> {
        self.snapshot.load_full()
    }

    pub fn state(&self, dependency: Dependency) -> DependencyState {
        self.snapshot.load().state(dependency)
    }

    /// Passive signal: an adapter call failed on the request path.
    pub fn report_error(&self, dependency: Dependency) {
        self.counter(dependency).fetch_add(1, Ordering::Relaxed);
    }

    /// Overrides one published state. The monitor's next cycle publishes over it.
    pub fn set_state(&self, dependency: Dependency, state: DependencyState) {
        self.snapshot.rcu(|current| {
            let mut next = HealthSnapshot::clone(current);
            match dependency {
                Dependency::Cache => next.cache = state,
                Dependency::DurableStore => next.durable_store = state,
            }
            next
        });
    }

    fn take_errors(&self, dependency: Dependency) -> u64 {
        self.counter(dependency).swap(0, Ordering::Relaxed)
    }

    fn publish(&self, snapshot: HealthSnapshot) {
        self.snapshot.store(Arc::new(snapshot));
    }

    fn counter(&self, dependency: Dependency) -> &AtomicU64 {
        match dependency {
            Dependency::Cache => &self.cache_errors,
            Dependency::DurableStore => &self.store_errors,
        }
    }
}

/// Per-dependency liveness state machine. One call to [`observe`] per probe
/// cycle; each call makes at most one transition.
///
/// [`observe`]: HealthStateMachine::observe
#[derive(Debug, Clone)]
pub struct HealthStateMachine {
    state: DependencyState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    failure_threshold: u32,
    recovery_threshold: u32,
}

impl HealthStateMachine {
    pub fn new(failure_threshold: u32, recovery_threshold: u32) -> Self {
        Self {
            state: DependencyState::Healthy,
            consecutive_failures: 0,
            consecutive_successes: 0,
            failure_threshold: failure_threshold.max(1),
            recovery_threshold: recovery_threshold.max(1),
        }
    }

    pub fn state(&self) -> DependencyState {
        self.state
    }

    /// Feeds one cycle result. Returns `(from, to)` when the state changed.
    pub fn observe(&mut self, success: bool) -> Option<(DependencyState, DependencyState)> {
        let from = self.state;
        let to = match (from, success) {
            (DependencyState::Healthy, true) => DependencyState::Healthy,
            (DependencyState::Healthy, false) => {
                self.consecutive_failures = 1;
                DependencyState::Degraded
            }
            (DependencyState::Degraded, true) => DependencyState::Healthy,
            (DependencyState::Degraded, false) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.failure_threshold {
                    DependencyState::Unreachable
                } else {
                    DependencyState::Degraded
                }
            }
            (DependencyState::Unreachable, true) => {
                self.consecutive_successes += 1;
                if self.consecutive_successes >= self.recovery_threshold {
                    DependencyState::Healthy
                } else {
                    DependencyState::Unreachable
                }
            }
            (DependencyState::Unreachable, false) => {
                self.consecutive_successes = 0;
                DependencyState::Unreachable
            }
        };

        if to == from {
            return None;
        }
        self.state = to;
        // the failure streak that degraded the dependency keeps counting
        if to != DependencyState::Degraded {
            self.consecutive_failures = 0;
        }
        self.consecutive_successes = 0;
        Some((from, to))
    }
}

pub struct HealthMonitor {
    cache: Arc<dyn CacheAdapter>,
    store: Arc<dyn RecordStore>,
    handle: Arc<HealthHandle>,
    metrics: Arc<MetricsExporter>,
    config: HealthConfig,
    cache_machine: Mutex<HealthStateMachine>,
    store_machine: Mutex<HealthStateMachine>,
    shutdown_tx: broadcast::Sender<()>,
}

impl HealthMonitor {
    pub fn new(
        cache: Arc<dyn CacheAdapter>,
        store: Arc<dyn RecordStore>,
        handle: Arc<HealthHandle>,
        metrics: Arc<MetricsExporter>,
        config: HealthConfig,
    ) -> Self {
        let machine = HealthStateMachine::new(config.failure_threshold, config.recovery_threshold);
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            cache,
            store,
            handle,
            metrics,
            cache_machine: Mutex::new(machine.clone()),
            store_machine: Mutex::new(machine),
            config,
            shutdown_tx,
        }
    }

    pub fn handle(&self) -> Arc<HealthHandle> {
        self.handle.clone()
    }

    /// Probes both dependencies once and publishes the resulting snapshot.
    pub async fn run_cycle(&self) -> Arc<HealthSnapshot> {
        let timeout = self.config.probe_timeout();
        let (cache_ok, store_ok) = tokio::join!(
            probe(Dependency::Cache, timeout, self.cache.ping()),
            probe(Dependency::DurableStore, timeout, self.store.ping()),
        );

        let cache = self.advance(Dependency::Cache, cache_ok, &self.cache_machine);
        let durable_store = self.advance(Dependency::DurableStore, store_ok, &self.store_machine);

        self.handle.publish(HealthSnapshot {
            cache,
            durable_store,
            checked_at: Some(Utc::now()),
        });
        self.handle.snapshot()
    }

    fn advance(
        &self,
        dependency: Dependency,
        probe_ok: bool,
        machine: &Mutex<HealthStateMachine>,
    ) -> DependencyState {
        let passive_errors = self.handle.take_errors(dependency);
        let threshold = self.config.passive_error_threshold;
        let passive_ok = threshold == 0 || passive_errors < threshold;
        if !passive_ok {
            debug!(
                "{} reported {} request-path errors since last cycle",
                dependency.as_str(),
                passive_errors
            );
        }

        let mut machine = machine.lock();
        if let Some((from, to)) = machine.observe(probe_ok && passive_ok) {
            if to == DependencyState::Healthy {
                info!("{} recovered: {} -> {}", dependency.as_str(), from, to);
            } else {
                warn!("{} state changed: {} -> {}", dependency.as_str(), from, to);
            }
            self.metrics.record_transition(dependency, from, to);
        }
        machine.state()
    }

    /// Spawns the probe loop on its own task. The first cycle runs at once.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = self.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let period = self.config.interval();

        tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("Starting health monitor with interval {:?}", period);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        monitor.run_cycle().await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Health monitor stopped");
                        break;
                    }
                }
            }
        })
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

async fn probe<F>(dependency: Dependency, timeout: Duration, ping: F) -> bool
where
    F: std::future::Future<Output = crate::types::Result<()>>,
{
    match time::timeout(timeout, ping).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!("{} probe failed: {}", dependency.as_str(), e);
            false
        }
        Err(_) => {
            debug!("{} probe timed out after {:?}", dependency.as_str(), timeout);
            false
        }
    }
}
