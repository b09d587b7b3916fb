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

//! Prometheus metrics fed by the coordinator and the health monitor.
//!
//! Recording never fails and never blocks on anything but an atomic; only
//! [`MetricsExporter::render`] can return an error.

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use serde::Serialize;
use std::time::Duration;

use crate::types::{CoreError, Dependency, DependencyState, Result};

const METRICS_PREFIX: &str = "tiergate";

/// Outcome label of an operation counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Hit,
    Miss,
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Hit => "hit",
            Outcome::Miss => "miss",
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OperationLabels {
    operation: &'static str,
    outcome: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct KindLabels {
    operation: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct DependencyLabels {
    dependency: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct TransitionLabels {
    dependency: &'static str,
    from: &'static str,
    to: &'static str,
}

fn latency_histogram() -> Histogram {
    // 0.25ms .. ~8s
    Histogram::new(exponential_buckets(0.00025, 2.0, 16))
}

/// Counts exposed on the health endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub failures: u64,
    pub absorbed_cache_errors: u64,
    pub conflict_retries: u64,
}

pub struct MetricsExporter {
    registry: Registry,
    operations: Family<OperationLabels, Counter>,
    latency: Family<KindLabels, Histogram, fn() -> Histogram>,
    dependency_state: Family<DependencyLabels, Gauge>,
    absorbed_cache_errors: Family<KindLabels, Counter>,
    conflict_retries: Family<KindLabels, Counter>,
    health_transitions: Family<TransitionLabels, Counter>,
}

impl MetricsExporter {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix(METRICS_PREFIX);

        let operations = Family::<OperationLabels, Counter>::default();
        registry.register(
            "operations",
            "Coordinator operations by kind and outcome",
            operations.clone(),
        );

        let latency = Family::<KindLabels, Histogram, fn() -> Histogram>::new_with_constructor(
            latency_histogram,
        );
        registry.register(
            "operation_duration_seconds",
            "End-to-end coordinator latency per operation kind",
            latency.clone(),
        );

        let dependency_state = Family::<DependencyLabels, Gauge>::default();
        registry.register(
            "dependency_state",
            "0 = healthy, 1 = degraded, 2 = unreachable",
            dependency_state.clone(),
        );

        let absorbed_cache_errors = Family::<KindLabels, Counter>::default();
        registry.register(
            "cache_errors_absorbed",
            "Cache adapter errors swallowed by the coordinator",
            absorbed_cache_errors.clone(),
        );

        let conflict_retries = Family::<KindLabels, Counter>::default();
        registry.register(
            "conflict_retries",
            "Durable store conflicts retried by the coordinator",
            conflict_retries.clone(),
        );

        let health_transitions = Family::<TransitionLabels, Counter>::default();
        registry.register(
            "health_transitions",
            "Dependency state transitions published by the health monitor",
            health_transitions.clone(),
        );

        let exporter = Self {
            registry,
            operations,
            latency,
            dependency_state,
            absorbed_cache_errors,
            conflict_retries,
            health_transitions,
        };
        exporter.set_dependency_state(Dependency::Cache, DependencyState::Healthy);
        exporter.set_dependency_state(Dependency::DurableStore, DependencyState::Healthy);
        exporter
    }

    pub fn record_operation(&self, operation: &'static str, outcome: Outcome, elapsed: Duration) {
        self.operations
            .get_or_create(&OperationLabels {
                operation,
                outcome: outcome.as_str(),
            })
            .inc();
        self.latency
            .get_or_create(&KindLabels { operation })
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_absorbed_cache_error(&self, operation: &'static str) {
        self.absorbed_cache_errors
            .get_or_create(&KindLabels { operation })
            .inc();
    }

    pub fn record_conflict_retry(&self, operation: &'static str) {
        self.conflict_retries
            .get_or_create(&KindLabels { operation })
            .inc();
    }

    pub fn set_dependency_state(&self, dependency: Dependency, state: DependencyState) {
        self.dependency_state
            .get_or_create(&DependencyLabels {
                dependency: dependency.as_str(),
            })
            .set(state.as_gauge());
    }

    pub fn record_transition(
        &self,
        dependency: Dependency,
        from: DependencyState,
        to: DependencyState,
    ) {
        self.health_transitions
            .get_or_create(&TransitionLabels {
                dependency: dependency.as_str(),
                from: state_label(from),
                to: state_label(to),
            })
            .inc();
        self.set_dependency_state(dependency, to);
    }

    pub fn operation_count(&self, operation: &'static str, outcome: Outcome) -> u64 {
        self.operations
            .get_or_create(&OperationLabels {
                operation,
                outcome: outcome.as_str(),
            })
            .get()
    }

    pub fn dependency_gauge(&self, dependency: Dependency) -> i64 {
        self.dependency_state
            .get_or_create(&DependencyLabels {
                dependency: dependency.as_str(),
            })
            .get()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        const KINDS: [&str; 4] = ["get", "put", "delete", "count"];

        let mut snapshot = MetricsSnapshot {
            cache_hits: self.operation_count("get", Outcome::Hit),
            cache_misses: self.operation_count("get", Outcome::Miss),
            ..Default::default()
        };
        for operation in KINDS {
            let labels = KindLabels { operation };
            snapshot.failures += self.operation_count(operation, Outcome::Failure);
            snapshot.absorbed_cache_errors += self.absorbed_cache_errors.get_or_create(&labels).get();
            snapshot.conflict_retries += self.conflict_retries.get_or_create(&labels).get();
        }
        snapshot
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> Result<String> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)
            .map_err(|e| CoreError::InternalError(format!("Failed to encode metrics: {}", e)))?;
        Ok(buffer)
    }
}

impl Default for MetricsExporter {
    fn default() -> Self {
        Self::new()
    }
}

fn state_label(state: DependencyState) -> &'static str {
    match state {
        DependencyState::Healthy => "healthy",
        DependencyState::Degraded => "degraded",
        DependencyState::Unreachable => "unreachable",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_registered_metrics() {
        let metrics = MetricsExporter::new();
        metrics.record_operation("get", Outcome::Hit, Duration::from_micros(300));
        metrics.record_operation("put", Outcome::Success, Duration::from_millis(4));
        metrics.record_absorbed_cache_error("put");

        let text = metrics.render().unwrap();
        assert!(text.contains("tiergate_operations_total{operation=\"get\",outcome=\"hit\"} 1"));
        assert!(text.contains("tiergate_operation_duration_seconds"));
        assert!(text.contains("tiergate_cache_errors_absorbed_total{operation=\"put\"} 1"));
        assert!(text.contains("tiergate_dependency_state{dependency=\"cache\"} 0"));
        assert!(text.ends_with("# EOF\n"));
    }

    #[test]
    fn test_transition_updates_gauge() {
        let metrics = MetricsExporter::new();
        metrics.record_transition(
            Dependency::DurableStore,
            DependencyState::Healthy,
            DependencyState::Degraded,
        );
        assert_eq!(metrics.dependency_gauge(Dependency::DurableStore), 1);
        assert_eq!(metrics.dependency_gauge(Dependency::Cache), 0);

        let text = metrics.render().unwrap();
        assert!(text.contains("from=\"healthy\",to=\"degraded\""));
    }

    #[test]
    fn test_snapshot() {
        let metrics = MetricsExporter::new();
        metrics.record_operation("get", Outcome::Hit, Duration::ZERO);
        metrics.record_operation("get", Outcome::Miss, Duration::ZERO);
        metrics.record_operation("delete", Outcome::Failure, Duration::ZERO);
        metrics.record_conflict_retry("put");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.conflict_retries, 1);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["cache_hits"], 1);
        assert_eq!(json["absorbed_cache_errors"], 0);
    }
}
