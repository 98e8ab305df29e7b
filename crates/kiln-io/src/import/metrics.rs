// Copyright 2025 eraflo
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

//! Metric handles registered by an import environment.

use super::statistics::StatisticsSnapshot;
use kiln_core::telemetry::{MetricId, MetricsResult};
use kiln_telemetry::{CounterHandle, GaugeHandle, HistogramHandle, MetricsRegistry};

/// Handles to every metric the dispatcher feeds.
#[derive(Debug)]
pub(crate) struct ImportMetrics {
    /// Time spent inside `Deserializer::deserialize`, in milliseconds.
    pub(crate) deserialize_time_ms: HistogramHandle,
    pub(crate) imports_completed: CounterHandle,
    pub(crate) imports_failed: CounterHandle,
    pub(crate) imports_canceled: CounterHandle,
    reference_count: GaugeHandle,
    unique_resources: GaugeHandle,
    disposed: GaugeHandle,
    undisposed: GaugeHandle,
}

impl ImportMetrics {
    pub(crate) fn register(registry: &MetricsRegistry, namespace: &str) -> MetricsResult<Self> {
        let id = |name: &str| MetricId::new(namespace, name);
        Ok(Self {
            deserialize_time_ms: registry.register_histogram(
                id("deserialize_time"),
                "Time spent deserializing compiled resources",
                "ms",
                vec![0.1, 1.0, 5.0, 16.0, 33.0, 100.0, 500.0],
            )?,
            imports_completed: registry
                .register_counter(id("completed_total"), "Import runs that succeeded")?,
            imports_failed: registry
                .register_counter(id("failed_total"), "Import runs that ended in an error")?,
            imports_canceled: registry
                .register_counter(id("canceled_total"), "Import runs that were canceled")?,
            reference_count: registry.register_gauge(
                id("reference_count"),
                "Sum of the reference counts of cached resources",
                "count",
            )?,
            unique_resources: registry.register_gauge(
                id("unique_resources"),
                "Resources with a running or successful import",
                "count",
            )?,
            disposed: registry.register_gauge(
                id("disposed"),
                "Objects accepted by a disposer",
                "count",
            )?,
            undisposed: registry.register_gauge(
                id("undisposed"),
                "Objects no disposer accepted",
                "count",
            )?,
        })
    }

    /// Pushes a statistics snapshot to the gauges.
    pub(crate) fn publish(&self, snapshot: &StatisticsSnapshot) -> MetricsResult<()> {
        self.reference_count.set(snapshot.reference_count as f64)?;
        self.unique_resources.set(snapshot.unique_resources as f64)?;
        self.disposed.set(snapshot.disposed as f64)?;
        self.undisposed.set(snapshot.undisposed as f64)?;
        Ok(())
    }
}

/// Bumps a counter, logging instead of failing.
pub(crate) fn bump(counter: &CounterHandle) {
    if let Err(e) = counter.increment() {
        log::warn!("[ImportMetrics] Failed to update {}: {e}", counter.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_sets_gauges() {
        let registry = MetricsRegistry::new();
        let metrics = ImportMetrics::register(&registry, "import").unwrap();

        metrics
            .publish(&StatisticsSnapshot {
                reference_count: 3,
                unique_resources: 2,
                disposed: 1,
                ..Default::default()
            })
            .unwrap();

        let gauge = registry
            .get_metric(&MetricId::new("import", "reference_count"))
            .unwrap();
        assert_eq!(gauge.value.as_gauge(), Some(3.0));
        assert_eq!(registry.namespace_metrics("import").len(), 8);
    }

    #[test]
    fn two_environments_share_metrics() {
        let registry = MetricsRegistry::new();
        let first = ImportMetrics::register(&registry, "import").unwrap();
        let second = ImportMetrics::register(&registry, "import").unwrap();

        bump(&first.imports_completed);
        bump(&second.imports_completed);

        assert_eq!(second.imports_completed.get().unwrap(), 2);
    }
}
