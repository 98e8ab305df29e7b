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

//! Registry for managing metrics.

use crate::storage::{backend::MetricsBackend, memory_backend::InMemoryBackend};
use kiln_core::telemetry::{
    Histogram, Metric, MetricId, MetricKind, MetricValue, MetricsError, MetricsResult,
};
use serde::Serialize;
use std::sync::Arc;

/// Entry point of the metrics system.
///
/// Registration is idempotent: registering an id that already exists with the
/// same kind returns a handle to the existing metric, so several components
/// (or several import environments) can share one registry. Registering it
/// with a different kind fails with [`MetricsError::KindMismatch`].
///
/// Cloning the registry is cheap and yields a view of the same backend.
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    backend: Arc<dyn MetricsBackend>,
}

impl MetricsRegistry {
    /// Creates a registry over a fresh [`InMemoryBackend`].
    pub fn new() -> Self {
        Self::with_backend(Arc::new(InMemoryBackend::new()))
    }

    /// Creates a registry over a custom backend.
    pub fn with_backend(backend: Arc<dyn MetricsBackend>) -> Self {
        Self { backend }
    }

    /// Registers (or looks up) a counter.
    pub fn register_counter(
        &self,
        id: MetricId,
        description: impl Into<String>,
    ) -> MetricsResult<CounterHandle> {
        self.register(Metric::counter(id.clone(), description))?;
        Ok(CounterHandle {
            id,
            backend: self.backend.clone(),
        })
    }

    /// Registers (or looks up) a gauge.
    pub fn register_gauge(
        &self,
        id: MetricId,
        description: impl Into<String>,
        unit: impl Into<String>,
    ) -> MetricsResult<GaugeHandle> {
        self.register(Metric::gauge(id.clone(), description, unit))?;
        Ok(GaugeHandle {
            id,
            backend: self.backend.clone(),
        })
    }

    /// Registers (or looks up) a histogram with the given bucket bounds.
    ///
    /// When the histogram already exists its original bounds are kept.
    pub fn register_histogram(
        &self,
        id: MetricId,
        description: impl Into<String>,
        unit: impl Into<String>,
        buckets: Vec<f64>,
    ) -> MetricsResult<HistogramHandle> {
        self.register(Metric::histogram(id.clone(), description, unit, buckets))?;
        Ok(HistogramHandle {
            id,
            backend: self.backend.clone(),
        })
    }

    fn register(&self, metric: Metric) -> MetricsResult<()> {
        let expected = metric.kind();
        let id = metric.id.clone();
        let found = self.backend.insert_if_absent(metric)?;
        if found != expected {
            return Err(MetricsError::KindMismatch {
                id,
                expected,
                found,
            });
        }
        Ok(())
    }

    /// Returns a copy of a metric.
    pub fn get_metric(&self, id: &MetricId) -> MetricsResult<Metric> {
        self.backend.get_metric(id)
    }

    /// Returns `true` if the metric is registered.
    pub fn contains_metric(&self, id: &MetricId) -> bool {
        self.backend.contains_metric(id)
    }

    /// Returns copies of every metric in `namespace`, sorted by id.
    pub fn namespace_metrics(&self, namespace: &str) -> Vec<Metric> {
        let mut metrics: Vec<_> = self
            .backend
            .list_all_metrics()
            .into_iter()
            .filter(|metric| metric.id.namespace == namespace)
            .collect();
        metrics.sort_by(|a, b| a.id.cmp(&b.id));
        metrics
    }

    /// Number of registered metrics.
    pub fn metric_count(&self) -> usize {
        self.backend.metric_count()
    }

    /// Removes every metric. Outstanding handles fail with `NotFound` afterwards.
    pub fn clear_all(&self) -> MetricsResult<()> {
        self.backend.clear_all()
    }

    /// Serializes every metric in `namespace` as a JSON array.
    pub fn export_json(&self, namespace: &str) -> serde_json::Result<String> {
        let snapshots: Vec<_> = self
            .namespace_metrics(namespace)
            .into_iter()
            .map(|metric| MetricSnapshot {
                id: metric.id.to_string(),
                kind: metric.kind(),
                unit: metric.unit,
                value: metric.value,
            })
            .collect();
        serde_json::to_string_pretty(&snapshots)
    }

    /// Direct access to the backend.
    pub fn backend(&self) -> &Arc<dyn MetricsBackend> {
        &self.backend
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct MetricSnapshot {
    id: String,
    kind: MetricKind,
    unit: String,
    value: MetricValue,
}

/// Handle to a registered counter.
#[derive(Debug, Clone)]
pub struct CounterHandle {
    id: MetricId,
    backend: Arc<dyn MetricsBackend>,
}

impl CounterHandle {
    /// Adds one and returns the new value.
    pub fn increment(&self) -> MetricsResult<u64> {
        self.backend.increment_counter(&self.id, 1)
    }

    /// Adds `amount` and returns the new value.
    pub fn increment_by(&self, amount: u64) -> MetricsResult<u64> {
        self.backend.increment_counter(&self.id, amount)
    }

    /// Current value.
    pub fn get(&self) -> MetricsResult<u64> {
        let metric = self.backend.get_metric(&self.id)?;
        metric.value.as_counter().ok_or(MetricsError::KindMismatch {
            id: self.id.clone(),
            expected: MetricKind::Counter,
            found: metric.kind(),
        })
    }

    /// The metric's id.
    pub fn id(&self) -> &MetricId {
        &self.id
    }
}

/// Handle to a registered gauge.
#[derive(Debug, Clone)]
pub struct GaugeHandle {
    id: MetricId,
    backend: Arc<dyn MetricsBackend>,
}

impl GaugeHandle {
    /// Sets the gauge.
    pub fn set(&self, value: f64) -> MetricsResult<()> {
        self.backend.set_gauge(&self.id, value)
    }

    /// Adds `delta` and returns the new value.
    pub fn add(&self, delta: f64) -> MetricsResult<f64> {
        self.backend.add_to_gauge(&self.id, delta)
    }

    /// Subtracts `delta` and returns the new value.
    pub fn sub(&self, delta: f64) -> MetricsResult<f64> {
        self.backend.add_to_gauge(&self.id, -delta)
    }

    /// Current value.
    pub fn get(&self) -> MetricsResult<f64> {
        let metric = self.backend.get_metric(&self.id)?;
        metric.value.as_gauge().ok_or(MetricsError::KindMismatch {
            id: self.id.clone(),
            expected: MetricKind::Gauge,
            found: metric.kind(),
        })
    }

    /// The metric's id.
    pub fn id(&self) -> &MetricId {
        &self.id
    }
}

/// Handle to a registered histogram.
#[derive(Debug, Clone)]
pub struct HistogramHandle {
    id: MetricId,
    backend: Arc<dyn MetricsBackend>,
}

impl HistogramHandle {
    /// Records one observation.
    pub fn observe(&self, value: f64) -> MetricsResult<()> {
        self.backend.observe_histogram(&self.id, value)
    }

    /// Copy of the current distribution.
    pub fn snapshot(&self) -> MetricsResult<Histogram> {
        let metric = self.backend.get_metric(&self.id)?;
        match metric.value {
            MetricValue::Histogram(histogram) => Ok(histogram),
            other => Err(MetricsError::KindMismatch {
                id: self.id.clone(),
                expected: MetricKind::Histogram,
                found: other.kind(),
            }),
        }
    }

    /// The metric's id.
    pub fn id(&self) -> &MetricId {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_registration_and_operations() {
        let registry = MetricsRegistry::new();
        let counter = registry
            .register_counter(MetricId::new("import", "completed"), "Completed imports")
            .unwrap();

        assert_eq!(counter.increment().unwrap(), 1);
        assert_eq!(counter.increment_by(5).unwrap(), 6);
        assert_eq!(counter.get().unwrap(), 6);
        assert!(registry.contains_metric(counter.id()));
        assert_eq!(registry.metric_count(), 1);
    }

    #[test]
    fn gauge_registration_and_operations() {
        let registry = MetricsRegistry::new();
        let gauge = registry
            .register_gauge(MetricId::new("import", "live"), "Live resources", "count")
            .unwrap();

        gauge.set(10.0).unwrap();
        assert_eq!(gauge.add(5.0).unwrap(), 15.0);
        assert_eq!(gauge.sub(2.5).unwrap(), 12.5);
        assert_eq!(gauge.get().unwrap(), 12.5);
    }

    #[test]
    fn histogram_registration_and_operations() {
        let registry = MetricsRegistry::new();
        let histogram = registry
            .register_histogram(
                MetricId::new("import", "deserialize_ms"),
                "Deserialization time",
                "ms",
                vec![1.0, 10.0, 100.0],
            )
            .unwrap();

        histogram.observe(0.5).unwrap();
        histogram.observe(42.0).unwrap();

        let snapshot = histogram.snapshot().unwrap();
        assert_eq!(snapshot.count(), 2);
        assert_eq!(snapshot.counts(), &[1, 0, 1, 0]);
    }

    #[test]
    fn registration_is_idempotent_per_kind() {
        let registry = MetricsRegistry::new();
        let id = MetricId::new("import", "completed").with_label("env", "a");

        let first = registry.register_counter(id.clone(), "first").unwrap();
        first.increment_by(3).unwrap();
        let second = registry.register_counter(id.clone(), "second").unwrap();
        assert_eq!(second.get().unwrap(), 3);
        assert_eq!(registry.metric_count(), 1);

        let conflict = registry.register_gauge(id, "conflict", "count");
        assert!(matches!(
            conflict,
            Err(MetricsError::KindMismatch {
                expected: MetricKind::Gauge,
                found: MetricKind::Counter,
                ..
            })
        ));
    }

    #[test]
    fn export_json_lists_namespace() {
        let registry = MetricsRegistry::new();
        registry
            .register_counter(MetricId::new("import", "completed"), "Completed")
            .unwrap()
            .increment()
            .unwrap();
        registry
            .register_counter(MetricId::new("render", "frames"), "Frames")
            .unwrap();

        let json = registry.export_json("import").unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        let entries = parsed.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["id"], "import:completed");
        assert_eq!(entries[0]["value"]["Counter"], 1);
    }
}
