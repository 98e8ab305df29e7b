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

use kiln_core::telemetry::{Metric, MetricId, MetricKind, MetricValue, MetricsError, MetricsResult};
use std::fmt::Debug;

/// Storage for metric values.
///
/// Backends are shared between threads behind an `Arc`, so every method
/// takes `&self`. Read-modify-write updates go through
/// [`modify_metric`](Self::modify_metric), which implementations must run
/// atomically with respect to other writers of the same metric.
pub trait MetricsBackend: Send + Sync + Debug + 'static {
    /// Stores `metric` unless one with the same id exists.
    ///
    /// Returns the kind of the metric stored under that id afterwards, so the
    /// caller can detect a conflicting registration.
    fn insert_if_absent(&self, metric: Metric) -> MetricsResult<MetricKind>;

    /// Returns a copy of a metric.
    fn get_metric(&self, id: &MetricId) -> MetricsResult<Metric>;

    /// Applies `update` to a stored metric in place.
    fn modify_metric(
        &self,
        id: &MetricId,
        update: &mut dyn FnMut(&mut Metric) -> MetricsResult<()>,
    ) -> MetricsResult<()>;

    /// Removes a metric.
    fn remove_metric(&self, id: &MetricId) -> MetricsResult<()>;

    /// Returns `true` if a metric with this id is stored.
    fn contains_metric(&self, id: &MetricId) -> bool;

    /// Returns copies of every stored metric.
    fn list_all_metrics(&self) -> Vec<Metric>;

    /// Removes every metric.
    fn clear_all(&self) -> MetricsResult<()>;

    /// Number of stored metrics.
    fn metric_count(&self) -> usize;

    /// Adds `delta` to a counter and returns the new value.
    fn increment_counter(&self, id: &MetricId, delta: u64) -> MetricsResult<u64> {
        let mut result = 0;
        self.modify_metric(id, &mut |metric| match &mut metric.value {
            MetricValue::Counter(value) => {
                *value = value.saturating_add(delta);
                result = *value;
                Ok(())
            }
            other => Err(mismatch(id, MetricKind::Counter, other.kind())),
        })?;
        Ok(result)
    }

    /// Sets a gauge.
    fn set_gauge(&self, id: &MetricId, value: f64) -> MetricsResult<()> {
        self.modify_metric(id, &mut |metric| match &mut metric.value {
            MetricValue::Gauge(current) => {
                *current = value;
                Ok(())
            }
            other => Err(mismatch(id, MetricKind::Gauge, other.kind())),
        })
    }

    /// Adds `delta` to a gauge and returns the new value.
    fn add_to_gauge(&self, id: &MetricId, delta: f64) -> MetricsResult<f64> {
        let mut result = 0.0;
        self.modify_metric(id, &mut |metric| match &mut metric.value {
            MetricValue::Gauge(current) => {
                *current += delta;
                result = *current;
                Ok(())
            }
            other => Err(mismatch(id, MetricKind::Gauge, other.kind())),
        })?;
        Ok(result)
    }

    /// Records one histogram observation.
    fn observe_histogram(&self, id: &MetricId, sample: f64) -> MetricsResult<()> {
        self.modify_metric(id, &mut |metric| match &mut metric.value {
            MetricValue::Histogram(histogram) => {
                histogram.observe(sample);
                Ok(())
            }
            other => Err(mismatch(id, MetricKind::Histogram, other.kind())),
        })
    }
}

fn mismatch(id: &MetricId, expected: MetricKind, found: MetricKind) -> MetricsError {
    MetricsError::KindMismatch {
        id: id.clone(),
        expected,
        found,
    }
}
