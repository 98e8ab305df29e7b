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

//! Value types shared by metric producers and metric backends.

use serde::Serialize;
use std::{collections::BTreeMap, fmt, time::Instant};

/// Identifies a metric by namespace, name and an optional set of labels.
///
/// Labels live in a sorted map so two ids built with the same labels in a
/// different order compare and hash equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MetricId {
    /// Broad category, e.g. `"import"`.
    pub namespace: String,
    /// Metric name within the namespace, e.g. `"deserialize_ms"`.
    pub name: String,
    /// Dimensional labels.
    pub labels: BTreeMap<String, String>,
}

impl MetricId {
    /// Creates an id without labels.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            labels: BTreeMap::new(),
        }
    }

    /// Returns the id with one more label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)?;
        if !self.labels.is_empty() {
            f.write_str("[")?;
            for (i, (key, value)) in self.labels.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{key}={value}")?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}

/// The kind of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MetricKind {
    /// Monotonic count.
    Counter,
    /// Point-in-time value.
    Gauge,
    /// Distribution of observations.
    Histogram,
}

/// A bucketed distribution of observations.
///
/// `counts[i]` holds observations `<= bounds[i]` that did not fit an earlier
/// bucket; the extra last slot counts everything above the largest bound.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    bounds: Vec<f64>,
    counts: Vec<u64>,
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Histogram {
    /// Creates an empty histogram. `bounds` are sorted and deduplicated.
    pub fn new(mut bounds: Vec<f64>) -> Self {
        bounds.retain(|b| b.is_finite());
        bounds.sort_by(f64::total_cmp);
        bounds.dedup();
        let counts = vec![0; bounds.len() + 1];
        Self {
            bounds,
            counts,
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    /// Records one observation.
    pub fn observe(&mut self, value: f64) {
        let slot = self.bounds.partition_point(|bound| *bound < value);
        self.counts[slot] += 1;
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Upper bounds of the finite buckets.
    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    /// Per-bucket counts; one longer than [`bounds`](Self::bounds).
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Number of observations.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Sum of all observations.
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Arithmetic mean, or `None` when empty.
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// Smallest observation, or `None` when empty.
    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    /// Largest observation, or `None` when empty.
    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }
}

/// The current value of a metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MetricValue {
    /// Counter value.
    Counter(u64),
    /// Gauge value.
    Gauge(f64),
    /// Histogram state.
    Histogram(Histogram),
}

impl MetricValue {
    /// The kind matching this value.
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Counter(_) => MetricKind::Counter,
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Histogram(_) => MetricKind::Histogram,
        }
    }

    /// Returns the counter value, if this is a counter.
    pub fn as_counter(&self) -> Option<u64> {
        match self {
            MetricValue::Counter(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the gauge value, if this is a gauge.
    pub fn as_gauge(&self) -> Option<f64> {
        match self {
            MetricValue::Gauge(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the histogram, if this is one.
    pub fn as_histogram(&self) -> Option<&Histogram> {
        match self {
            MetricValue::Histogram(h) => Some(h),
            _ => None,
        }
    }
}

/// A registered metric with its description and current value.
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric's id.
    pub id: MetricId,
    /// Human-readable description.
    pub description: String,
    /// Unit of measurement, e.g. `"ms"` or `"count"`.
    pub unit: String,
    /// Current value.
    pub value: MetricValue,
    /// When the value last changed.
    pub updated_at: Instant,
}

impl Metric {
    /// A counter starting at zero.
    pub fn counter(id: MetricId, description: impl Into<String>) -> Self {
        Self::with_value(id, description, "count", MetricValue::Counter(0))
    }

    /// A gauge starting at zero.
    pub fn gauge(id: MetricId, description: impl Into<String>, unit: impl Into<String>) -> Self {
        Self::with_value(id, description, unit, MetricValue::Gauge(0.0))
    }

    /// An empty histogram over `bounds`.
    pub fn histogram(
        id: MetricId,
        description: impl Into<String>,
        unit: impl Into<String>,
        bounds: Vec<f64>,
    ) -> Self {
        Self::with_value(
            id,
            description,
            unit,
            MetricValue::Histogram(Histogram::new(bounds)),
        )
    }

    fn with_value(
        id: MetricId,
        description: impl Into<String>,
        unit: impl Into<String>,
        value: MetricValue,
    ) -> Self {
        Self {
            id,
            description: description.into(),
            unit: unit.into(),
            value,
            updated_at: Instant::now(),
        }
    }

    /// The metric's kind.
    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }

    /// Marks the value as just updated.
    pub fn touch(&mut self) {
        self.updated_at = Instant::now();
    }
}

/// Result alias for metric operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Errors raised by the metrics layer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetricsError {
    /// No metric is registered under this id.
    #[error("metric not found: {0}")]
    NotFound(MetricId),

    /// The metric exists with a different kind.
    #[error("metric {id} is a {found:?}, expected a {expected:?}")]
    KindMismatch {
        /// The metric involved.
        id: MetricId,
        /// The kind the operation needs.
        expected: MetricKind,
        /// The kind that is registered.
        found: MetricKind,
    },

    /// The backend could not store or load the value.
    #[error("metrics backend error: {0}")]
    Backend(String),
}
