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

use crate::storage::backend::MetricsBackend;
use kiln_core::telemetry::{Metric, MetricId, MetricKind, MetricsError, MetricsResult};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Metrics backend keeping everything in a `RwLock<HashMap>`.
///
/// Reads share the lock; every update takes the write lock for the duration
/// of a single metric change.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    storage: RwLock<HashMap<MetricId, Metric>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns copies of every metric in `namespace`.
    pub fn metrics_in_namespace(&self, namespace: &str) -> Vec<Metric> {
        self.read()
            .values()
            .filter(|metric| metric.id.namespace == namespace)
            .cloned()
            .collect()
    }

    /// Returns copies of every metric of the given kind.
    pub fn metrics_of_kind(&self, kind: MetricKind) -> Vec<Metric> {
        self.read()
            .values()
            .filter(|metric| metric.kind() == kind)
            .cloned()
            .collect()
    }

    /// Removes every metric in `namespace` and returns how many were removed.
    pub fn remove_namespace(&self, namespace: &str) -> MetricsResult<usize> {
        let mut storage = self.write()?;
        let before = storage.len();
        storage.retain(|id, _| id.namespace != namespace);
        Ok(before - storage.len())
    }

    // A reader never leaves the map half-updated, so a poisoned lock is still
    // safe to read from.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<MetricId, Metric>> {
        self.storage.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> MetricsResult<RwLockWriteGuard<'_, HashMap<MetricId, Metric>>> {
        self.storage
            .write()
            .map_err(|_| MetricsError::Backend("metrics storage lock poisoned".to_string()))
    }
}

impl MetricsBackend for InMemoryBackend {
    fn insert_if_absent(&self, metric: Metric) -> MetricsResult<MetricKind> {
        let mut storage = self.write()?;
        let stored = storage.entry(metric.id.clone()).or_insert(metric);
        Ok(stored.kind())
    }

    fn get_metric(&self, id: &MetricId) -> MetricsResult<Metric> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| MetricsError::NotFound(id.clone()))
    }

    fn modify_metric(
        &self,
        id: &MetricId,
        update: &mut dyn FnMut(&mut Metric) -> MetricsResult<()>,
    ) -> MetricsResult<()> {
        let mut storage = self.write()?;
        let metric = storage
            .get_mut(id)
            .ok_or_else(|| MetricsError::NotFound(id.clone()))?;
        update(metric)?;
        metric.touch();
        Ok(())
    }

    fn remove_metric(&self, id: &MetricId) -> MetricsResult<()> {
        self.write()?
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| MetricsError::NotFound(id.clone()))
    }

    fn contains_metric(&self, id: &MetricId) -> bool {
        self.read().contains_key(id)
    }

    fn list_all_metrics(&self) -> Vec<Metric> {
        self.read().values().cloned().collect()
    }

    fn clear_all(&self) -> MetricsResult<()> {
        self.write()?.clear();
        Ok(())
    }

    fn metric_count(&self) -> usize {
        self.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn insert_get_remove() {
        let backend = InMemoryBackend::new();
        let id = MetricId::new("import", "loads");

        let kind = backend
            .insert_if_absent(Metric::counter(id.clone(), "loads"))
            .unwrap();
        assert_eq!(kind, MetricKind::Counter);
        assert!(backend.contains_metric(&id));
        assert_eq!(backend.get_metric(&id).unwrap().value.as_counter(), Some(0));

        backend.remove_metric(&id).unwrap();
        assert!(!backend.contains_metric(&id));
        assert!(matches!(
            backend.remove_metric(&id),
            Err(MetricsError::NotFound(_))
        ));
    }

    #[test]
    fn insert_if_absent_keeps_existing_value() {
        let backend = InMemoryBackend::new();
        let id = MetricId::new("import", "loads");
        backend
            .insert_if_absent(Metric::counter(id.clone(), "loads"))
            .unwrap();
        backend.increment_counter(&id, 4).unwrap();

        // Re-registering with another kind reports the stored kind.
        let kind = backend
            .insert_if_absent(Metric::gauge(id.clone(), "loads", "count"))
            .unwrap();
        assert_eq!(kind, MetricKind::Counter);
        assert_eq!(backend.get_metric(&id).unwrap().value.as_counter(), Some(4));
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let backend = Arc::new(InMemoryBackend::new());
        let id = MetricId::new("import", "loads");
        backend
            .insert_if_absent(Metric::counter(id.clone(), "loads"))
            .unwrap();

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let backend = backend.clone();
                let id = id.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        backend.increment_counter(&id, 1).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(
            backend.get_metric(&id).unwrap().value.as_counter(),
            Some(8000)
        );
    }

    #[test]
    fn namespace_queries() {
        let backend = InMemoryBackend::new();
        backend
            .insert_if_absent(Metric::counter(MetricId::new("import", "a"), "a"))
            .unwrap();
        backend
            .insert_if_absent(Metric::gauge(MetricId::new("import", "b"), "b", "count"))
            .unwrap();
        backend
            .insert_if_absent(Metric::counter(MetricId::new("other", "c"), "c"))
            .unwrap();

        assert_eq!(backend.metrics_in_namespace("import").len(), 2);
        assert_eq!(backend.metrics_of_kind(MetricKind::Counter).len(), 2);
        assert_eq!(backend.remove_namespace("import").unwrap(), 2);
        assert_eq!(backend.metric_count(), 1);
    }
}
