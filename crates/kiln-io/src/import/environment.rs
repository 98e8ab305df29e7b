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

//! The public facade over the import runtime.

use super::cache::ResourceCache;
use super::dispatcher::ImportDispatcher;
use super::metrics::ImportMetrics;
use super::operation::ImportingOperation;
use super::registry::{DeserializerRegistry, DisposerChain};
use super::release::ReleaseTarget;
use super::statistics::{ImportStatistics, StatisticsSnapshot};
use crate::config::ImportConfig;
use crate::library::LibraryRegistry;
use kiln_core::import::{Deserializer, Disposer, ImportError, ImportingStatus, ReleaseStatus};
use kiln_core::library::LibraryProvider;
use kiln_core::telemetry::MetricsResult;
use kiln_core::{LibraryId, ResourceAddress, ResourceHandle, ResourceId};
use kiln_telemetry::MetricsRegistry;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;

/// What [`ImportEnvironment::shutdown`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownSummary {
    /// Containers removed from the cache.
    pub drained: usize,
    /// Live objects a disposer accepted.
    pub disposed: usize,
    /// Live objects no disposer accepted.
    pub undisposed: usize,
    /// Runs canceled because the drain timed out.
    pub canceled_runs: usize,
    /// Whether the drain hit the configured timeout.
    pub timed_out: bool,
}

/// Assembles an [`ImportEnvironment`].
#[derive(Default)]
pub struct ImportEnvironmentBuilder {
    config: ImportConfig,
    libraries: LibraryRegistry,
    deserializers: DeserializerRegistry,
    disposers: DisposerChain,
    metrics: Option<MetricsRegistry>,
    runtime: Option<Handle>,
}

impl ImportEnvironmentBuilder {
    /// Replaces the configuration.
    pub fn with_config(mut self, config: ImportConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds a library.
    pub fn with_library(self, library: impl LibraryProvider) -> Self {
        self.with_shared_library(Arc::new(library))
    }

    /// Adds a library that is also used elsewhere.
    pub fn with_shared_library(mut self, library: Arc<dyn LibraryProvider>) -> Self {
        self.libraries.register(library);
        self
    }

    /// Registers a deserializer under the name compiled resources use.
    pub fn with_deserializer(
        mut self,
        name: impl Into<String>,
        deserializer: impl Deserializer,
    ) -> Self {
        self.deserializers.register(name, Arc::new(deserializer));
        self
    }

    /// Appends a disposer to the chain. Disposers are tried in order.
    pub fn with_disposer(mut self, disposer: impl Disposer) -> Self {
        self.disposers.push(Arc::new(disposer));
        self
    }

    /// Publishes import metrics into `registry`.
    pub fn with_metrics(mut self, registry: MetricsRegistry) -> Self {
        self.metrics = Some(registry);
        self
    }

    /// Drives pipelines on `runtime` instead of the current one.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Builds the environment.
    ///
    /// Fails with [`ImportError::NoRuntime`] when no runtime was given and
    /// the caller is not inside one.
    pub fn build(self) -> Result<ImportEnvironment, ImportError> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| ImportError::NoRuntime)?,
        };

        let metrics = self.metrics.as_ref().and_then(|registry| {
            ImportMetrics::register(registry, &self.config.metrics_namespace)
                .map_err(|e| log::warn!("[ImportEnvironment] Import metrics disabled: {e}"))
                .ok()
        });

        log::info!(
            "[ImportEnvironment] Ready (libraries: {}, deserializers: {}, disposers: {})",
            self.libraries.len(),
            self.deserializers.names().len(),
            self.disposers.len()
        );

        Ok(ImportEnvironment {
            dispatcher: Arc::new(ImportDispatcher {
                config: self.config,
                libraries: self.libraries,
                deserializers: self.deserializers,
                disposers: self.disposers,
                cache: ResourceCache::default(),
                statistics: ImportStatistics::default(),
                metrics,
                runtime,
                tracker: TaskTracker::new(),
                shutting_down: AtomicBool::new(false),
            }),
        })
    }
}

/// Imports compiled resources into shared, reference-counted objects.
///
/// Cloning is cheap; clones share the same cache.
#[derive(Clone)]
pub struct ImportEnvironment {
    dispatcher: Arc<ImportDispatcher>,
}

impl ImportEnvironment {
    /// Starts building an environment.
    pub fn builder() -> ImportEnvironmentBuilder {
        ImportEnvironmentBuilder::default()
    }

    /// Takes a reference on the resource at `address`.
    ///
    /// Addressing errors come back before anything is touched. The returned
    /// operation resolves once the resource and its references are linked.
    pub async fn import(&self, address: ResourceAddress) -> Result<ImportingOperation, ImportError> {
        let dispatcher = &self.dispatcher;
        if dispatcher.is_shutting_down() {
            return Err(ImportError::ShutDown);
        }
        dispatcher.libraries.validate(address)?;

        let (container, run) = dispatcher.acquire(address, true).await?;
        Ok(ImportingOperation::new(container, run.generation, run.finalize))
    }

    /// Imports `id` from the first library that contains it.
    pub async fn import_id(&self, id: ResourceId) -> Result<ImportingOperation, ImportError> {
        let address = self
            .dispatcher
            .libraries
            .locate(id)
            .ok_or(ImportError::ResourceNotFound(id))?;
        self.import(address).await
    }

    /// Imports the resource compiled under `name` in `library`.
    pub async fn import_named(
        &self,
        library: LibraryId,
        name: &str,
    ) -> Result<ImportingOperation, ImportError> {
        let address = self.dispatcher.libraries.resolve_name(library, name)?;
        self.import(address).await
    }

    /// Gives back one reference.
    ///
    /// At the last reference an unfinished import is canceled and a finished
    /// one is disposed, together with the references it holds.
    pub async fn release<'a>(
        &self,
        target: impl Into<ReleaseTarget<'a>>,
    ) -> Result<ReleaseStatus, ImportError> {
        self.dispatcher.release(target.into()).await
    }

    /// The live object of `id`, if its import succeeded.
    pub fn get(&self, id: ResourceId) -> Option<ResourceHandle> {
        let object = self.dispatcher.cache.get(id)?.object()?;
        Some(ResourceHandle::new(id, object))
    }

    /// Status of the cached container for `id`.
    pub fn status(&self, id: ResourceId) -> Option<ImportingStatus> {
        self.dispatcher.cache.get(id).map(|c| c.status())
    }

    /// Reference count of `id`, zero when it is not cached.
    pub fn reference_count(&self, id: ResourceId) -> u32 {
        self.dispatcher
            .cache
            .get(id)
            .map_or(0, |c| c.reference_count())
    }

    /// Whether a container for `id` is cached.
    pub fn contains(&self, id: ResourceId) -> bool {
        self.dispatcher.cache.get(id).is_some()
    }

    /// Number of cached containers.
    pub fn len(&self) -> usize {
        self.dispatcher.cache.len()
    }

    /// Returns `true` when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the live counters.
    pub fn statistics(&self) -> StatisticsSnapshot {
        self.dispatcher.statistics.snapshot()
    }

    /// Pushes the current statistics to the registered gauges.
    ///
    /// A no-op when the environment was built without metrics.
    pub fn publish_metrics(&self) -> MetricsResult<()> {
        match &self.dispatcher.metrics {
            Some(metrics) => metrics.publish(&self.statistics()),
            None => Ok(()),
        }
    }

    /// Drops a quarantined failed container so the next import starts clean.
    ///
    /// Returns `false` when `id` is not cached or did not fail.
    pub fn evict(&self, id: ResourceId) -> bool {
        let Some(container) = self.dispatcher.cache.get(id) else {
            return false;
        };
        let mut maps = self.dispatcher.cache.lock();
        if container.status() != ImportingStatus::Failed {
            return false;
        }
        let evicted = maps.remove_if_same(id, &container);
        if evicted {
            log::info!("[ImportEnvironment] Evicted failed resource {}", container.address());
        }
        evicted
    }

    /// Stops the environment.
    ///
    /// New imports are rejected, running pipelines are drained (canceled once
    /// the configured timeout expires), then every cached object is disposed
    /// exactly once. Later calls return an empty summary.
    pub async fn shutdown(&self) -> ShutdownSummary {
        let dispatcher = &self.dispatcher;
        if dispatcher.shutting_down.swap(true, Ordering::AcqRel) {
            return ShutdownSummary::default();
        }
        log::info!("[ImportEnvironment] Shutting down");
        dispatcher.tracker.close();

        let mut summary = ShutdownSummary::default();
        match dispatcher.config.shutdown_timeout() {
            Some(timeout) => {
                if tokio::time::timeout(timeout, dispatcher.tracker.wait())
                    .await
                    .is_err()
                {
                    summary.timed_out = true;
                    summary.canceled_runs = dispatcher
                        .cache
                        .snapshot()
                        .iter()
                        .filter(|container| container.cancel_run())
                        .count();
                    log::warn!(
                        "[ImportEnvironment] Drain timed out after {timeout:?}; canceled {} run(s)",
                        summary.canceled_runs
                    );
                    dispatcher.tracker.wait().await;
                }
            }
            None => dispatcher.tracker.wait().await,
        }

        let containers = dispatcher.cache.drain();
        summary.drained = containers.len();
        for container in containers {
            let (object, released) = container.shut_down();
            dispatcher
                .statistics
                .references_released(u64::from(released));
            let Some(object) = object else {
                continue;
            };
            let disposed = dispatcher.disposers.dispose(&object);
            dispatcher.statistics.run_retired(disposed);
            if disposed {
                summary.disposed += 1;
            } else {
                summary.undisposed += 1;
            }
        }

        log::info!(
            "[ImportEnvironment] Shut down: {} drained, {} disposed, {} undisposed",
            summary.drained,
            summary.disposed,
            summary.undisposed
        );
        summary
    }
}
