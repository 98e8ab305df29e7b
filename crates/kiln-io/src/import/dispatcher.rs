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

//! The shared state behind an environment and the three-phase pipeline.
//!
//! Every container runs the same three phases, built together when a run
//! starts:
//!
//! 1. **import**: read the compiled resource and deserialize it;
//! 2. **resolve**: acquire every referenced resource, wait for *their*
//!    import phase, then link the references;
//! 3. **finalize**: wait for the resolve phase of everything reachable,
//!    publish the whole reachable set at once, then wait for the finalize
//!    phase of every reachable resource that cannot reach this one back.
//!
//! Import and resolve only wait on a strictly earlier phase of another
//! container. Finalize phases wait on each other only along references that
//! leave a cycle, so reference cycles can never turn into wait cycles.
//! Resources on one cycle are published together under the cache lock.

use super::cache::ResourceCache;
use super::container::{
    Admission, Commit, ImportedStage, PhaseFuture, PipelineRun, ResolvedStage, ResourceContainer,
};
use super::metrics::{bump, ImportMetrics};
use super::registry::{DeserializerRegistry, DisposerChain};
use super::release::release_container;
use super::statistics::ImportStatistics;
use crate::config::{FailurePolicy, ImportConfig};
use crate::library::LibraryRegistry;
use futures::future::{BoxFuture, FutureExt};
use kiln_core::format::{read_compiled_resource, CompiledResource};
use kiln_core::import::{
    DeserializationContext, ImportError, ReferencePropertyKey, StreamViolation,
};
use kiln_core::{ResourceAddress, ResourceHandle, ResourceId};
use kiln_telemetry::ScopedMetricTimer;
use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Cursor;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub(crate) struct ImportDispatcher {
    pub(crate) config: ImportConfig,
    pub(crate) libraries: LibraryRegistry,
    pub(crate) deserializers: DeserializerRegistry,
    pub(crate) disposers: DisposerChain,
    pub(crate) cache: ResourceCache,
    pub(crate) statistics: ImportStatistics,
    pub(crate) metrics: Option<ImportMetrics>,
    pub(crate) runtime: Handle,
    pub(crate) tracker: TaskTracker,
    pub(crate) shutting_down: AtomicBool,
}

impl ImportDispatcher {
    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Takes one reference on the container for `address`, starting or
    /// restarting its pipeline when needed.
    ///
    /// Waits while a previous run of the same resource is being torn down.
    pub(crate) async fn acquire(
        self: &Arc<Self>,
        address: ResourceAddress,
        reject_when_shut_down: bool,
    ) -> Result<(Arc<ResourceContainer>, PipelineRun), ImportError> {
        loop {
            if reject_when_shut_down && self.is_shutting_down() {
                return Err(ImportError::ShutDown);
            }

            let (container, admission) = self.cache.get_or_begin_importing(
                address.resource,
                |existing| {
                    if existing.address().library != address.library {
                        log::debug!(
                            "[ImportDispatcher] {address} joins the cached {}; resources are cached by id",
                            existing.address()
                        );
                    }
                    let admission = existing
                        .admit(|generation, cancel| self.start_run(existing, generation, cancel));
                    self.account(admission)
                },
                || {
                    let container = Arc::new(ResourceContainer::new(address));
                    let run = container
                        .begin(|generation, cancel| self.start_run(&container, generation, cancel));
                    let admission = self.account(Admission::Started(run));
                    (container, admission)
                },
            );

            match admission {
                Admission::Joined(run) | Admission::Started(run) => return Ok((container, run)),
                Admission::Quarantined(error) => return Err(error),
                Admission::Retiring(mut retired) => {
                    if retired.wait_for(|done| *done).await.is_err() {
                        return Err(ImportError::Internal {
                            resource: address.resource,
                            message: "teardown of the previous run was abandoned".to_string(),
                        });
                    }
                }
            }
        }
    }

    // Runs under the cache lock so statistics move together with the count.
    fn account(&self, admission: Admission) -> Admission {
        match &admission {
            Admission::Joined(_) => self.statistics.reference_acquired(),
            Admission::Started(_) => {
                self.statistics.reference_acquired();
                self.statistics.run_started();
            }
            Admission::Retiring(_) | Admission::Quarantined(_) => {}
        }
        admission
    }

    fn start_run(
        self: &Arc<Self>,
        container: &Arc<ResourceContainer>,
        generation: u64,
        cancel: CancellationToken,
    ) -> PipelineRun {
        log::debug!(
            "[ImportDispatcher] Starting run {generation} of {}",
            container.address()
        );
        let import = import_phase(Arc::clone(self), container.address(), cancel.clone()).shared();
        let resolve = resolve_phase(
            Arc::clone(self),
            Arc::clone(container),
            import.clone(),
            cancel.clone(),
        )
        .shared();
        let finalize = finalize_phase(
            Arc::clone(self),
            Arc::clone(container),
            generation,
            import.clone(),
            resolve.clone(),
            cancel.clone(),
        )
        .shared();

        let driver = finalize.clone();
        self.tracker.spawn_on(
            async move {
                let _ = driver.await;
            },
            &self.runtime,
        );

        PipelineRun {
            generation,
            cancel,
            import,
            resolve,
            finalize,
        }
    }

    /// Blocking part of phase 1.
    fn read_compiled(&self, address: ResourceAddress) -> Result<CompiledResource, ImportError> {
        let mut stream = self
            .libraries
            .open(address)?
            .ok_or(ImportError::StreamContract {
                address,
                violation: StreamViolation::Missing,
            })?;
        stream
            .capabilities()
            .check()
            .map_err(|violation| ImportError::StreamContract { address, violation })?;
        Ok(read_compiled_resource(&mut stream)?)
    }

    /// Gives back references held by a run that will not complete.
    pub(crate) fn release_references(
        self: &Arc<Self>,
        owner: &Arc<ResourceContainer>,
        references: impl IntoIterator<Item = Arc<ResourceContainer>>,
    ) {
        for reference in references {
            if Arc::ptr_eq(&reference, owner) {
                if owner.drop_self_reference() {
                    self.statistics.references_released(1);
                }
            } else {
                self.release_detached(reference);
            }
        }
    }

    /// Releases one reference on a tracked background task.
    pub(crate) fn release_detached(self: &Arc<Self>, container: Arc<ResourceContainer>) {
        let this = Arc::clone(self);
        self.tracker.spawn_on(
            async move {
                let address = container.address();
                if let Err(e) = release_container(this, container, None).await {
                    log::debug!("[ImportDispatcher] Background release of {address} failed: {e}");
                }
            },
            &self.runtime,
        );
    }

    /// Failure path of a run, executed inside its finalize phase.
    fn fail_run(
        self: &Arc<Self>,
        container: &Arc<ResourceContainer>,
        import: &PhaseFuture<ImportedStage>,
        resolve: &PhaseFuture<ResolvedStage>,
        error: &ImportError,
    ) {
        let address = container.address();
        if let Some(Ok(resolved)) = resolve.peek() {
            self.release_references(container, resolved.references.iter().cloned());
        }
        if let Some(Ok(imported)) = import.peek() {
            if !self.disposers.dispose(&imported.object) {
                log::debug!("[ImportDispatcher] No disposer took the abandoned object of {address}");
            }
        }

        // Statistics move before the status so observers of the status see them.
        if error.is_canceled() {
            self.statistics.run_canceled();
            if let Some(metrics) = &self.metrics {
                bump(&metrics.imports_canceled);
            }
            container.mark_canceled();
            log::debug!("[ImportDispatcher] Import of {address} was canceled");
            return;
        }

        self.statistics.run_failed();
        if let Some(metrics) = &self.metrics {
            bump(&metrics.imports_failed);
        }
        match self.config.failure_policy {
            FailurePolicy::Evict => {
                let mut maps = self.cache.lock();
                maps.remove_if_same(container.id(), container);
                container.mark_failed(error.clone());
            }
            FailurePolicy::Quarantine => container.mark_failed(error.clone()),
        }
        log::warn!("[ImportDispatcher] Import of {address} failed: {error}");
    }

    fn log_unresolved(&self, owner: ResourceId, target: ResourceId, reason: &str) {
        if self.config.log_unresolved_references {
            log::warn!("[ImportDispatcher] Reference {owner} -> {target} left unbound: {reason}");
        } else {
            log::debug!("[ImportDispatcher] Reference {owner} -> {target} left unbound: {reason}");
        }
    }
}

fn ensure_live(cancel: &CancellationToken, id: ResourceId) -> Result<(), ImportError> {
    if cancel.is_cancelled() {
        Err(ImportError::Canceled(id))
    } else {
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "deserializer panicked".to_string()
    }
}

fn import_phase(
    this: Arc<ImportDispatcher>,
    address: ResourceAddress,
    cancel: CancellationToken,
) -> BoxFuture<'static, Result<ImportedStage, ImportError>> {
    async move {
        let id = address.resource;
        ensure_live(&cancel, id)?;

        let reader = Arc::clone(&this);
        let compiled = this
            .runtime
            .spawn_blocking(move || reader.read_compiled(address))
            .await
            .map_err(|e| ImportError::Internal {
                resource: id,
                message: e.to_string(),
            })??;
        ensure_live(&cancel, id)?;

        let name = compiled.deserializer;
        let deserializer = this
            .deserializers
            .get(&name)
            .ok_or_else(|| ImportError::DeserializerNotFound(name.clone()))?;

        let mut context = DeserializationContext::new(id);
        let outcome = {
            let _timer =
                ScopedMetricTimer::new(this.metrics.as_ref().map(|m| &m.deserialize_time_ms));
            AssertUnwindSafe(deserializer.deserialize(
                Cursor::new(compiled.data),
                compiled.options.map(Cursor::new),
                &mut context,
                cancel.clone(),
            ))
            .catch_unwind()
            .await
        };

        let object = match outcome {
            Ok(Ok(object)) => object,
            Ok(Err(_)) if cancel.is_cancelled() => return Err(ImportError::Canceled(id)),
            Ok(Err(error)) => return Err(ImportError::deserialization(id, name, error)),
            Err(panic) => {
                return Err(ImportError::Internal {
                    resource: id,
                    message: panic_message(&*panic),
                })
            }
        };

        log::trace!(
            "[ImportDispatcher] Deserialized {address} with '{name}', {} reference(s) requested",
            context.requests().len()
        );
        Ok(ImportedStage {
            object,
            deserializer,
            context: Arc::new(context),
        })
    }
    .boxed()
}

fn resolve_phase(
    this: Arc<ImportDispatcher>,
    container: Arc<ResourceContainer>,
    import: PhaseFuture<ImportedStage>,
    cancel: CancellationToken,
) -> BoxFuture<'static, Result<ResolvedStage, ImportError>> {
    async move {
        let id = container.id();
        let imported = import.await?;
        ensure_live(&cancel, id)?;

        let mut context = DeserializationContext::clone(&imported.context);
        context.seal_requests();

        let mut references = Vec::new();
        let handles =
            match link_targets(&this, &container, &imported, &context, &cancel, &mut references)
                .await
            {
                Ok(handles) => handles,
                Err(error) => {
                    this.release_references(&container, references);
                    return Err(error);
                }
            };

        let bound: HashMap<ReferencePropertyKey, ResourceHandle> = context
            .requests()
            .iter()
            .filter_map(|(key, target)| Some((key.clone(), handles.get(target)?.clone())))
            .collect();
        context.bind_resolved(bound);

        let linked = std::panic::catch_unwind(AssertUnwindSafe(|| {
            imported
                .deserializer
                .resolve_references(&imported.object, &context)
        }));
        match linked {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("[ImportDispatcher] Linking references of {id} failed: {e:#}"),
            Err(panic) => log::error!(
                "[ImportDispatcher] Linking references of {id} panicked: {}",
                panic_message(&*panic)
            ),
        }

        if cancel.is_cancelled() {
            this.release_references(&container, references);
            return Err(ImportError::Canceled(id));
        }
        Ok(ResolvedStage {
            object: imported.object.clone(),
            references: references.into(),
        })
    }
    .boxed()
}

/// Acquires every requested target and waits for its import phase.
///
/// Every reference taken is pushed to `references` right away, so the caller
/// can give them back if this fails halfway.
async fn link_targets(
    this: &Arc<ImportDispatcher>,
    container: &Arc<ResourceContainer>,
    imported: &ImportedStage,
    context: &DeserializationContext,
    cancel: &CancellationToken,
    references: &mut Vec<Arc<ResourceContainer>>,
) -> Result<HashMap<ResourceId, ResourceHandle>, ImportError> {
    let id = container.id();
    let mut seen = HashSet::new();
    let mut handles = HashMap::new();

    for &(_, target) in context.requests() {
        if target.is_null() || !seen.insert(target) {
            continue;
        }

        if target == id {
            this.statistics.reference_acquired();
            if !container.acquire_self() {
                this.statistics.references_released(1);
                return Err(ImportError::Canceled(id));
            }
            references.push(Arc::clone(container));
            handles.insert(id, ResourceHandle::new(id, imported.object.clone()));
            continue;
        }

        let Some(address) = this.libraries.locate(target) else {
            this.log_unresolved(id, target, "not found in any library");
            continue;
        };

        let acquired = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ImportError::Canceled(id)),
            acquired = this.acquire(address, false) => acquired,
        };
        let (sibling, run) = match acquired {
            Ok(acquired) => acquired,
            Err(e) => {
                this.log_unresolved(id, target, &e.to_string());
                continue;
            }
        };
        references.push(Arc::clone(&sibling));

        let stage = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ImportError::Canceled(id)),
            stage = run.import.clone() => stage,
        };
        match stage {
            Ok(stage) => {
                handles.insert(target, ResourceHandle::new(target, stage.object));
            }
            Err(e) => {
                this.log_unresolved(id, target, &e.to_string());
                references.pop();
                this.release_detached(sibling);
            }
        }
    }
    Ok(handles)
}

fn finalize_phase(
    this: Arc<ImportDispatcher>,
    container: Arc<ResourceContainer>,
    generation: u64,
    import: PhaseFuture<ImportedStage>,
    resolve: PhaseFuture<ResolvedStage>,
    cancel: CancellationToken,
) -> BoxFuture<'static, Result<ResourceHandle, ImportError>> {
    async move {
        match publish(&this, &container, generation, resolve.clone(), &cancel).await {
            Ok(handle) => Ok(handle),
            Err(error) => match container.published_object(generation) {
                // A referrer published this run before the cancellation landed.
                Some(object) => Ok(ResourceHandle::new(container.id(), object)),
                None => {
                    this.fail_run(&container, &import, &resolve, &error);
                    Err(error)
                }
            },
        }
    }
    .boxed()
}

/// A resource reached from a finalizing run, with its linked stage.
struct Reached {
    container: Arc<ResourceContainer>,
    run: PipelineRun,
    stage: ResolvedStage,
}

// Pointer identity; containers for one id may differ across evictions.
fn node(container: &Arc<ResourceContainer>) -> usize {
    Arc::as_ptr(container) as usize
}

/// Publishes the run once everything it reaches is published as well.
async fn publish(
    this: &Arc<ImportDispatcher>,
    container: &Arc<ResourceContainer>,
    generation: u64,
    resolve: PhaseFuture<ResolvedStage>,
    cancel: &CancellationToken,
) -> Result<ResourceHandle, ImportError> {
    let id = container.id();
    let resolved = resolve.await?;
    ensure_live(cancel, id)?;

    let reached = link_closure(container, &resolved, cancel).await?;
    commit_closure(this, container, generation, cancel, &resolved, &reached)?;

    let cycle = cycle_members(container, &resolved, &reached);
    for member in reached.iter().filter(|m| !cycle.contains(&node(&m.container))) {
        tokio::select! {
            biased;
            // Already published; a release is tearing this run down.
            _ = cancel.cancelled() => break,
            _ = member.run.finalize.clone() => {}
        }
    }
    Ok(ResourceHandle::new(id, resolved.object))
}

/// Walks the references breadth first and waits for each resolve phase.
async fn link_closure(
    container: &Arc<ResourceContainer>,
    resolved: &ResolvedStage,
    cancel: &CancellationToken,
) -> Result<Vec<Reached>, ImportError> {
    let id = container.id();
    let mut visited: HashSet<usize> = HashSet::from([node(container)]);
    let mut queue: VecDeque<Arc<ResourceContainer>> =
        resolved.references.iter().cloned().collect();
    let mut reached = Vec::new();
    while let Some(next) = queue.pop_front() {
        if !visited.insert(node(&next)) {
            continue;
        }
        let Some(run) = next.current_run() else {
            continue;
        };
        let stage = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ImportError::Canceled(id)),
            stage = run.resolve.clone() => stage,
        };
        // A sibling that failed to link is reported by its own run.
        let Ok(stage) = stage else {
            continue;
        };
        queue.extend(stage.references.iter().cloned());
        reached.push(Reached {
            container: next,
            run,
            stage,
        });
    }
    Ok(reached)
}

/// Publishes every reached run, then this one, under a single cache lock.
///
/// Everything a reached resource references is reached too, so its own
/// closure is fully linked at this point.
fn commit_closure(
    this: &Arc<ImportDispatcher>,
    container: &Arc<ResourceContainer>,
    generation: u64,
    cancel: &CancellationToken,
    resolved: &ResolvedStage,
    reached: &[Reached],
) -> Result<(), ImportError> {
    let members = reached
        .iter()
        .map(|m| (&m.container, m.run.generation, &m.run.cancel, &m.stage))
        .chain(std::iter::once((container, generation, cancel, resolved)));

    let mut published = Vec::new();
    let mut own = Commit::Rejected;
    {
        let mut maps = this.cache.lock();
        for (member, generation, cancel, stage) in members {
            let commit = member.commit_success(
                generation,
                cancel,
                stage.object.clone(),
                stage.references.to_vec(),
            );
            if commit == Commit::Published {
                maps.register_object_map(&stage.object, member.id());
                published.push(member.address());
            }
            if Arc::ptr_eq(member, container) {
                own = commit;
            }
        }
    }

    for address in published {
        if let Some(metrics) = &this.metrics {
            bump(&metrics.imports_completed);
        }
        log::debug!("[ImportDispatcher] Imported {address}");
    }
    match own {
        Commit::Published | Commit::AlreadyPublished => Ok(()),
        Commit::Rejected => Err(ImportError::Canceled(container.id())),
    }
}

/// Reached resources that reference `container` back, directly or not.
fn cycle_members(
    container: &Arc<ResourceContainer>,
    resolved: &ResolvedStage,
    reached: &[Reached],
) -> HashSet<usize> {
    let mut referrers: HashMap<usize, Vec<usize>> = HashMap::new();
    let edges = std::iter::once((node(container), &resolved.references))
        .chain(reached.iter().map(|m| (node(&m.container), &m.stage.references)));
    for (from, references) in edges {
        for to in references.iter() {
            referrers.entry(node(to)).or_default().push(from);
        }
    }

    let mut members = HashSet::new();
    let mut pending = vec![node(container)];
    while let Some(target) = pending.pop() {
        for &from in referrers.get(&target).into_iter().flatten() {
            if members.insert(from) {
                pending.push(from);
            }
        }
    }
    members
}
