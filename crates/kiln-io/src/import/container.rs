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

//! Per-resource state shared by the cache, the pipeline and the callers.

use futures::future::{BoxFuture, Shared};
use kiln_core::import::{DeserializationContext, Deserializer, ImportError, ImportingStatus};
use kiln_core::{ResourceAddress, ResourceHandle, ResourceId, ResourceObject};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// A pipeline phase, awaitable by any number of callers.
pub(crate) type PhaseFuture<T> = Shared<BoxFuture<'static, Result<T, ImportError>>>;

/// Output of phase 1.
#[derive(Clone)]
pub(crate) struct ImportedStage {
    pub(crate) object: ResourceObject,
    pub(crate) deserializer: Arc<dyn Deserializer>,
    pub(crate) context: Arc<DeserializationContext>,
}

/// Output of phase 2.
#[derive(Clone)]
pub(crate) struct ResolvedStage {
    pub(crate) object: ResourceObject,
    /// Containers this run holds a reference on, one entry per reference unit.
    pub(crate) references: Arc<[Arc<ResourceContainer>]>,
}

/// The three phase futures of one pipeline run.
#[derive(Clone)]
pub(crate) struct PipelineRun {
    pub(crate) generation: u64,
    pub(crate) cancel: CancellationToken,
    pub(crate) import: PhaseFuture<ImportedStage>,
    pub(crate) resolve: PhaseFuture<ResolvedStage>,
    pub(crate) finalize: PhaseFuture<ResourceHandle>,
}

/// How an acquire on an existing container was handled.
pub(crate) enum Admission {
    /// The current run was joined; the count went up by one.
    Joined(PipelineRun),
    /// A new run was started with a count of one.
    Started(PipelineRun),
    /// The last reference is being released; retry once the receiver flips.
    Retiring(watch::Receiver<bool>),
    /// The container holds a failed run under the quarantine policy.
    Quarantined(ImportError),
}

/// Outcome of publishing a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Commit {
    /// The run moved to `Success` just now.
    Published,
    /// Another finalize phase already published this run.
    AlreadyPublished,
    /// The run was canceled or replaced.
    Rejected,
}

/// Outcome of dropping one reference.
pub(crate) enum Decrement {
    /// Other references remain.
    Remaining,
    /// That was the last external reference; the caller must finish the
    /// teardown and then call [`ResourceContainer::finish_retirement`].
    Retiring(Retirement),
}

/// A teardown in progress. Acquirers wait until it is finished.
pub(crate) struct Retirement {
    pub(crate) run: Option<PipelineRun>,
    /// References dropped at the zero crossing, self references included.
    pub(crate) released: u32,
    notify: watch::Sender<bool>,
}

#[derive(Default)]
struct ContainerState {
    run: Option<PipelineRun>,
    object: Option<ResourceObject>,
    references: Vec<Arc<ResourceContainer>>,
    retirement: Option<watch::Receiver<bool>>,
    failure: Option<ImportError>,
}

/// One slot of the resource cache.
///
/// The slot outlives individual pipeline runs: after a cancellation it is
/// restarted in place, so racing callers holding the `Arc` keep observing
/// the same object.
///
/// The reference count packs two numbers in one atomic: the low half is the
/// total count, the high half how many of those units the resource holds on
/// itself through self references. The resource is retired when the
/// external count (total minus self) drops to zero.
pub(crate) struct ResourceContainer {
    address: ResourceAddress,
    counts: AtomicU64,
    status: AtomicU8,
    generation: AtomicU64,
    state: Mutex<ContainerState>,
}

const fn pack(total: u32, own: u32) -> u64 {
    ((own as u64) << 32) | total as u64
}

const fn unpack(counts: u64) -> (u32, u32) {
    (counts as u32, (counts >> 32) as u32)
}

impl ResourceContainer {
    /// Creates an idle container. Call [`begin`](Self::begin) before sharing it.
    pub(crate) fn new(address: ResourceAddress) -> Self {
        Self {
            address,
            counts: AtomicU64::new(0),
            status: AtomicU8::new(ImportingStatus::Importing.as_u8()),
            generation: AtomicU64::new(0),
            state: Mutex::new(ContainerState::default()),
        }
    }

    pub(crate) fn id(&self) -> ResourceId {
        self.address.resource
    }

    pub(crate) fn address(&self) -> ResourceAddress {
        self.address
    }

    pub(crate) fn status(&self) -> ImportingStatus {
        ImportingStatus::from_u8(self.status.load(Ordering::Acquire))
            .unwrap_or(ImportingStatus::Failed)
    }

    fn set_status(&self, status: ImportingStatus) {
        self.status.store(status.as_u8(), Ordering::Release);
    }

    /// Total reference count, self references included.
    pub(crate) fn reference_count(&self) -> u32 {
        unpack(self.counts.load(Ordering::Acquire)).0
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Starts the first run of a fresh container with a count of one.
    pub(crate) fn begin(
        &self,
        start: impl FnOnce(u64, CancellationToken) -> PipelineRun,
    ) -> PipelineRun {
        let mut state = self.state.lock();
        self.install_run(&mut state, start)
    }

    fn install_run(
        &self,
        state: &mut ContainerState,
        start: impl FnOnce(u64, CancellationToken) -> PipelineRun,
    ) -> PipelineRun {
        let generation = self.generation.load(Ordering::Acquire) + 1;
        self.generation.store(generation, Ordering::Release);
        state.failure = None;
        state.object = None;
        state.references.clear();
        self.counts.store(pack(1, 0), Ordering::Release);
        self.set_status(ImportingStatus::Importing);

        let run = start(generation, CancellationToken::new());
        state.run = Some(run.clone());
        run
    }

    /// Adds one external reference to an existing container.
    ///
    /// Must be called under the cache lock so the container cannot be
    /// removed concurrently.
    pub(crate) fn admit(
        &self,
        start: impl FnOnce(u64, CancellationToken) -> PipelineRun,
    ) -> Admission {
        let mut state = self.state.lock();
        if let Some(retirement) = &state.retirement {
            return Admission::Retiring(retirement.clone());
        }

        let status = self.status();
        if status == ImportingStatus::Failed {
            let error = state.failure.clone().unwrap_or_else(|| ImportError::Internal {
                resource: self.id(),
                message: "failed run without a recorded error".to_string(),
            });
            return Admission::Quarantined(error);
        }

        let (total, own) = unpack(self.counts.load(Ordering::Acquire));
        if total > own {
            if let Some(run) = &state.run {
                // 1 -> 0 only happens under this lock, so the count stays positive.
                self.counts.fetch_add(1, Ordering::AcqRel);
                return Admission::Joined(run.clone());
            }
        }

        if status.is_restartable() || state.run.is_none() {
            return Admission::Started(self.install_run(&mut state, start));
        }

        Admission::Quarantined(ImportError::Internal {
            resource: self.id(),
            message: format!("container in state {status:?} has no references"),
        })
    }

    /// Takes a reference on itself for a self-referencing property.
    ///
    /// Fails when no external reference is left, i.e. the run is being torn
    /// down.
    pub(crate) fn acquire_self(&self) -> bool {
        self.counts
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let (total, own) = unpack(current);
                (total > own).then(|| pack(total + 1, own + 1))
            })
            .is_ok()
    }

    /// Gives back a self reference taken by [`acquire_self`](Self::acquire_self).
    ///
    /// A no-op once the zero crossing already dropped every self reference.
    pub(crate) fn drop_self_reference(&self) -> bool {
        self.counts
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let (total, own) = unpack(current);
                (own > 0).then(|| pack(total - 1, own - 1))
            })
            .is_ok()
    }

    /// Drops one external reference.
    ///
    /// `generation`, when given, must match the current run. Decrements above
    /// the last reference are lock-free; the last one happens under the lock,
    /// installs the retirement signal and cancels the run.
    pub(crate) fn release_one(&self, generation: Option<u64>) -> Result<Decrement, ImportError> {
        loop {
            if generation.is_some_and(|g| g != self.generation()) {
                return Err(ImportError::StaleOperation(self.id()));
            }

            let current = self.counts.load(Ordering::Acquire);
            let (total, own) = unpack(current);
            let external = total.saturating_sub(own);
            if external == 0 {
                return Err(ImportError::NotAcquired(self.id()));
            }

            if external > 1 {
                if self
                    .counts
                    .compare_exchange(current, pack(total - 1, own), Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    return Ok(Decrement::Remaining);
                }
                continue;
            }

            let mut state = self.state.lock();
            if generation.is_some_and(|g| g != self.generation()) {
                return Err(ImportError::StaleOperation(self.id()));
            }
            if self
                .counts
                .compare_exchange(current, 0, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                continue;
            }

            let (notify, receiver) = watch::channel(false);
            state.retirement = Some(receiver);
            let run = state.run.clone();
            if let Some(run) = &run {
                run.cancel.cancel();
            }
            return Ok(Decrement::Retiring(Retirement {
                run,
                released: total,
                notify,
            }));
        }
    }

    /// Ends a teardown started by [`release_one`](Self::release_one) and wakes
    /// waiting acquirers.
    pub(crate) fn finish_retirement(&self, retirement: Retirement) {
        {
            let mut state = self.state.lock();
            state.run = None;
            state.object = None;
            state.references.clear();
            state.retirement = None;
        }
        let _ = retirement.notify.send(true);
    }

    /// Publishes run `generation` unless it was canceled or replaced meanwhile.
    pub(crate) fn commit_success(
        &self,
        generation: u64,
        cancel: &CancellationToken,
        object: ResourceObject,
        references: Vec<Arc<ResourceContainer>>,
    ) -> Commit {
        let mut state = self.state.lock();
        if cancel.is_cancelled() || self.generation() != generation {
            return Commit::Rejected;
        }
        match self.status() {
            ImportingStatus::Importing => {}
            ImportingStatus::Success => return Commit::AlreadyPublished,
            _ => return Commit::Rejected,
        }
        state.object = Some(object);
        state.references = references;
        self.set_status(ImportingStatus::Success);
        Commit::Published
    }

    /// The object of run `generation`, if that run was published.
    pub(crate) fn published_object(&self, generation: u64) -> Option<ResourceObject> {
        let state = self.state.lock();
        if self.generation() != generation || self.status() != ImportingStatus::Success {
            return None;
        }
        state.object.clone()
    }

    pub(crate) fn mark_canceled(&self) {
        let _state = self.state.lock();
        self.set_status(ImportingStatus::Canceled);
    }

    pub(crate) fn mark_failed(&self, error: ImportError) {
        let mut state = self.state.lock();
        state.failure = Some(error);
        self.set_status(ImportingStatus::Failed);
    }

    /// Marks a successful run disposed and hands out what it owned.
    pub(crate) fn take_success(&self) -> (Option<ResourceObject>, Vec<Arc<ResourceContainer>>) {
        let mut state = self.state.lock();
        self.set_status(ImportingStatus::Disposed);
        (state.object.take(), std::mem::take(&mut state.references))
    }

    /// The live object, if the current run succeeded.
    pub(crate) fn object(&self) -> Option<ResourceObject> {
        self.state.lock().object.clone()
    }

    /// The current run, if any.
    pub(crate) fn current_run(&self) -> Option<PipelineRun> {
        self.state.lock().run.clone()
    }

    /// Cancels the current run, if any.
    pub(crate) fn cancel_run(&self) -> bool {
        match &self.state.lock().run {
            Some(run) if !run.cancel.is_cancelled() => {
                run.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Clears the container for shutdown. Returns the live object, if any,
    /// and the reference count that was dropped.
    pub(crate) fn shut_down(&self) -> (Option<ResourceObject>, u32) {
        let mut state = self.state.lock();
        let (total, _) = unpack(self.counts.swap(0, Ordering::AcqRel));
        let object = state.object.take();
        if object.is_some() {
            self.set_status(ImportingStatus::Disposed);
        }
        state.run = None;
        state.references.clear();
        (object, total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use kiln_core::LibraryId;

    fn container() -> Arc<ResourceContainer> {
        Arc::new(ResourceContainer::new(ResourceAddress::new(
            LibraryId::from_name("lib"),
            ResourceId::from_name("res"),
        )))
    }

    fn idle_run(id: ResourceId) -> impl FnOnce(u64, CancellationToken) -> PipelineRun {
        move |generation, cancel| PipelineRun {
            generation,
            cancel,
            import: async move { Err(ImportError::Canceled(id)) }.boxed().shared(),
            resolve: async move { Err(ImportError::Canceled(id)) }.boxed().shared(),
            finalize: async move { Err(ImportError::Canceled(id)) }.boxed().shared(),
        }
    }

    #[test]
    fn begin_then_join() {
        let container = container();
        let run = container.begin(idle_run(container.id()));
        assert_eq!(run.generation, 1);
        assert_eq!(container.reference_count(), 1);

        assert!(matches!(
            container.admit(idle_run(container.id())),
            Admission::Joined(joined) if joined.generation == 1
        ));
        assert_eq!(container.reference_count(), 2);
    }

    #[test]
    fn last_release_retires_and_cancels() {
        let container = container();
        let run = container.begin(idle_run(container.id()));
        container.admit(idle_run(container.id()));

        assert!(matches!(container.release_one(None), Ok(Decrement::Remaining)));
        let Ok(Decrement::Retiring(retirement)) = container.release_one(None) else {
            panic!("expected the last release to retire the container");
        };
        assert!(run.cancel.is_cancelled());
        assert_eq!(retirement.released, 1);

        // Acquirers wait while the teardown runs.
        assert!(matches!(
            container.admit(idle_run(container.id())),
            Admission::Retiring(_)
        ));
        assert!(matches!(
            container.release_one(None),
            Err(ImportError::NotAcquired(_))
        ));

        container.mark_canceled();
        container.finish_retirement(retirement);

        // A canceled slot restarts in place with a new generation.
        assert!(matches!(
            container.admit(idle_run(container.id())),
            Admission::Started(restarted) if restarted.generation == 2
        ));
        assert_eq!(container.reference_count(), 1);
        assert_eq!(container.status(), ImportingStatus::Importing);
    }

    #[test]
    fn stale_generation_is_rejected() {
        let container = container();
        container.begin(idle_run(container.id()));
        container.admit(idle_run(container.id()));

        assert!(matches!(
            container.release_one(Some(7)),
            Err(ImportError::StaleOperation(_))
        ));
        assert_eq!(container.reference_count(), 2);
    }

    #[test]
    fn self_references_do_not_keep_the_resource_alive() {
        let container = container();
        container.begin(idle_run(container.id()));

        assert!(container.acquire_self());
        assert_eq!(container.reference_count(), 2);

        // The only external reference goes away; self references go with it.
        let Ok(Decrement::Retiring(retirement)) = container.release_one(None) else {
            panic!("expected retirement");
        };
        assert_eq!(retirement.released, 2);
        assert_eq!(container.reference_count(), 0);
        assert!(!container.acquire_self());
        assert!(!container.drop_self_reference());
    }

    #[test]
    fn commit_is_tied_to_one_run() {
        let container = container();
        let run = container.begin(idle_run(container.id()));
        let object: ResourceObject = Arc::new(5u32);

        assert_eq!(
            container.commit_success(run.generation + 1, &run.cancel, object.clone(), Vec::new()),
            Commit::Rejected
        );
        assert!(container.published_object(run.generation).is_none());

        assert_eq!(
            container.commit_success(run.generation, &run.cancel, object.clone(), Vec::new()),
            Commit::Published
        );
        assert_eq!(
            container.commit_success(run.generation, &run.cancel, object, Vec::new()),
            Commit::AlreadyPublished
        );
        assert_eq!(container.status(), ImportingStatus::Success);
        assert!(container.published_object(run.generation).is_some());

        // Canceling afterwards does not unpublish the run.
        run.cancel.cancel();
        assert!(container.published_object(run.generation).is_some());
    }

    #[test]
    fn quarantined_failure_is_reported() {
        let container = container();
        container.begin(idle_run(container.id()));
        container.mark_failed(ImportError::DeserializerNotFound("mesh".to_string()));

        assert!(matches!(
            container.admit(idle_run(container.id())),
            Admission::Quarantined(ImportError::DeserializerNotFound(name)) if name == "mesh"
        ));
    }
}
