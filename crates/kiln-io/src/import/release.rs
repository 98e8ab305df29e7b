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

//! Dropping references and tearing down retired runs.

use super::container::{Decrement, ResourceContainer, Retirement};
use super::dispatcher::ImportDispatcher;
use super::operation::ImportingOperation;
use futures::future::{BoxFuture, FutureExt};
use kiln_core::import::{ImportError, ReleaseStatus};
use kiln_core::{ResourceHandle, ResourceId, ResourceObject};
use std::sync::Arc;

/// What a caller hands back to [`ImportEnvironment::release`].
///
/// Every form names the same reference-count unit; the operation form also
/// checks that it belongs to the current run.
///
/// [`ImportEnvironment::release`]: super::ImportEnvironment::release
#[derive(Debug, Clone, Copy)]
pub enum ReleaseTarget<'a> {
    /// The operation returned by an import.
    Operation(&'a ImportingOperation),
    /// A handle obtained from a completed import.
    Handle(&'a ResourceHandle),
    /// The live object itself.
    Object(&'a ResourceObject),
    /// The resource id.
    Id(ResourceId),
}

impl<'a> From<&'a ImportingOperation> for ReleaseTarget<'a> {
    fn from(operation: &'a ImportingOperation) -> Self {
        ReleaseTarget::Operation(operation)
    }
}

impl<'a> From<&'a ResourceHandle> for ReleaseTarget<'a> {
    fn from(handle: &'a ResourceHandle) -> Self {
        ReleaseTarget::Handle(handle)
    }
}

impl<'a> From<&'a ResourceObject> for ReleaseTarget<'a> {
    fn from(object: &'a ResourceObject) -> Self {
        ReleaseTarget::Object(object)
    }
}

impl From<ResourceId> for ReleaseTarget<'_> {
    fn from(id: ResourceId) -> Self {
        ReleaseTarget::Id(id)
    }
}

impl ImportDispatcher {
    pub(crate) async fn release(
        self: &Arc<Self>,
        target: ReleaseTarget<'_>,
    ) -> Result<ReleaseStatus, ImportError> {
        let (container, generation) = self.container_for(target)?;
        release_container(Arc::clone(self), container, generation).await
    }

    fn container_for(
        &self,
        target: ReleaseTarget<'_>,
    ) -> Result<(Arc<ResourceContainer>, Option<u64>), ImportError> {
        match target {
            ReleaseTarget::Operation(operation) => {
                Ok((Arc::clone(operation.container()), Some(operation.generation())))
            }
            ReleaseTarget::Handle(handle) => {
                let container = self
                    .cache
                    .get(handle.id())
                    .ok_or(ImportError::NotAcquired(handle.id()))?;
                let owned = container
                    .object()
                    .is_some_and(|object| handle.is_object(&object));
                if !owned {
                    return Err(ImportError::IdentityMismatch(handle.id()));
                }
                Ok((container, None))
            }
            ReleaseTarget::Object(object) => self
                .cache
                .lookup_object(object)
                .map(|container| (container, None))
                .ok_or(ImportError::IdentityMismatch(ResourceId::NULL)),
            ReleaseTarget::Id(id) => self
                .cache
                .get(id)
                .map(|container| (container, None))
                .ok_or(ImportError::NotAcquired(id)),
        }
    }
}

/// Drops one reference on `container` and, at the zero crossing, runs the
/// teardown to completion.
///
/// The teardown runs on a tracked task, so abandoning the returned future
/// never leaves acquirers waiting on a retirement that nobody finishes.
pub(crate) fn release_container(
    this: Arc<ImportDispatcher>,
    container: Arc<ResourceContainer>,
    generation: Option<u64>,
) -> BoxFuture<'static, Result<ReleaseStatus, ImportError>> {
    async move {
        let retirement = match container.release_one(generation)? {
            Decrement::Remaining => {
                this.statistics.references_released(1);
                return Ok(ReleaseStatus::Released);
            }
            Decrement::Retiring(retirement) => retirement,
        };
        this.statistics
            .references_released(u64::from(retirement.released));

        let id = container.id();
        let teardown = retire(Arc::clone(&this), container, retirement);
        this.tracker
            .spawn_on(teardown, &this.runtime)
            .await
            .map_err(|e| ImportError::Internal {
                resource: id,
                message: e.to_string(),
            })
    }
    .boxed()
}

fn retire(
    this: Arc<ImportDispatcher>,
    container: Arc<ResourceContainer>,
    retirement: Retirement,
) -> BoxFuture<'static, ReleaseStatus> {
    async move {
        let status = match retirement.run.as_ref() {
            None => ReleaseStatus::Released,
            Some(run) => match run.finalize.clone().await {
                Ok(handle) => dispose(&this, &container, handle).await,
                Err(e) if e.is_canceled() => ReleaseStatus::Canceled,
                Err(_) => ReleaseStatus::Released,
            },
        };
        container.finish_retirement(retirement);
        status
    }
    .boxed()
}

async fn dispose(
    this: &Arc<ImportDispatcher>,
    container: &Arc<ResourceContainer>,
    handle: ResourceHandle,
) -> ReleaseStatus {
    let address = container.address();
    let (object, references) = container.take_success();

    for reference in references {
        // Self references went away with the zero crossing.
        if Arc::ptr_eq(&reference, container) {
            continue;
        }
        let target = reference.address();
        if let Err(e) = release_container(Arc::clone(this), reference, None).await {
            log::debug!("[ImportDispatcher] Releasing {target} held by {address} failed: {e}");
        }
    }

    let object = object.unwrap_or_else(|| handle.object().clone());
    let disposed = this.disposers.dispose(&object);
    {
        let mut maps = this.cache.lock();
        maps.remove_if_same(container.id(), container);
        maps.remove_object_map(&object);
    }
    this.statistics.run_retired(disposed);

    if disposed {
        log::debug!("[ImportDispatcher] Disposed {address}");
        ReleaseStatus::Disposed
    } else {
        log::warn!("[ImportDispatcher] No disposer accepted {address}; the object leaks");
        ReleaseStatus::NotDisposed
    }
}
