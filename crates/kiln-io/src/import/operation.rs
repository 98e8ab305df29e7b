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

use super::container::{PhaseFuture, ResourceContainer};
use futures::future::{BoxFuture, Shared};
use kiln_core::import::{ImportError, ImportingStatus};
use kiln_core::{ResourceAddress, ResourceHandle, ResourceId};
use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;

/// One reference on an importing resource.
///
/// Awaiting the operation (or [`wait`](Self::wait)) yields the handle once
/// the resource and everything it references are linked. Any number of
/// operations may point at the same resource; each stands for one unit of
/// its reference count.
///
/// Dropping an operation releases nothing. Hand it to
/// [`ImportEnvironment::release`](super::ImportEnvironment::release).
pub struct ImportingOperation {
    container: Arc<ResourceContainer>,
    generation: u64,
    finalize: PhaseFuture<ResourceHandle>,
}

impl ImportingOperation {
    pub(crate) fn new(
        container: Arc<ResourceContainer>,
        generation: u64,
        finalize: PhaseFuture<ResourceHandle>,
    ) -> Self {
        Self {
            container,
            generation,
            finalize,
        }
    }

    pub(crate) fn container(&self) -> &Arc<ResourceContainer> {
        &self.container
    }

    /// The resource being imported.
    pub fn id(&self) -> ResourceId {
        self.container.id()
    }

    /// Where the resource is stored.
    pub fn address(&self) -> ResourceAddress {
        self.container.address()
    }

    /// The pipeline run this operation belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current status of the resource's container.
    pub fn status(&self) -> ImportingStatus {
        self.container.status()
    }

    /// Waits for the import to finish.
    pub async fn wait(&self) -> Result<ResourceHandle, ImportError> {
        self.finalize.clone().await
    }
}

impl fmt::Debug for ImportingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportingOperation")
            .field("address", &self.address())
            .field("generation", &self.generation)
            .field("status", &self.status())
            .finish()
    }
}

impl IntoFuture for ImportingOperation {
    type Output = Result<ResourceHandle, ImportError>;
    type IntoFuture = Shared<BoxFuture<'static, Result<ResourceHandle, ImportError>>>;

    fn into_future(self) -> Self::IntoFuture {
        self.finalize
    }
}

impl IntoFuture for &ImportingOperation {
    type Output = Result<ResourceHandle, ImportError>;
    type IntoFuture = Shared<BoxFuture<'static, Result<ResourceHandle, ImportError>>>;

    fn into_future(self) -> Self::IntoFuture {
        self.finalize.clone()
    }
}
