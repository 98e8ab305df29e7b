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

//! The contract between the import runtime and resource storage.

use crate::import::ResourceStream;
use crate::resource::{LibraryId, ResourceId};
use std::io;

/// A source of compiled resources.
///
/// A library owns a set of resource ids and hands out a fresh readable,
/// seekable stream for each one on demand. Implementations must be cheap to
/// query: [`contains`](Self::contains) and
/// [`resolve_name`](Self::resolve_name) are called while routing every
/// import request.
///
/// [`open`](Self::open) may block; the runtime calls it from a blocking
/// worker thread.
pub trait LibraryProvider: Send + Sync + 'static {
    /// The unique id of this library.
    fn library_id(&self) -> LibraryId;

    /// Returns `true` if this library stores `id`.
    fn contains(&self, id: ResourceId) -> bool;

    /// Maps a human-readable name to the id it was compiled under.
    fn resolve_name(&self, name: &str) -> Option<ResourceId>;

    /// Opens a stream on the compiled bytes of `id`.
    ///
    /// `Ok(None)` means the library could not produce a stream even though it
    /// claims the resource; the runtime treats that as a broken contract.
    fn open(&self, id: ResourceId) -> io::Result<Option<Box<dyn ResourceStream>>>;
}
