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

//! Resource libraries and the registry routing requests to them.

mod memory;
mod pack;

pub use memory::MemoryLibrary;
pub use pack::{PackBuilder, PackEntry, PackLibrary};

use kiln_core::import::{ImportError, ResourceStream};
use kiln_core::library::LibraryProvider;
use kiln_core::{LibraryId, ResourceAddress, ResourceId};
use std::sync::Arc;

/// The ordered set of libraries an environment imports from.
///
/// Order matters for [`locate`](Self::locate): when several libraries
/// contain the same resource id, the first registered one wins.
#[derive(Default, Clone)]
pub struct LibraryRegistry {
    libraries: Vec<Arc<dyn LibraryProvider>>,
}

impl LibraryRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a library. A library with the same id is replaced in place.
    pub fn register(&mut self, library: Arc<dyn LibraryProvider>) {
        let id = library.library_id();
        match self.libraries.iter_mut().find(|l| l.library_id() == id) {
            Some(existing) => {
                log::warn!("[LibraryRegistry] Replacing library {id}");
                *existing = library;
            }
            None => {
                log::debug!("[LibraryRegistry] Registered library {id}");
                self.libraries.push(library);
            }
        }
    }

    /// Returns the library with this id.
    pub fn get(&self, library: LibraryId) -> Option<&Arc<dyn LibraryProvider>> {
        self.libraries.iter().find(|l| l.library_id() == library)
    }

    /// Finds the first library containing `id`.
    pub fn locate(&self, id: ResourceId) -> Option<ResourceAddress> {
        self.libraries
            .iter()
            .find(|l| l.contains(id))
            .map(|l| ResourceAddress::new(l.library_id(), id))
    }

    /// Checks that `address` names a registered library that has the resource.
    pub fn validate(&self, address: ResourceAddress) -> Result<(), ImportError> {
        let library = self
            .get(address.library)
            .ok_or(ImportError::LibraryNotFound(address.library))?;
        if !library.contains(address.resource) {
            return Err(ImportError::ResourceNotFound(address.resource));
        }
        Ok(())
    }

    /// Resolves a `(library, name)` pair to an address.
    pub fn resolve_name(&self, library: LibraryId, name: &str) -> Result<ResourceAddress, ImportError> {
        let provider = self
            .get(library)
            .ok_or(ImportError::LibraryNotFound(library))?;
        provider
            .resolve_name(name)
            .map(|id| ResourceAddress::new(library, id))
            .ok_or_else(|| ImportError::NameNotFound {
                library,
                name: name.to_string(),
            })
    }

    /// Opens the compiled bytes of `address`.
    ///
    /// May block; call it from a blocking context.
    pub fn open(
        &self,
        address: ResourceAddress,
    ) -> Result<Option<Box<dyn ResourceStream>>, ImportError> {
        let library = self
            .get(address.library)
            .ok_or(ImportError::LibraryNotFound(address.library))?;
        library
            .open(address.resource)
            .map_err(|e| ImportError::io(address, e))
    }

    /// Number of registered libraries.
    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    /// Returns `true` when no library is registered.
    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }
}
