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

use kiln_core::import::ResourceStream;
use kiln_core::library::LibraryProvider;
use kiln_core::{LibraryId, ResourceId};
use std::{collections::HashMap, io, io::Cursor, sync::Arc};

/// A library holding compiled resources in memory.
///
/// Useful for tests, tools and resources generated at runtime.
#[derive(Debug, Clone)]
pub struct MemoryLibrary {
    id: LibraryId,
    resources: HashMap<ResourceId, Arc<[u8]>>,
    names: HashMap<String, ResourceId>,
}

impl MemoryLibrary {
    /// Creates an empty library.
    pub fn new(id: LibraryId) -> Self {
        Self {
            id,
            resources: HashMap::new(),
            names: HashMap::new(),
        }
    }

    /// Stores compiled bytes under an explicit id and name.
    pub fn insert(&mut self, id: ResourceId, name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) {
        self.names.insert(name.into(), id);
        self.resources.insert(id, bytes.into());
    }

    /// Stores compiled bytes under the id derived from `name` and returns it.
    pub fn insert_named(&mut self, name: &str, bytes: impl Into<Arc<[u8]>>) -> ResourceId {
        let id = ResourceId::from_name(name);
        self.insert(id, name, bytes);
        id
    }

    /// Removes a resource; its name is forgotten too.
    pub fn remove(&mut self, id: ResourceId) -> bool {
        self.names.retain(|_, named| *named != id);
        self.resources.remove(&id).is_some()
    }

    /// Number of stored resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns `true` if the library is empty.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl LibraryProvider for MemoryLibrary {
    fn library_id(&self) -> LibraryId {
        self.id
    }

    fn contains(&self, id: ResourceId) -> bool {
        self.resources.contains_key(&id)
    }

    fn resolve_name(&self, name: &str) -> Option<ResourceId> {
        self.names.get(name).copied()
    }

    fn open(&self, id: ResourceId) -> io::Result<Option<Box<dyn ResourceStream>>> {
        Ok(self
            .resources
            .get(&id)
            .map(|bytes| Box::new(Cursor::new(bytes.clone())) as Box<dyn ResourceStream>))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn open_returns_fresh_streams() {
        let mut library = MemoryLibrary::new(LibraryId::from_name("mem"));
        let id = library.insert_named("blob", vec![1u8, 2, 3]);

        for _ in 0..2 {
            let mut stream = library.open(id).unwrap().expect("stream");
            assert!(stream.capabilities().check().is_ok());
            let mut bytes = Vec::new();
            stream.read_to_end(&mut bytes).unwrap();
            assert_eq!(bytes, vec![1, 2, 3]);
        }
        assert!(library.open(ResourceId::from_name("other")).unwrap().is_none());
    }

    #[test]
    fn remove_forgets_name() {
        let mut library = MemoryLibrary::new(LibraryId::from_name("mem"));
        let id = library.insert_named("blob", vec![0u8]);

        assert_eq!(library.resolve_name("blob"), Some(id));
        assert!(library.remove(id));
        assert!(!library.contains(id));
        assert_eq!(library.resolve_name("blob"), None);
        assert!(library.is_empty());
    }
}
