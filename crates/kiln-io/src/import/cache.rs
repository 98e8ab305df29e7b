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

use super::container::ResourceContainer;
use kiln_core::resource::ObjectKey;
use kiln_core::{ResourceId, ResourceObject};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::Arc;

/// The two maps guarded by the cache lock.
#[derive(Default)]
pub(crate) struct CacheMaps {
    containers: HashMap<ResourceId, Arc<ResourceContainer>>,
    objects: HashMap<ObjectKey, ResourceId>,
}

impl CacheMaps {
    pub(crate) fn register_object_map(&mut self, object: &ResourceObject, id: ResourceId) {
        self.objects.insert(ObjectKey::of(object), id);
    }

    pub(crate) fn remove_object_map(&mut self, object: &ResourceObject) {
        self.objects.remove(&ObjectKey::of(object));
    }

    /// Removes the entry for `id` only if it still maps to `container`.
    pub(crate) fn remove_if_same(&mut self, id: ResourceId, container: &Arc<ResourceContainer>) -> bool {
        let same = self
            .containers
            .get(&id)
            .is_some_and(|cached| Arc::ptr_eq(cached, container));
        if same {
            self.containers.remove(&id);
        }
        same
    }
}

/// Containers by resource id, plus a reverse map from live objects.
///
/// Lock order is cache, then container. Nothing awaits while holding either.
#[derive(Default)]
pub(crate) struct ResourceCache {
    inner: Mutex<CacheMaps>,
}

impl ResourceCache {
    pub(crate) fn get(&self, id: ResourceId) -> Option<Arc<ResourceContainer>> {
        self.inner.lock().containers.get(&id).cloned()
    }

    /// Runs `on_existing` on the cached container for `id`, or inserts the one
    /// built by `begin`. Both run under the cache lock.
    pub(crate) fn get_or_begin_importing<R>(
        &self,
        id: ResourceId,
        on_existing: impl FnOnce(&Arc<ResourceContainer>) -> R,
        begin: impl FnOnce() -> (Arc<ResourceContainer>, R),
    ) -> (Arc<ResourceContainer>, R) {
        let mut maps = self.inner.lock();
        if let Some(existing) = maps.containers.get(&id) {
            let existing = Arc::clone(existing);
            let result = on_existing(&existing);
            return (existing, result);
        }
        let (container, result) = begin();
        maps.containers.insert(id, Arc::clone(&container));
        (container, result)
    }

    /// Locks both maps, for updates that must be atomic with a container
    /// state change.
    pub(crate) fn lock(&self) -> MutexGuard<'_, CacheMaps> {
        self.inner.lock()
    }

    pub(crate) fn lookup_object(&self, object: &ResourceObject) -> Option<Arc<ResourceContainer>> {
        let maps = self.inner.lock();
        let id = maps.objects.get(&ObjectKey::of(object))?;
        maps.containers.get(id).cloned()
    }

    /// Every cached container, without removing anything.
    pub(crate) fn snapshot(&self) -> Vec<Arc<ResourceContainer>> {
        self.inner.lock().containers.values().cloned().collect()
    }

    /// Empties the cache, returning every container.
    pub(crate) fn drain(&self) -> Vec<Arc<ResourceContainer>> {
        let mut maps = self.inner.lock();
        maps.objects.clear();
        maps.containers.drain().map(|(_, container)| container).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().containers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::{LibraryId, ResourceAddress};

    fn container(name: &str) -> Arc<ResourceContainer> {
        Arc::new(ResourceContainer::new(ResourceAddress::new(
            LibraryId::from_name("lib"),
            ResourceId::from_name(name),
        )))
    }

    #[test]
    fn begins_once_then_finds_existing() {
        let cache = ResourceCache::default();
        let first = container("a");
        let id = first.id();

        let (inserted, began) = cache.get_or_begin_importing(
            id,
            |_| false,
            || (Arc::clone(&first), true),
        );
        assert!(began);
        assert!(Arc::ptr_eq(&inserted, &first));

        let (found, began) = cache.get_or_begin_importing(id, |_| false, || (container("a"), true));
        assert!(!began);
        assert!(Arc::ptr_eq(&found, &first));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn remove_if_same_ignores_other_containers() {
        let cache = ResourceCache::default();
        let cached = container("a");
        cache.get_or_begin_importing(cached.id(), |_| (), || (Arc::clone(&cached), ()));

        let impostor = container("a");
        assert!(!cache.lock().remove_if_same(impostor.id(), &impostor));
        assert!(cache.get(cached.id()).is_some());

        assert!(cache.lock().remove_if_same(cached.id(), &cached));
        assert!(cache.get(cached.id()).is_none());
    }

    #[test]
    fn object_map_resolves_live_containers_only() {
        let cache = ResourceCache::default();
        let cached = container("a");
        cache.get_or_begin_importing(cached.id(), |_| (), || (Arc::clone(&cached), ()));

        let object: ResourceObject = Arc::new(5u32);
        cache.lock().register_object_map(&object, cached.id());
        assert!(cache
            .lookup_object(&object)
            .is_some_and(|found| Arc::ptr_eq(&found, &cached)));

        // Equal value, different allocation.
        let other: ResourceObject = Arc::new(5u32);
        assert!(cache.lookup_object(&other).is_none());

        cache.lock().remove_object_map(&object);
        assert!(cache.lookup_object(&object).is_none());
        assert_eq!(cache.drain().len(), 1);
        assert_eq!(cache.len(), 0);
    }
}
