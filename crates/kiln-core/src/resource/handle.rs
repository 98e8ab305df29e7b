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

use super::id::ResourceId;
use std::{any::Any, fmt, sync::Arc};

/// A live, type-erased runtime object produced by a deserializer.
///
/// Cloning only bumps the `Arc` count. The import subsystem tracks resource
/// lifetime with its own reference count, so dropping clones of this value
/// never disposes anything.
pub type ResourceObject = Arc<dyn Any + Send + Sync>;

/// Pointer identity of a [`ResourceObject`], used as the key of the
/// object-to-resource reverse index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectKey(usize);

impl ObjectKey {
    /// Computes the identity key of an object.
    pub fn of(object: &ResourceObject) -> Self {
        Self(Arc::as_ptr(object) as *const () as usize)
    }
}

/// The result of a completed import: the resource id and its live object.
#[derive(Clone)]
pub struct ResourceHandle {
    id: ResourceId,
    object: ResourceObject,
}

impl ResourceHandle {
    /// Wraps an object produced for `id`.
    pub fn new(id: ResourceId, object: ResourceObject) -> Self {
        Self { id, object }
    }

    /// The resource this handle points at.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// The shared, type-erased object.
    pub fn object(&self) -> &ResourceObject {
        &self.object
    }

    /// Returns the object as a concrete type, if it is one.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.object.clone().downcast::<T>().ok()
    }

    /// Returns `true` when `object` is the very same allocation as this handle's.
    pub fn is_object(&self, object: &ResourceObject) -> bool {
        Arc::ptr_eq(&self.object, object)
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("id", &self.id)
            .field("object", &ObjectKey::of(&self.object))
            .finish()
    }
}
