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

use crate::resource::ResourceObject;
use std::{any::Any, marker::PhantomData};

/// Releases the storage behind a resource object.
///
/// Disposers form a chain: each one is offered the object in registration
/// order until one accepts it. An object nobody accepts is reported as
/// not disposed; that is a leak worth logging, not an error.
pub trait Disposer: Send + Sync + 'static {
    /// Attempts to dispose `object`. Returns `true` if this disposer took care
    /// of it.
    fn try_dispose(&self, object: &ResourceObject) -> bool;
}

/// A [`Disposer`] for one concrete object type, backed by a closure.
///
/// # Examples
///
/// ```
/// use kiln_core::import::{Disposer, TypedDisposer};
/// use kiln_core::ResourceObject;
/// use std::sync::{atomic::{AtomicBool, Ordering}, Arc};
///
/// struct Mesh { freed: AtomicBool }
///
/// let disposer = TypedDisposer::new(|mesh: &Mesh| mesh.freed.store(true, Ordering::SeqCst));
/// let mesh = Arc::new(Mesh { freed: AtomicBool::new(false) });
/// let object: ResourceObject = mesh.clone();
///
/// assert!(disposer.try_dispose(&object));
/// assert!(mesh.freed.load(Ordering::SeqCst));
/// assert!(!disposer.try_dispose(&(Arc::new(7u8) as ResourceObject)));
/// ```
pub struct TypedDisposer<T, F> {
    dispose: F,
    _marker: PhantomData<fn(&T)>,
}

impl<T, F> TypedDisposer<T, F>
where
    T: Any + Send + Sync,
    F: Fn(&T) + Send + Sync + 'static,
{
    /// Wraps a closure that disposes objects of type `T`.
    pub fn new(dispose: F) -> Self {
        Self {
            dispose,
            _marker: PhantomData,
        }
    }
}

impl<T, F> Disposer for TypedDisposer<T, F>
where
    T: Any + Send + Sync,
    F: Fn(&T) + Send + Sync + 'static,
{
    fn try_dispose(&self, object: &ResourceObject) -> bool {
        match object.downcast_ref::<T>() {
            Some(typed) => {
                (self.dispose)(typed);
                true
            }
            None => false,
        }
    }
}
