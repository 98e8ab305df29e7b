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

//! Name-keyed deserializers and the ordered disposer chain.

use kiln_core::import::{Deserializer, Disposer};
use kiln_core::ResourceObject;
use std::{collections::HashMap, sync::Arc};

/// Deserializers by the name compiled resources refer to them with.
#[derive(Default, Clone)]
pub struct DeserializerRegistry {
    deserializers: HashMap<String, Arc<dyn Deserializer>>,
}

impl DeserializerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `deserializer` under `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, deserializer: Arc<dyn Deserializer>) {
        let name = name.into();
        if self.deserializers.insert(name.clone(), deserializer).is_some() {
            log::warn!("[DeserializerRegistry] Replaced deserializer '{name}'");
        }
    }

    /// Looks up a deserializer.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Deserializer>> {
        self.deserializers.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.deserializers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Disposers, tried in registration order until one accepts the object.
#[derive(Default, Clone)]
pub struct DisposerChain {
    disposers: Vec<Arc<dyn Disposer>>,
}

impl DisposerChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a disposer.
    pub fn push(&mut self, disposer: Arc<dyn Disposer>) {
        self.disposers.push(disposer);
    }

    /// Offers `object` to each disposer. Returns `true` once one accepts it.
    pub fn dispose(&self, object: &ResourceObject) -> bool {
        self.disposers.iter().any(|d| d.try_dispose(object))
    }

    /// Number of disposers.
    pub fn len(&self) -> usize {
        self.disposers.len()
    }

    /// Returns `true` if the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.disposers.is_empty()
    }
}
