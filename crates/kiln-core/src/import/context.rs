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

use crate::resource::{ResourceHandle, ResourceId};
use std::{collections::HashMap, fmt, sync::Arc};

/// Names the slot of a deserialized object that asked for a reference.
///
/// An object may hold several references (a material with a dozen textures),
/// so each one is keyed by the property name plus an optional element index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReferencePropertyKey {
    name: Arc<str>,
    index: Option<u32>,
}

impl ReferencePropertyKey {
    /// A scalar property, e.g. `"albedo"`.
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            index: None,
        }
    }

    /// One element of a collection property, e.g. `"textures"[2]`.
    pub fn indexed(name: impl Into<Arc<str>>, index: u32) -> Self {
        Self {
            name: name.into(),
            index: Some(index),
        }
    }

    /// The property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The element index, for collection properties.
    pub fn index(&self) -> Option<u32> {
        self.index
    }
}

impl fmt::Display for ReferencePropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}[{}]", self.name, index),
            None => f.write_str(&self.name),
        }
    }
}

/// Misuse of a [`DeserializationContext`] outside the phase it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// A reference was requested after deserialization returned.
    #[error("reference requests for {resource} are sealed (requested '{key}')")]
    RequestsSealed {
        /// The resource being built.
        resource: ResourceId,
        /// The property that asked too late.
        key: ReferencePropertyKey,
    },
    /// Resolved references were read before they were bound.
    #[error("references of {0} are not resolved yet")]
    NotResolved(ResourceId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextPhase {
    Requesting,
    Sealed,
    Resolved,
}

/// Scratchpad carried through the two halves of deserialization.
///
/// During [`Deserializer::deserialize`](super::Deserializer::deserialize) the
/// deserializer calls [`request_reference`](Self::request_reference) for every
/// property that points at another resource. The runtime then seals the
/// requests, imports the targets, and hands the context back to
/// [`Deserializer::resolve_references`](super::Deserializer::resolve_references)
/// with every satisfiable request bound to a [`ResourceHandle`].
#[derive(Debug, Clone)]
pub struct DeserializationContext {
    resource: ResourceId,
    phase: ContextPhase,
    requests: Vec<(ReferencePropertyKey, ResourceId)>,
    resolved: HashMap<ReferencePropertyKey, ResourceHandle>,
}

impl DeserializationContext {
    /// Creates an empty context for the resource being built.
    pub fn new(resource: ResourceId) -> Self {
        Self {
            resource,
            phase: ContextPhase::Requesting,
            requests: Vec::new(),
            resolved: HashMap::new(),
        }
    }

    /// The resource this context belongs to.
    pub fn resource(&self) -> ResourceId {
        self.resource
    }

    /// Records that `key` must be bound to `target` once it is available.
    ///
    /// Requesting the same key twice keeps the last target. Requesting
    /// [`ResourceId::NULL`] is allowed and simply leaves the slot empty.
    pub fn request_reference(
        &mut self,
        key: ReferencePropertyKey,
        target: ResourceId,
    ) -> Result<(), ContextError> {
        if self.phase != ContextPhase::Requesting {
            return Err(ContextError::RequestsSealed {
                resource: self.resource,
                key,
            });
        }
        match self.requests.iter_mut().find(|(existing, _)| *existing == key) {
            Some(slot) => slot.1 = target,
            None => self.requests.push((key, target)),
        }
        Ok(())
    }

    /// The requested references, in request order.
    pub fn requests(&self) -> &[(ReferencePropertyKey, ResourceId)] {
        &self.requests
    }

    /// Returns `true` while requests are still accepted.
    pub fn accepts_requests(&self) -> bool {
        self.phase == ContextPhase::Requesting
    }

    /// Disables further reference requests.
    pub fn seal_requests(&mut self) {
        if self.phase == ContextPhase::Requesting {
            self.phase = ContextPhase::Sealed;
        }
    }

    /// Binds the resolved handles and opens the context for reads.
    pub fn bind_resolved(&mut self, resolved: HashMap<ReferencePropertyKey, ResourceHandle>) {
        self.seal_requests();
        self.resolved = resolved;
        self.phase = ContextPhase::Resolved;
    }

    /// Returns the handle bound to `key`, or `Ok(None)` if the request could
    /// not be satisfied (unknown target, failed import, null id).
    pub fn resolved(
        &self,
        key: &ReferencePropertyKey,
    ) -> Result<Option<&ResourceHandle>, ContextError> {
        if self.phase != ContextPhase::Resolved {
            return Err(ContextError::NotResolved(self.resource));
        }
        Ok(self.resolved.get(key))
    }

    /// Iterates over every bound reference.
    pub fn resolved_references(
        &self,
    ) -> Result<impl Iterator<Item = (&ReferencePropertyKey, &ResourceHandle)>, ContextError> {
        if self.phase != ContextPhase::Resolved {
            return Err(ContextError::NotResolved(self.resource));
        }
        Ok(self.resolved.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_are_write_once() {
        let owner = ResourceId::from_name("material");
        let mut context = DeserializationContext::new(owner);
        let albedo = ReferencePropertyKey::named("albedo");

        context
            .request_reference(albedo.clone(), ResourceId::from_name("a"))
            .unwrap();
        context
            .request_reference(albedo.clone(), ResourceId::from_name("b"))
            .unwrap();
        assert_eq!(context.requests().len(), 1);
        assert_eq!(context.requests()[0].1, ResourceId::from_name("b"));

        context.seal_requests();
        let err = context
            .request_reference(ReferencePropertyKey::indexed("layers", 0), owner)
            .unwrap_err();
        assert!(matches!(err, ContextError::RequestsSealed { .. }));
    }

    #[test]
    fn reads_only_after_binding() {
        let owner = ResourceId::from_name("material");
        let mut context = DeserializationContext::new(owner);
        let key = ReferencePropertyKey::named("normal");

        assert!(matches!(
            context.resolved(&key),
            Err(ContextError::NotResolved(id)) if id == owner
        ));

        let target = ResourceId::from_name("normal-map");
        let mut resolved = HashMap::new();
        resolved.insert(
            key.clone(),
            ResourceHandle::new(target, std::sync::Arc::new(())),
        );
        context.bind_resolved(resolved);

        let handle = context.resolved(&key).unwrap().expect("key was bound");
        assert_eq!(handle.id(), target);
        assert!(context
            .resolved(&ReferencePropertyKey::named("missing"))
            .unwrap()
            .is_none());
        assert!(!context.accepts_requests());
    }

    #[test]
    fn property_key_display() {
        assert_eq!(ReferencePropertyKey::named("albedo").to_string(), "albedo");
        assert_eq!(
            ReferencePropertyKey::indexed("textures", 3).to_string(),
            "textures[3]"
        );
    }
}
