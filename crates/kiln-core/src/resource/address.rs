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

use super::id::{LibraryId, ResourceId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A fully qualified location of a compiled resource.
///
/// Two libraries built in isolation may contain the same [`ResourceId`]; the
/// library id disambiguates them. The runtime cache itself is keyed by the
/// resource id alone, the library only decides where the bytes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceAddress {
    /// The library that holds the compiled bytes.
    pub library: LibraryId,
    /// The resource inside that library.
    pub resource: ResourceId,
}

impl ResourceAddress {
    /// Creates an address from its two components.
    pub const fn new(library: LibraryId, resource: ResourceId) -> Self {
        Self { library, resource }
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.library, self.resource)
    }
}
