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

//! Resource addressing and the runtime handle type.
//!
//! A compiled resource is identified by a [`ResourceId`]. Because libraries are
//! built independently, the same id may legitimately appear in more than one of
//! them, so callers address a resource through a [`ResourceAddress`] that also
//! names the [`LibraryId`]. Once imported, a resource is exposed to callers as a
//! [`ResourceHandle`]: the id plus the shared, type-erased [`ResourceObject`].

mod address;
mod handle;
mod id;

pub use address::*;
pub use handle::*;
pub use id::*;
