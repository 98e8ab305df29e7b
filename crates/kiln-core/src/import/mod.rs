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

//! Contracts between the import runtime and the code that plugs into it.
//!
//! - [`Deserializer`]: turns the `DATA` chunk of a compiled resource into a
//!   live object and records the references it needs.
//! - [`Disposer`]: releases a live object once nobody references it anymore.
//! - [`ResourceStream`]: the byte source a library hands to the runtime.
//! - [`DeserializationContext`]: the per-resource scratchpad shared by the two
//!   halves of deserialization (requesting references, then resolving them).

mod context;
mod deserializer;
mod disposer;
mod error;
mod status;
mod stream;

pub use context::*;
pub use deserializer::*;
pub use disposer::*;
pub use error::*;
pub use status::*;
pub use stream::*;
