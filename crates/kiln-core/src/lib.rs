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

//! # Kiln Core
//!
//! Foundational crate containing the value types, the compiled resource format
//! and the interface contracts shared by the runtime import subsystem.
//!
//! Nothing in here knows how resources are cached or scheduled; that lives in
//! `kiln-io`. This crate only defines the "common language": identifiers,
//! handles, statuses, the deserializer/disposer/library contracts and the
//! error taxonomy.

#![warn(missing_docs)]

pub mod format;
pub mod import;
pub mod library;
pub mod resource;
pub mod telemetry;
pub mod utils;

pub use import::{ImportError, ImportingStatus, ReleaseStatus};
pub use resource::{LibraryId, ResourceAddress, ResourceHandle, ResourceId, ResourceObject};
pub use utils::timer::Stopwatch;
