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

//! # Kiln IO
//!
//! Runtime import services. An [`ImportEnvironment`] turns compiled resources
//! stored in registered libraries into live, shared, reference-counted
//! objects:
//!
//! - identical concurrent requests share one pipeline run;
//! - references between resources (including self and circular references)
//!   are discovered and linked before any caller sees the object;
//! - releasing the last reference cancels an unfinished import or disposes
//!   the finished object through the registered disposer chain.
//!
//! ```no_run
//! use kiln_core::import::BincodeDeserializer;
//! use kiln_core::{LibraryId, ResourceAddress, ResourceId};
//! use kiln_io::{ImportEnvironment, MemoryLibrary};
//!
//! # async fn run(bytes: Vec<u8>) -> anyhow::Result<()> {
//! let library_id = LibraryId::from_name("base");
//! let mut library = MemoryLibrary::new(library_id);
//! let id = library.insert_named("greeting", bytes);
//!
//! let env = ImportEnvironment::builder()
//!     .with_library(library)
//!     .with_deserializer("string", BincodeDeserializer::<String>::new())
//!     .build()?;
//!
//! let operation = env.import(ResourceAddress::new(library_id, id)).await?;
//! let handle = operation.wait().await?;
//! println!("{}", handle.downcast::<String>().unwrap_or_default());
//! env.release(&operation).await?;
//! env.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod import;
pub mod library;

pub use config::{FailurePolicy, ImportConfig};
pub use import::{
    ImportEnvironment, ImportEnvironmentBuilder, ImportingOperation, ReleaseTarget,
    ShutdownSummary, StatisticsSnapshot,
};
pub use library::{LibraryRegistry, MemoryLibrary, PackBuilder, PackEntry, PackLibrary};
