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

//! The error hierarchy of the import runtime.

use super::stream::StreamViolation;
use crate::format::FormatError;
use crate::resource::{LibraryId, ResourceAddress, ResourceId};
use std::sync::Arc;

/// Everything that can go wrong while importing or releasing a resource.
///
/// The type is `Clone` because one pipeline outcome is shared by every caller
/// awaiting the same resource; foreign errors are kept behind an `Arc`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ImportError {
    /// No registered library has this id.
    #[error("library {0} is not registered")]
    LibraryNotFound(LibraryId),

    /// The resource is not present in the addressed library (or in any
    /// library, when looked up by id alone).
    #[error("resource {0} was not found in any registered library")]
    ResourceNotFound(ResourceId),

    /// A `(library, name)` pair did not resolve to a resource.
    #[error("no resource named '{name}' in library {library}")]
    NameNotFound {
        /// The library that was searched.
        library: LibraryId,
        /// The name that was looked up.
        name: String,
    },

    /// The library broke its stream contract.
    #[error("stream contract violated for {address}: {violation}")]
    StreamContract {
        /// The resource being fetched.
        address: ResourceAddress,
        /// What was wrong with the stream.
        violation: StreamViolation,
    },

    /// The compiled bytes are malformed.
    #[error("malformed compiled resource: {0}")]
    Format(#[from] FormatError),

    /// The compiled resource names a deserializer nobody registered.
    #[error("no deserializer registered under '{0}'")]
    DeserializerNotFound(String),

    /// A deserializer returned an error.
    #[error("deserializer '{deserializer}' failed on {resource}: {cause:#}")]
    Deserialization {
        /// The resource being built.
        resource: ResourceId,
        /// The registered name of the deserializer.
        deserializer: String,
        /// The deserializer's own error.
        cause: Arc<anyhow::Error>,
    },

    /// The last reference was released while the pipeline was running.
    #[error("import of {0} was canceled")]
    Canceled(ResourceId),

    /// A release was requested for a resource nobody holds.
    #[error("resource {0} holds no references")]
    NotAcquired(ResourceId),

    /// The released object or handle does not belong to the resource it names.
    #[error("object does not belong to resource {0}")]
    IdentityMismatch(ResourceId),

    /// The operation belongs to an earlier pipeline run of its container.
    #[error("operation for {0} belongs to a previous import run")]
    StaleOperation(ResourceId),

    /// The environment is shutting down and accepts no new imports.
    #[error("import environment is shut down")]
    ShutDown,

    /// The environment was built outside of a tokio runtime.
    #[error("no tokio runtime available to drive import pipelines")]
    NoRuntime,

    /// An I/O failure while talking to a library.
    #[error("I/O error while reading {address}: {source}")]
    Io {
        /// The resource being fetched.
        address: ResourceAddress,
        /// The underlying error.
        source: Arc<std::io::Error>,
    },

    /// A worker task died (panic or runtime shutdown).
    #[error("import worker for {resource} failed: {message}")]
    Internal {
        /// The resource being fetched.
        resource: ResourceId,
        /// Description of the failure.
        message: String,
    },
}

impl ImportError {
    /// Returns `true` for [`ImportError::Canceled`].
    ///
    /// Cancellation is tracked separately from failure everywhere: it rolls
    /// statistics back instead of counting as an error.
    pub fn is_canceled(&self) -> bool {
        matches!(self, ImportError::Canceled(_))
    }

    /// Returns `true` for errors raised before any pipeline was started.
    pub fn is_addressing(&self) -> bool {
        matches!(
            self,
            ImportError::LibraryNotFound(_)
                | ImportError::ResourceNotFound(_)
                | ImportError::NameNotFound { .. }
        )
    }

    /// Wraps a deserializer failure.
    pub fn deserialization(
        resource: ResourceId,
        deserializer: impl Into<String>,
        source: anyhow::Error,
    ) -> Self {
        ImportError::Deserialization {
            resource,
            deserializer: deserializer.into(),
            cause: Arc::new(source),
        }
    }

    /// Wraps an I/O failure.
    pub fn io(address: ResourceAddress, source: std::io::Error) -> Self {
        ImportError::Io {
            address,
            source: Arc::new(source),
        }
    }
}
