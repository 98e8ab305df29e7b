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

use super::header::ChunkTag;
use std::sync::Arc;

/// A malformed or unsupported compiled resource.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FormatError {
    /// The stream does not start with the expected magic bytes.
    #[error("bad magic {found:02x?}")]
    BadMagic {
        /// The bytes found instead.
        found: [u8; 8],
    },

    /// No reader exists for this major version.
    #[error("unsupported format version {major}.{minor}")]
    UnsupportedVersion {
        /// Major version from the header.
        major: u16,
        /// Minor version from the header.
        minor: u16,
    },

    /// The chunk count is negative or unreasonably large.
    #[error("invalid chunk count {0}")]
    InvalidChunkCount(i32),

    /// The same tag appears twice in the chunk table.
    #[error("duplicate chunk '{0}'")]
    DuplicateChunk(ChunkTag),

    /// A chunk the reader requires is absent.
    #[error("missing required chunk '{0}'")]
    MissingChunk(ChunkTag),

    /// A chunk's offset or length points past the end of the stream.
    #[error("chunk '{tag}' at offset {offset} overruns the stream ({length} bytes, stream is {stream_len})")]
    ChunkOverrun {
        /// The offending chunk.
        tag: ChunkTag,
        /// Offset from the chunk table.
        offset: u32,
        /// Declared payload length.
        length: u64,
        /// Total stream length.
        stream_len: u64,
    },

    /// The `DESR` chunk is not valid UTF-8.
    #[error("deserializer name is not valid UTF-8")]
    InvalidDeserializerName,

    /// The underlying stream failed.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for FormatError {
    fn from(error: std::io::Error) -> Self {
        FormatError::Io(Arc::new(error))
    }
}
