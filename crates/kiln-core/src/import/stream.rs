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

use std::{
    fmt,
    io::{Cursor, Read, Seek},
    sync::Arc,
};

/// What a [`ResourceStream`] declares it can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamCapabilities {
    /// The stream can be read.
    pub readable: bool,
    /// The stream supports random access.
    pub seekable: bool,
    /// The stream could mutate its backing storage.
    pub writable: bool,
}

impl StreamCapabilities {
    /// Readable, seekable, not writable: the only shape the runtime accepts.
    pub const READ_ONLY: Self = Self {
        readable: true,
        seekable: true,
        writable: false,
    };

    /// Checks the capabilities against the library contract.
    pub fn check(self) -> Result<(), StreamViolation> {
        if self.writable {
            Err(StreamViolation::Writable)
        } else if !self.readable {
            Err(StreamViolation::NotReadable)
        } else if !self.seekable {
            Err(StreamViolation::NotSeekable)
        } else {
            Ok(())
        }
    }
}

/// The ways a library can break its stream contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamViolation {
    /// The library returned no stream for a resource it claims to contain.
    Missing,
    /// The stream could write to its backing storage.
    Writable,
    /// The stream cannot be read.
    NotReadable,
    /// The stream does not support seeking.
    NotSeekable,
}

impl fmt::Display for StreamViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StreamViolation::Missing => "library returned no stream",
            StreamViolation::Writable => "stream is writable",
            StreamViolation::NotReadable => "stream is not readable",
            StreamViolation::NotSeekable => "stream is not seekable",
        };
        f.write_str(text)
    }
}

/// A byte source handed out by a library.
///
/// Implementors report their [`StreamCapabilities`] so that the runtime can
/// reject streams that would let it mutate the library's backing storage.
pub trait ResourceStream: Read + Seek + Send {
    /// Declared capabilities of this stream.
    fn capabilities(&self) -> StreamCapabilities {
        StreamCapabilities::READ_ONLY
    }
}

impl<T> ResourceStream for Cursor<T> where T: AsRef<[u8]> + Send {}

/// In-memory chunk payload handed to deserializers.
///
/// Each call gets its own cursor, positioned at the start, over shared bytes.
pub type ChunkStream = Cursor<Arc<[u8]>>;
