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

use super::header::{ChunkTag, FormatHeader, MAGIC};
use std::io::{self, Write};

/// Builds compiled resources.
///
/// Used by build tooling and tests. Chunks are laid out right after the
/// chunk table, in the order they were first set.
///
/// ```
/// use kiln_core::format::{read_compiled_resource, CompiledResourceWriter};
/// use std::io::Cursor;
///
/// let bytes = CompiledResourceWriter::new("text").data(b"hello".to_vec()).to_bytes();
/// let resource = read_compiled_resource(&mut Cursor::new(bytes)).unwrap();
/// assert_eq!(resource.deserializer, "text");
/// assert_eq!(&*resource.data, b"hello");
/// ```
#[derive(Debug, Clone)]
pub struct CompiledResourceWriter {
    major: u16,
    minor: u16,
    chunks: Vec<(ChunkTag, Vec<u8>)>,
}

impl CompiledResourceWriter {
    /// Current major version.
    pub const MAJOR: u16 = 1;
    /// Current minor version.
    pub const MINOR: u16 = 1;

    /// Starts a resource handled by the deserializer registered as `deserializer`.
    pub fn new(deserializer: &str) -> Self {
        Self {
            major: Self::MAJOR,
            minor: Self::MINOR,
            chunks: vec![(ChunkTag::DESERIALIZER, deserializer.as_bytes().to_vec())],
        }
    }

    /// Overrides the version written in the header.
    pub fn version(mut self, major: u16, minor: u16) -> Self {
        self.major = major;
        self.minor = minor;
        self
    }

    /// Sets the `DATA` chunk.
    pub fn data(self, data: Vec<u8>) -> Self {
        self.raw_chunk(ChunkTag::DATA, data)
    }

    /// Sets the `OPTS` chunk.
    pub fn options(self, options: Vec<u8>) -> Self {
        self.raw_chunk(ChunkTag::OPTIONS, options)
    }

    /// Sets an arbitrary chunk, replacing any previous chunk with that tag.
    pub fn raw_chunk(mut self, tag: ChunkTag, payload: Vec<u8>) -> Self {
        match self.chunks.iter_mut().find(|(t, _)| *t == tag) {
            Some((_, existing)) => *existing = payload,
            None => self.chunks.push((tag, payload)),
        }
        self
    }

    /// Drops a chunk from the output.
    pub fn omit(mut self, tag: ChunkTag) -> Self {
        self.chunks.retain(|(t, _)| *t != tag);
        self
    }

    /// Writes the resource to `writer`.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.to_bytes())
    }

    /// Encodes the resource.
    pub fn to_bytes(&self) -> Vec<u8> {
        let table_end = FormatHeader::FIXED_SIZE + self.chunks.len() * FormatHeader::ENTRY_SIZE;
        let payload_len: usize = self.chunks.iter().map(|(_, p)| 4 + p.len()).sum();
        let mut bytes = Vec::with_capacity(table_end + payload_len);

        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(&self.major.to_le_bytes());
        bytes.extend_from_slice(&self.minor.to_le_bytes());
        bytes.extend_from_slice(&(self.chunks.len() as i32).to_le_bytes());

        let mut offset = table_end;
        for (tag, payload) in &self.chunks {
            bytes.extend_from_slice(&tag.0);
            bytes.extend_from_slice(&(offset as u32).to_le_bytes());
            offset += 4 + payload.len();
        }

        for (_, payload) in &self.chunks {
            bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            bytes.extend_from_slice(payload);
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn layout_places_chunks_after_table() {
        let bytes = CompiledResourceWriter::new("ab").data(vec![7, 7]).to_bytes();

        let header = FormatHeader::read(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(header.chunks.len(), 2);

        let desr = header.find(ChunkTag::DESERIALIZER).unwrap();
        assert_eq!(desr.offset as usize, header.encoded_len());
        let data = header.find(ChunkTag::DATA).unwrap();
        assert_eq!(data.offset, desr.offset + 4 + 2);
        assert_eq!(bytes.len(), data.offset as usize + 4 + 2);
    }

    #[test]
    fn raw_chunk_replaces_existing() {
        let writer = CompiledResourceWriter::new("first").raw_chunk(ChunkTag::DESERIALIZER, b"second".to_vec());
        let bytes = writer.to_bytes();
        let header = FormatHeader::read(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(header.chunks.len(), 1);
    }
}
