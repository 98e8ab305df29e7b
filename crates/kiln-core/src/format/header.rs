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

use super::error::FormatError;
use std::{collections::HashSet, fmt, io::Read};

/// Magic bytes at the start of every compiled resource.
pub const MAGIC: [u8; 8] = *b"KILNRSRC";

/// Largest chunk table a reader accepts.
pub const MAX_CHUNKS: i32 = 256;

/// A four-byte chunk identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkTag(pub [u8; 4]);

impl ChunkTag {
    /// Serialized object payload.
    pub const DATA: ChunkTag = ChunkTag(*b"DATA");
    /// Serialized import options.
    pub const OPTIONS: ChunkTag = ChunkTag(*b"OPTS");
    /// UTF-8 name of the deserializer.
    pub const DESERIALIZER: ChunkTag = ChunkTag(*b"DESR");
}

impl fmt::Display for ChunkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            if byte.is_ascii_graphic() {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "\\x{byte:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ChunkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkTag({self})")
    }
}

/// One row of the chunk table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkEntry {
    /// The chunk identifier.
    pub tag: ChunkTag,
    /// Absolute offset of the chunk's length prefix.
    pub offset: u32,
}

/// The fixed header plus chunk table of a compiled resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatHeader {
    /// Major version; selects the reader.
    pub major: u16,
    /// Minor version; enables optional features within a major.
    pub minor: u16,
    /// The chunk table, in file order.
    pub chunks: Vec<ChunkEntry>,
}

impl FormatHeader {
    /// Size in bytes of the fixed part of the header.
    pub const FIXED_SIZE: usize = MAGIC.len() + 2 + 2 + 4;
    /// Size in bytes of one chunk table row.
    pub const ENTRY_SIZE: usize = 4 + 4;

    /// Reads the header from the current position of `reader`.
    ///
    /// Tags are checked for uniqueness here; which tags are required is up to
    /// the version-specific reader.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, FormatError> {
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(FormatError::BadMagic { found: magic });
        }

        let major = read_u16(reader)?;
        let minor = read_u16(reader)?;
        let count = read_i32(reader)?;
        if !(0..=MAX_CHUNKS).contains(&count) {
            return Err(FormatError::InvalidChunkCount(count));
        }

        let mut seen = HashSet::with_capacity(count as usize);
        let mut chunks = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let mut tag = [0u8; 4];
            reader.read_exact(&mut tag)?;
            let tag = ChunkTag(tag);
            if !seen.insert(tag) {
                return Err(FormatError::DuplicateChunk(tag));
            }
            let offset = read_u32(reader)?;
            chunks.push(ChunkEntry { tag, offset });
        }

        Ok(Self {
            major,
            minor,
            chunks,
        })
    }

    /// Returns the table row for `tag`, if present.
    pub fn find(&self, tag: ChunkTag) -> Option<&ChunkEntry> {
        self.chunks.iter().find(|entry| entry.tag == tag)
    }

    /// Number of bytes the header occupies in the stream.
    pub fn encoded_len(&self) -> usize {
        Self::FIXED_SIZE + self.chunks.len() * Self::ENTRY_SIZE
    }
}

pub(crate) fn read_u16<R: Read>(reader: &mut R) -> std::io::Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

pub(crate) fn read_u32<R: Read>(reader: &mut R) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn read_i32<R: Read>(reader: &mut R) -> std::io::Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn raw_header(magic: &[u8; 8], count: i32, tags: &[&[u8; 4]]) -> Vec<u8> {
        let mut bytes = magic.to_vec();
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&count.to_le_bytes());
        for tag in tags {
            bytes.extend_from_slice(*tag);
            bytes.extend_from_slice(&0u32.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn reads_chunk_table() {
        let bytes = raw_header(&MAGIC, 2, &[b"DATA", b"DESR"]);
        let header = FormatHeader::read(&mut Cursor::new(bytes)).unwrap();

        assert_eq!(header.major, 1);
        assert_eq!(header.minor, 0);
        assert_eq!(header.chunks.len(), 2);
        assert!(header.find(ChunkTag::DATA).is_some());
        assert!(header.find(ChunkTag::OPTIONS).is_none());
        assert_eq!(header.encoded_len(), 16 + 2 * 8);
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = raw_header(b"NOTKILN!", 0, &[]);
        let result = FormatHeader::read(&mut Cursor::new(bytes));
        assert!(matches!(result, Err(FormatError::BadMagic { .. })));
    }

    #[test]
    fn rejects_negative_and_oversized_counts() {
        for count in [-1, MAX_CHUNKS + 1] {
            let bytes = raw_header(&MAGIC, count, &[]);
            let result = FormatHeader::read(&mut Cursor::new(bytes));
            assert!(matches!(result, Err(FormatError::InvalidChunkCount(c)) if c == count));
        }
    }

    #[test]
    fn rejects_duplicate_tags() {
        let bytes = raw_header(&MAGIC, 2, &[b"DATA", b"DATA"]);
        let result = FormatHeader::read(&mut Cursor::new(bytes));
        assert!(matches!(result, Err(FormatError::DuplicateChunk(ChunkTag::DATA))));
    }

    #[test]
    fn truncated_table_is_an_io_error() {
        let mut bytes = raw_header(&MAGIC, 1, &[b"DATA"]);
        bytes.truncate(bytes.len() - 2);
        let result = FormatHeader::read(&mut Cursor::new(bytes));
        assert!(matches!(result, Err(FormatError::Io(_))));
    }

    #[test]
    fn tag_display_escapes_binary() {
        assert_eq!(ChunkTag::DESERIALIZER.to_string(), "DESR");
        assert_eq!(ChunkTag([b'A', 0, b'B', 0xff]).to_string(), "A\\x00B\\xff");
    }
}
