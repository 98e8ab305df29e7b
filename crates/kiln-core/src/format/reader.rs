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

use super::{
    error::FormatError,
    header::{read_u32, ChunkTag, FormatHeader},
};
use std::{
    io::{Read, Seek, SeekFrom},
    sync::Arc,
};

/// The parts of a compiled resource the runtime needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledResource {
    /// Major version the resource was written with.
    pub major: u16,
    /// Minor version the resource was written with.
    pub minor: u16,
    /// Registered name of the deserializer to use.
    pub deserializer: String,
    /// Contents of the `DATA` chunk.
    pub data: Arc<[u8]>,
    /// Contents of the `OPTS` chunk, when the version supports it and the
    /// chunk is present.
    pub options: Option<Arc<[u8]>>,
}

/// Reads a compiled resource from the start of `reader`.
///
/// The header's major version selects the reader. Chunk offsets are absolute,
/// so the stream must be positioned on the first header byte at offset zero.
pub fn read_compiled_resource<R: Read + Seek>(
    reader: &mut R,
) -> Result<CompiledResource, FormatError> {
    let stream_len = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(0))?;
    let header = FormatHeader::read(reader)?;

    match header.major {
        1 => read_v1(reader, &header, stream_len),
        major => Err(FormatError::UnsupportedVersion {
            major,
            minor: header.minor,
        }),
    }
}

// Minor 0: DATA + DESR. Minor 1 and later: optional OPTS.
fn read_v1<R: Read + Seek>(
    reader: &mut R,
    header: &FormatHeader,
    stream_len: u64,
) -> Result<CompiledResource, FormatError> {
    let name = read_required(reader, header, ChunkTag::DESERIALIZER, stream_len)?;
    let deserializer =
        String::from_utf8(name).map_err(|_| FormatError::InvalidDeserializerName)?;
    let data = read_required(reader, header, ChunkTag::DATA, stream_len)?;

    let options = if header.minor >= 1 {
        read_chunk(reader, header, ChunkTag::OPTIONS, stream_len)?
    } else {
        None
    };

    Ok(CompiledResource {
        major: header.major,
        minor: header.minor,
        deserializer,
        data: Arc::from(data),
        options: options.map(Arc::from),
    })
}

fn read_required<R: Read + Seek>(
    reader: &mut R,
    header: &FormatHeader,
    tag: ChunkTag,
    stream_len: u64,
) -> Result<Vec<u8>, FormatError> {
    read_chunk(reader, header, tag, stream_len)?.ok_or(FormatError::MissingChunk(tag))
}

fn read_chunk<R: Read + Seek>(
    reader: &mut R,
    header: &FormatHeader,
    tag: ChunkTag,
    stream_len: u64,
) -> Result<Option<Vec<u8>>, FormatError> {
    let Some(entry) = header.find(tag) else {
        return Ok(None);
    };

    let overrun = |length: u64| FormatError::ChunkOverrun {
        tag,
        offset: entry.offset,
        length,
        stream_len,
    };

    let payload_start = entry.offset as u64 + 4;
    if payload_start > stream_len {
        return Err(overrun(0));
    }
    reader.seek(SeekFrom::Start(entry.offset as u64))?;
    let length = read_u32(reader)? as u64;
    if payload_start + length > stream_len {
        return Err(overrun(length));
    }

    let mut payload = vec![0u8; length as usize];
    reader.read_exact(&mut payload)?;
    Ok(Some(payload))
}
