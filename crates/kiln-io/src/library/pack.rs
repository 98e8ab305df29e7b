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

//! Libraries stored as a packed data file plus a bincode index.
//!
//! A pack directory holds two files:
//! - `index.bin`: a bincode-encoded `Vec<PackEntry>`;
//! - `data.pack`: every compiled resource, back to back.

use kiln_core::import::ResourceStream;
use kiln_core::library::LibraryProvider;
use kiln_core::{LibraryId, ResourceId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs::File,
    io::{self, Cursor, Read, Seek, SeekFrom, Write},
    path::Path,
};

/// File name of the pack index.
pub const INDEX_FILE: &str = "index.bin";
/// File name of the pack data.
pub const DATA_FILE: &str = "data.pack";

/// Location of one resource inside `data.pack`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackEntry {
    /// The resource id.
    pub id: ResourceId,
    /// The name the resource was compiled from.
    pub name: String,
    /// Byte offset in the data file.
    pub offset: u64,
    /// Size in bytes.
    pub size: u64,
}

/// A library backed by a pack directory.
///
/// The index is loaded eagerly; resource bytes are read from the shared file
/// handle on each [`open`](LibraryProvider::open).
#[derive(Debug)]
pub struct PackLibrary {
    id: LibraryId,
    entries: HashMap<ResourceId, PackEntry>,
    names: HashMap<String, ResourceId>,
    data: Mutex<File>,
}

impl PackLibrary {
    /// Loads the pack stored in `dir`.
    pub fn load(id: LibraryId, dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref();
        let index_bytes = std::fs::read(dir.join(INDEX_FILE))?;
        let data = File::open(dir.join(DATA_FILE))?;
        Self::from_parts(id, &index_bytes, data)
    }

    /// Builds the library from raw index bytes and an open data file.
    ///
    /// Entries that point past the end of the data file are rejected here
    /// rather than at import time.
    pub fn from_parts(id: LibraryId, index_bytes: &[u8], data: File) -> io::Result<Self> {
        let (list, _): (Vec<PackEntry>, usize) =
            bincode::serde::decode_from_slice(index_bytes, bincode::config::standard())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let data_len = data.metadata()?.len();
        let mut entries = HashMap::with_capacity(list.len());
        let mut names = HashMap::with_capacity(list.len());
        for entry in list {
            let end = entry.offset.checked_add(entry.size);
            if !matches!(end, Some(end) if end <= data_len) {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "pack entry '{}' ({}+{}) exceeds data file of {data_len} bytes",
                        entry.name, entry.offset, entry.size
                    ),
                ));
            }
            names.insert(entry.name.clone(), entry.id);
            entries.insert(entry.id, entry);
        }

        log::debug!("[PackLibrary] Loaded {} entries for library {id}", entries.len());
        Ok(Self {
            id,
            entries,
            names,
            data: Mutex::new(data),
        })
    }

    /// Returns the index entry of a resource.
    pub fn entry(&self, id: ResourceId) -> Option<&PackEntry> {
        self.entries.get(&id)
    }

    /// Number of packed resources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the pack holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl LibraryProvider for PackLibrary {
    fn library_id(&self) -> LibraryId {
        self.id
    }

    fn contains(&self, id: ResourceId) -> bool {
        self.entries.contains_key(&id)
    }

    fn resolve_name(&self, name: &str) -> Option<ResourceId> {
        self.names.get(name).copied()
    }

    fn open(&self, id: ResourceId) -> io::Result<Option<Box<dyn ResourceStream>>> {
        let Some(entry) = self.entries.get(&id) else {
            return Ok(None);
        };

        let mut buffer = vec![0; entry.size as usize];
        {
            let mut data = self.data.lock();
            data.seek(SeekFrom::Start(entry.offset))?;
            data.read_exact(&mut buffer)?;
        }
        Ok(Some(Box::new(Cursor::new(buffer))))
    }
}

/// Writes pack directories.
#[derive(Debug, Default)]
pub struct PackBuilder {
    resources: Vec<(ResourceId, String, Vec<u8>)>,
}

impl PackBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource under an explicit id.
    pub fn add(mut self, id: ResourceId, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.resources.push((id, name.into(), bytes));
        self
    }

    /// Adds a resource under the id derived from its name.
    pub fn add_named(self, name: &str, bytes: Vec<u8>) -> Self {
        self.add(ResourceId::from_name(name), name, bytes)
    }

    /// Writes `index.bin` and `data.pack` into `dir` and returns the index.
    pub fn write(&self, dir: impl AsRef<Path>) -> io::Result<Vec<PackEntry>> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let mut data = File::create(dir.join(DATA_FILE))?;
        let mut index = Vec::with_capacity(self.resources.len());
        let mut offset = 0u64;
        for (id, name, bytes) in &self.resources {
            data.write_all(bytes)?;
            index.push(PackEntry {
                id: *id,
                name: name.clone(),
                offset,
                size: bytes.len() as u64,
            });
            offset += bytes.len() as u64;
        }
        data.sync_all()?;

        let encoded = bincode::serde::encode_to_vec(&index, bincode::config::standard())
            .map_err(io::Error::other)?;
        std::fs::write(dir.join(INDEX_FILE), encoded)?;
        Ok(index)
    }
}
