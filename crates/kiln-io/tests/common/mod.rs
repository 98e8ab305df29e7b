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

//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use anyhow::Context as _;
use async_trait::async_trait;
use kiln_core::format::CompiledResourceWriter;
use kiln_core::import::{
    ChunkStream, DeserializationContext, Deserializer, ReferencePropertyKey, ResourceStream,
    StreamCapabilities, TypedDisposer,
};
use kiln_core::library::LibraryProvider;
use kiln_core::{LibraryId, ResourceHandle, ResourceId, ResourceObject};
use kiln_io::MemoryLibrary;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

pub fn init_logging() {
    kiln_telemetry::logging::init_test_logging(log::LevelFilter::Debug);
}

pub fn library_id() -> LibraryId {
    LibraryId::from_name("test-library")
}

// --- Node: an object with named links to other resources ---

#[derive(Serialize, Deserialize)]
pub struct NodeData {
    pub label: String,
    pub links: Vec<(String, ResourceId)>,
}

pub struct Node {
    pub label: String,
    links: Mutex<HashMap<String, ResourceHandle>>,
}

impl Node {
    pub fn link(&self, name: &str) -> Option<ResourceHandle> {
        self.links.lock().unwrap().get(name).cloned()
    }

    pub fn link_count(&self) -> usize {
        self.links.lock().unwrap().len()
    }
}

pub struct NodeDeserializer;

#[async_trait]
impl Deserializer for NodeDeserializer {
    async fn deserialize(
        &self,
        data: ChunkStream,
        _options: Option<ChunkStream>,
        context: &mut DeserializationContext,
        _cancel: CancellationToken,
    ) -> anyhow::Result<ResourceObject> {
        let (node, _): (NodeData, usize) =
            bincode::serde::decode_from_slice(&data.get_ref()[..], bincode::config::standard())?;
        for (name, target) in &node.links {
            context.request_reference(ReferencePropertyKey::named(name.as_str()), *target)?;
        }
        Ok(Arc::new(Node {
            label: node.label,
            links: Mutex::new(HashMap::new()),
        }))
    }

    fn resolve_references(
        &self,
        object: &ResourceObject,
        context: &DeserializationContext,
    ) -> anyhow::Result<()> {
        let node = object.downcast_ref::<Node>().context("object is not a Node")?;
        let mut links = node.links.lock().unwrap();
        for (key, handle) in context.resolved_references()? {
            links.insert(key.name().to_string(), handle.clone());
        }
        Ok(())
    }
}

pub fn node_bytes(label: &str, links: &[(&str, ResourceId)]) -> Vec<u8> {
    let data = NodeData {
        label: label.to_string(),
        links: links
            .iter()
            .map(|(name, id)| (name.to_string(), *id))
            .collect(),
    };
    let payload = bincode::serde::encode_to_vec(&data, bincode::config::standard()).unwrap();
    CompiledResourceWriter::new("node").data(payload).to_bytes()
}

pub fn string_bytes(value: &str) -> Vec<u8> {
    let payload = bincode::serde::encode_to_vec(value, bincode::config::standard()).unwrap();
    CompiledResourceWriter::new("string").data(payload).to_bytes()
}

// --- Gate: a deserializer that parks until released or canceled ---

#[derive(Default, Clone)]
pub struct Gate {
    pub entered: Arc<Notify>,
    pub open: Arc<Notify>,
}

pub struct GatedDeserializer(pub Gate);

#[async_trait]
impl Deserializer for GatedDeserializer {
    async fn deserialize(
        &self,
        data: ChunkStream,
        _options: Option<ChunkStream>,
        _context: &mut DeserializationContext,
        cancel: CancellationToken,
    ) -> anyhow::Result<ResourceObject> {
        self.0.entered.notify_one();
        tokio::select! {
            _ = cancel.cancelled() => anyhow::bail!("interrupted"),
            _ = self.0.open.notified() => {}
        }
        Ok(Arc::new(data.get_ref().len()))
    }
}

pub fn gated_bytes() -> Vec<u8> {
    CompiledResourceWriter::new("gated").data(vec![0; 16]).to_bytes()
}

// --- Disposal counting ---

#[derive(Default, Clone)]
pub struct DisposeCounter(Arc<AtomicUsize>);

impl DisposeCounter {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    pub fn for_nodes(&self) -> TypedDisposer<Node, impl Fn(&Node) + Send + Sync + 'static> {
        let count = Arc::clone(&self.0);
        TypedDisposer::new(move |_: &Node| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    pub fn for_strings(&self) -> TypedDisposer<String, impl Fn(&String) + Send + Sync + 'static> {
        let count = Arc::clone(&self.0);
        TypedDisposer::new(move |_: &String| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }
}

// --- Libraries that break the stream contract ---

pub struct WritableStream(Cursor<Vec<u8>>);

impl Read for WritableStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Seek for WritableStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0.seek(pos)
    }
}

impl ResourceStream for WritableStream {
    fn capabilities(&self) -> StreamCapabilities {
        StreamCapabilities {
            writable: true,
            ..StreamCapabilities::READ_ONLY
        }
    }
}

/// Claims every resource it was given, but hands out broken streams.
pub struct BrokenLibrary {
    pub id: LibraryId,
    pub writable: ResourceId,
    pub missing: ResourceId,
}

impl LibraryProvider for BrokenLibrary {
    fn library_id(&self) -> LibraryId {
        self.id
    }

    fn contains(&self, id: ResourceId) -> bool {
        id == self.writable || id == self.missing
    }

    fn resolve_name(&self, _name: &str) -> Option<ResourceId> {
        None
    }

    fn open(&self, id: ResourceId) -> io::Result<Option<Box<dyn ResourceStream>>> {
        if id == self.writable {
            let stream = WritableStream(Cursor::new(string_bytes("never read")));
            return Ok(Some(Box::new(stream)));
        }
        Ok(None)
    }
}

pub fn memory_library() -> MemoryLibrary {
    MemoryLibrary::new(library_id())
}
