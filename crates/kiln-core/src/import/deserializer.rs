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

use super::{context::DeserializationContext, stream::ChunkStream};
use crate::resource::ResourceObject;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::{any::Any, io::Read, marker::PhantomData, sync::Arc};
use tokio_util::sync::CancellationToken;

/// Turns the payload of a compiled resource into a live object.
///
/// Deserializers are registered by name; the name is stored in the `DESR`
/// chunk of every compiled resource, so the build stage decides which one
/// the runtime will use.
///
/// Deserialization happens in two steps:
/// 1. [`deserialize`](Self::deserialize) builds the object and records, via
///    [`DeserializationContext::request_reference`], every property that
///    points at another resource.
/// 2. Once those resources are available, the runtime calls
///    [`resolve_references`](Self::resolve_references) with the same object and
///    a context where each request is bound to a handle.
///
/// Objects that hold references therefore need interior mutability for those
/// slots (`OnceLock`, `Mutex`, ...).
#[async_trait]
pub trait Deserializer: Send + Sync + 'static {
    /// Builds the object from the `DATA` chunk.
    ///
    /// `options` carries the `OPTS` chunk when the compiled resource has one.
    /// `cancel` fires when every caller released the resource; long-running
    /// work should poll it and bail out.
    async fn deserialize(
        &self,
        data: ChunkStream,
        options: Option<ChunkStream>,
        context: &mut DeserializationContext,
        cancel: CancellationToken,
    ) -> Result<ResourceObject>;

    /// Links the references requested during [`deserialize`](Self::deserialize).
    ///
    /// Errors are logged and otherwise ignored: a partially linked object is
    /// kept rather than discarded.
    fn resolve_references(
        &self,
        object: &ResourceObject,
        context: &DeserializationContext,
    ) -> Result<()> {
        let _ = (object, context);
        Ok(())
    }
}

/// A deserializer for leaf resources stored as bincode-encoded serde values.
///
/// The whole `DATA` chunk is decoded into `T`; options and references are not
/// used.
pub struct BincodeDeserializer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> BincodeDeserializer<T> {
    /// Creates the deserializer.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for BincodeDeserializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> Deserializer for BincodeDeserializer<T>
where
    T: DeserializeOwned + Any + Send + Sync + 'static,
{
    async fn deserialize(
        &self,
        mut data: ChunkStream,
        _options: Option<ChunkStream>,
        _context: &mut DeserializationContext,
        _cancel: CancellationToken,
    ) -> Result<ResourceObject> {
        let mut bytes = Vec::new();
        data.read_to_end(&mut bytes)?;
        let (value, _): (T, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                .with_context(|| {
                    format!("Failed to decode {} payload", std::any::type_name::<T>())
                })?;
        Ok(Arc::new(value))
    }
}
