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

mod common;

use anyhow::Result;
use common::*;
use kiln_core::format::{ChunkTag, CompiledResourceWriter, FormatError};
use kiln_core::import::{BincodeDeserializer, ImportError, ImportingStatus, ReleaseStatus, StreamViolation};
use kiln_core::{LibraryId, ResourceAddress, ResourceId};
use kiln_io::{ImportEnvironment, PackBuilder, PackLibrary, StatisticsSnapshot};
use std::sync::Arc;
use tempfile::tempdir;

fn node_environment(library: kiln_io::MemoryLibrary, disposals: &DisposeCounter) -> Result<ImportEnvironment> {
    Ok(ImportEnvironment::builder()
        .with_library(library)
        .with_deserializer("node", NodeDeserializer)
        .with_deserializer("string", BincodeDeserializer::<String>::new())
        .with_disposer(disposals.for_nodes())
        .with_disposer(disposals.for_strings())
        .build()?)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_imports_share_one_run() -> Result<()> {
    init_logging();

    // --- 1. Setup ---
    let mut library = memory_library();
    let id = library.insert_named("shared", string_bytes("shared value"));
    let disposals = DisposeCounter::default();
    let env = node_environment(library, &disposals)?;
    let address = ResourceAddress::new(library_id(), id);

    // --- 2. Import the same resource from many tasks at once ---
    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let env = env.clone();
            tokio::spawn(async move { env.import(address).await })
        })
        .collect();
    let mut operations = Vec::new();
    for task in tasks {
        operations.push(task.await??);
    }

    // --- 3. One run, one count per caller ---
    assert_eq!(env.reference_count(id), 32);
    assert!(operations.iter().all(|op| op.generation() == operations[0].generation()));
    let stats = env.statistics();
    assert_eq!(stats.unique_resources, 1);
    assert_eq!(stats.reference_count, 32);

    let first = operations[0].wait().await?;
    for operation in &operations {
        let handle = operation.wait().await?;
        assert!(Arc::ptr_eq(handle.object(), first.object()));
    }
    assert_eq!(first.downcast::<String>().as_deref().map(String::as_str), Some("shared value"));
    assert_eq!(env.status(id), Some(ImportingStatus::Success));

    // --- 4. N-1 releases keep it alive, the last one disposes ---
    let last = operations.pop().unwrap();
    for operation in &operations {
        assert_eq!(env.release(operation).await?, ReleaseStatus::Released);
    }
    assert_eq!(env.reference_count(id), 1);
    assert_eq!(disposals.count(), 0);

    assert_eq!(env.release(&last).await?, ReleaseStatus::Disposed);
    assert_eq!(disposals.count(), 1);
    assert!(!env.contains(id));
    assert_eq!(
        env.statistics(),
        StatisticsSnapshot {
            disposed: 1,
            ..StatisticsSnapshot::default()
        }
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn self_reference_binds_to_itself() -> Result<()> {
    init_logging();

    let mut library = memory_library();
    let id = ResourceId::from_name("ouroboros");
    library.insert(id, "ouroboros", node_bytes("ouroboros", &[("tail", id)]));
    let disposals = DisposeCounter::default();
    let env = node_environment(library, &disposals)?;

    let operation = env.import_id(id).await?;
    let handle = operation.wait().await?;
    let node = handle.downcast::<Node>().unwrap();

    let tail = node.link("tail").expect("self reference should be bound");
    assert!(Arc::ptr_eq(tail.object(), handle.object()));
    // One external reference plus the one the object holds on itself.
    assert_eq!(env.reference_count(id), 2);

    // The self reference does not keep the resource alive.
    assert_eq!(env.release(&operation).await?, ReleaseStatus::Disposed);
    assert_eq!(disposals.count(), 1);
    assert_eq!(env.statistics().reference_count, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn mutual_references_both_complete() -> Result<()> {
    init_logging();

    // --- 1. Setup: A -> B and B -> A ---
    let a = ResourceId::from_name("a");
    let b = ResourceId::from_name("b");
    let mut library = memory_library();
    library.insert(a, "a", node_bytes("a", &[("peer", b)]));
    library.insert(b, "b", node_bytes("b", &[("peer", a)]));
    let disposals = DisposeCounter::default();
    let env = node_environment(library, &disposals)?;

    // --- 2. Import A; B is pulled in through the reference ---
    let op_a = env.import_id(a).await?;
    let handle_a = op_a.wait().await?;
    let op_b = env.import_id(b).await?;
    let handle_b = op_b.wait().await?;

    // --- 3. Each side sees the other's object ---
    let node_a = handle_a.downcast::<Node>().unwrap();
    let node_b = handle_b.downcast::<Node>().unwrap();
    assert!(Arc::ptr_eq(node_a.link("peer").unwrap().object(), handle_b.object()));
    assert!(Arc::ptr_eq(node_b.link("peer").unwrap().object(), handle_a.object()));
    assert_eq!(env.status(a), Some(ImportingStatus::Success));
    assert_eq!(env.status(b), Some(ImportingStatus::Success));
    assert_eq!(env.reference_count(a), 2);
    assert_eq!(env.reference_count(b), 2);

    // --- 4. The cycle keeps both alive until shutdown ---
    assert_eq!(env.release(&op_a).await?, ReleaseStatus::Released);
    assert_eq!(env.release(&op_b).await?, ReleaseStatus::Released);
    let summary = env.shutdown().await;
    assert_eq!(summary.disposed, 2);
    assert_eq!(disposals.count(), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn references_are_published_before_their_owner() -> Result<()> {
    init_logging();

    let owner = ResourceId::from_name("owner");
    let middle = ResourceId::from_name("middle");
    let leaf = ResourceId::from_name("leaf");

    // A fresh environment per round, so every round races cold pipelines.
    for _ in 0..50 {
        // --- 1. Setup: owner -> middle -> leaf ---
        let mut library = memory_library();
        library.insert(owner, "owner", node_bytes("owner", &[("next", middle)]));
        library.insert(middle, "middle", node_bytes("middle", &[("next", leaf)]));
        library.insert(leaf, "leaf", node_bytes("leaf", &[]));
        let disposals = DisposeCounter::default();
        let env = node_environment(library, &disposals)?;

        // --- 2. Wait for the owner only ---
        let op_owner = env.import_id(owner).await?;
        let handle = op_owner.wait().await?;

        // --- 3. Everything it reaches is already published ---
        assert_eq!(env.status(middle), Some(ImportingStatus::Success));
        assert_eq!(env.status(leaf), Some(ImportingStatus::Success));
        let linked = handle.downcast::<Node>().unwrap().link("next").unwrap();
        let cached = env.get(middle).expect("middle should be published");
        assert!(Arc::ptr_eq(cached.object(), linked.object()));

        // The linked object is releasable by identity.
        let _op_middle = env.import_id(middle).await?;
        assert_eq!(env.release(linked.object()).await?, ReleaseStatus::Released);
        assert_eq!(env.reference_count(middle), 1);

        assert_eq!(env.shutdown().await.disposed, 3);
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cycle_and_its_tail_are_published_together() -> Result<()> {
    init_logging();

    let a = ResourceId::from_name("a");
    let b = ResourceId::from_name("b");
    let tail = ResourceId::from_name("tail");

    for _ in 0..50 {
        // --- 1. Setup: A <-> B, B -> tail ---
        let mut library = memory_library();
        library.insert(a, "a", node_bytes("a", &[("peer", b)]));
        library.insert(b, "b", node_bytes("b", &[("peer", a), ("tail", tail)]));
        library.insert(tail, "tail", node_bytes("tail", &[]));
        let disposals = DisposeCounter::default();
        let env = node_environment(library, &disposals)?;

        // --- 2. Import A ---
        let op_a = env.import_id(a).await?;
        let handle_a = op_a.wait().await?;

        // --- 3. B and the tail are live as soon as A is ---
        for id in [a, b, tail] {
            assert_eq!(env.status(id), Some(ImportingStatus::Success));
        }
        let peer = handle_a.downcast::<Node>().unwrap().link("peer").unwrap();
        let cached_b = env.get(b).expect("b should be published");
        assert!(Arc::ptr_eq(cached_b.object(), peer.object()));
        assert!(env.get(tail).is_some());

        assert_eq!(env.shutdown().await.disposed, 3);
        assert_eq!(disposals.count(), 3);
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn shared_leaf_is_imported_once_and_released_with_its_owners() -> Result<()> {
    init_logging();

    let leaf = ResourceId::from_name("leaf");
    let left = ResourceId::from_name("left");
    let right = ResourceId::from_name("right");
    let missing = ResourceId::from_name("nowhere");
    let mut library = memory_library();
    library.insert(leaf, "leaf", node_bytes("leaf", &[]));
    library.insert(left, "left", node_bytes("left", &[("leaf", leaf), ("gone", missing)]));
    library.insert(right, "right", node_bytes("right", &[("leaf", leaf), ("none", ResourceId::NULL)]));
    let disposals = DisposeCounter::default();
    let env = node_environment(library, &disposals)?;

    let op_left = env.import_id(left).await?;
    let op_right = env.import_id(right).await?;
    let (left_handle, right_handle) = tokio::try_join!(op_left.wait(), op_right.wait())?;

    let left_node = left_handle.downcast::<Node>().unwrap();
    let right_node = right_handle.downcast::<Node>().unwrap();
    assert!(Arc::ptr_eq(
        left_node.link("leaf").unwrap().object(),
        right_node.link("leaf").unwrap().object()
    ));
    // Unknown and null targets stay unbound without failing the import.
    assert_eq!(left_node.link_count(), 1);
    assert_eq!(right_node.link_count(), 1);
    assert_eq!(env.reference_count(leaf), 2);
    assert_eq!(env.statistics().unique_resources, 3);

    assert_eq!(env.release(&op_left).await?, ReleaseStatus::Disposed);
    assert_eq!(env.reference_count(leaf), 1);
    assert_eq!(env.release(&op_right).await?, ReleaseStatus::Disposed);
    assert!(!env.contains(leaf));
    assert_eq!(disposals.count(), 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn addressing_errors_have_no_side_effects() -> Result<()> {
    init_logging();

    let mut library = memory_library();
    library.insert_named("present", string_bytes("here"));
    let env = node_environment(library, &DisposeCounter::default())?;

    let unknown = ResourceId::from_name("absent");
    assert!(matches!(
        env.import_id(unknown).await,
        Err(ImportError::ResourceNotFound(id)) if id == unknown
    ));
    assert!(matches!(
        env.import(ResourceAddress::new(library_id(), unknown)).await,
        Err(ImportError::ResourceNotFound(_))
    ));
    let stranger = LibraryId::from_name("stranger");
    assert!(matches!(
        env.import(ResourceAddress::new(stranger, unknown)).await,
        Err(ImportError::LibraryNotFound(id)) if id == stranger
    ));
    assert!(matches!(
        env.import_named(library_id(), "absent").await,
        Err(ImportError::NameNotFound { .. })
    ));

    assert_eq!(env.statistics(), StatisticsSnapshot::default());
    assert!(env.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn cached_resource_is_shared_across_libraries() -> Result<()> {
    init_logging();

    // --- 1. Setup: two libraries compiled the same id ---
    let id = ResourceId::from_name("config");
    let first_id = LibraryId::from_name("first");
    let second_id = LibraryId::from_name("second");
    let mut first = kiln_io::MemoryLibrary::new(first_id);
    first.insert(id, "config", string_bytes("from first"));
    let mut second = kiln_io::MemoryLibrary::new(second_id);
    second.insert(id, "config", string_bytes("from second"));
    let env = ImportEnvironment::builder()
        .with_library(first)
        .with_library(second)
        .with_deserializer("string", BincodeDeserializer::<String>::new())
        .build()?;

    // --- 2. Import through each library ---
    let op_first = env.import(ResourceAddress::new(first_id, id)).await?;
    let from_first = op_first.wait().await?;
    let op_second = env.import(ResourceAddress::new(second_id, id)).await?;
    let from_second = op_second.wait().await?;

    // --- 3. The second request joined the cached run ---
    assert_eq!(op_second.generation(), op_first.generation());
    assert_eq!(op_second.address(), ResourceAddress::new(first_id, id));
    assert!(Arc::ptr_eq(from_first.object(), from_second.object()));
    assert_eq!(
        from_second.downcast::<String>().as_deref().map(String::as_str),
        Some("from first")
    );
    assert_eq!(env.reference_count(id), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_resources_fail_with_format_errors() -> Result<()> {
    init_logging();

    // --- 1. Setup: one broken resource per format error ---
    let mut library = memory_library();
    let mut bad_magic = string_bytes("x");
    bad_magic[..8].copy_from_slice(b"NOTKILN!");
    let bad_magic = library.insert_named("bad-magic", bad_magic);
    let future_major = library.insert_named(
        "future-major",
        CompiledResourceWriter::new("string").version(2, 0).data(vec![0]).to_bytes(),
    );
    let no_deserializer = library.insert_named(
        "no-desr",
        CompiledResourceWriter::new("string")
            .data(vec![0])
            .omit(ChunkTag::DESERIALIZER)
            .to_bytes(),
    );
    let mut truncated = CompiledResourceWriter::new("string").data(vec![0; 64]).to_bytes();
    truncated.truncate(truncated.len() - 8);
    let truncated = library.insert_named("truncated", truncated);
    let unregistered = library.insert_named(
        "unregistered",
        CompiledResourceWriter::new("mesh").data(vec![0]).to_bytes(),
    );
    let env = node_environment(library, &DisposeCounter::default())?;

    // --- 2. Every failure surfaces on the operation ---
    let mut operations = Vec::new();
    for id in [bad_magic, future_major, no_deserializer, truncated, unregistered] {
        operations.push(env.import_id(id).await?);
    }
    let errors: Vec<_> = futures::future::join_all(operations.iter().map(|op| op.wait()))
        .await
        .into_iter()
        .map(|result| result.unwrap_err())
        .collect();

    assert!(matches!(errors[0], ImportError::Format(FormatError::BadMagic { .. })));
    assert!(matches!(
        errors[1],
        ImportError::Format(FormatError::UnsupportedVersion { major: 2, .. })
    ));
    assert!(matches!(
        errors[2],
        ImportError::Format(FormatError::MissingChunk(ChunkTag::DESERIALIZER))
    ));
    assert!(matches!(
        errors[3],
        ImportError::Format(FormatError::ChunkOverrun { tag: ChunkTag::DATA, .. })
    ));
    assert!(matches!(&errors[4], ImportError::DeserializerNotFound(name) if name == "mesh"));

    // --- 3. Failed containers are evicted; the references are still owed ---
    assert!(env.is_empty());
    let stats = env.statistics();
    assert_eq!(stats.failed, 5);
    assert_eq!(stats.unique_resources, 0);
    assert_eq!(stats.reference_count, 5);

    for operation in &operations {
        assert_eq!(env.release(operation).await?, ReleaseStatus::Released);
    }
    assert_eq!(env.statistics().reference_count, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn broken_streams_violate_the_contract() -> Result<()> {
    init_logging();

    let library = BrokenLibrary {
        id: LibraryId::from_name("broken"),
        writable: ResourceId::from_name("writable"),
        missing: ResourceId::from_name("missing"),
    };
    let (writable, missing) = (library.writable, library.missing);
    let env = ImportEnvironment::builder()
        .with_library(library)
        .with_deserializer("string", BincodeDeserializer::<String>::new())
        .build()?;

    let operation = env.import_id(writable).await?;
    assert!(matches!(
        operation.wait().await,
        Err(ImportError::StreamContract { violation: StreamViolation::Writable, .. })
    ));
    env.release(&operation).await?;

    let operation = env.import_id(missing).await?;
    assert!(matches!(
        operation.await,
        Err(ImportError::StreamContract { violation: StreamViolation::Missing, .. })
    ));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn pack_library_end_to_end() -> Result<()> {
    init_logging();

    // --- 1. Setup: write a pack to a temporary directory ---
    let dir = tempdir()?;
    let banner = ResourceId::from_name("ui/banner");
    let entries = PackBuilder::new()
        .add(banner, "ui/banner", string_bytes("Welcome"))
        .add_named("ui/screen", node_bytes("screen", &[("banner", banner)]))
        .write(dir.path())?;
    assert_eq!(entries.len(), 2);

    // --- 2. Load it back and import through the name index ---
    let pack_id = LibraryId::from_name("ui-pack");
    let library = PackLibrary::load(pack_id, dir.path())?;
    let disposals = DisposeCounter::default();
    let env = ImportEnvironment::builder()
        .with_library(library)
        .with_deserializer("node", NodeDeserializer)
        .with_deserializer("string", BincodeDeserializer::<String>::new())
        .with_disposer(disposals.for_nodes())
        .with_disposer(disposals.for_strings())
        .build()?;

    let operation = env.import_named(pack_id, "ui/screen").await?;
    let screen = operation.wait().await?.downcast::<Node>().unwrap();

    // --- 3. Assert ---
    assert_eq!(screen.label, "screen");
    let banner_text = screen.link("banner").unwrap().downcast::<String>().unwrap();
    assert_eq!(banner_text.as_str(), "Welcome");

    assert_eq!(env.release(&operation).await?, ReleaseStatus::Disposed);
    assert_eq!(disposals.count(), 2);
    Ok(())
}
