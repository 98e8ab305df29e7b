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

//! The import runtime: cache, containers, pipeline and release.

mod cache;
mod container;
mod dispatcher;
mod environment;
mod metrics;
mod operation;
mod registry;
mod release;
mod statistics;

pub use environment::{ImportEnvironment, ImportEnvironmentBuilder, ShutdownSummary};
pub use operation::ImportingOperation;
pub use registry::{DeserializerRegistry, DisposerChain};
pub use release::ReleaseTarget;
pub use statistics::StatisticsSnapshot;
