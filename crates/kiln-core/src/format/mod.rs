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

//! The compiled resource container format.
//!
//! Every compiled resource starts with a fixed header followed by a chunk
//! table. All integers are little-endian.
//!
//! ```text
//! |------------- header --------------|
//! | magic "KILNRSRC"        (8 bytes) |
//! | major version           (u16)     |
//! | minor version           (u16)     |
//! | chunk count             (i32)     |
//! |----------- chunk table -----------|
//! | tag (4 bytes), offset (u32)  x N  |
//! |------------- chunks --------------|
//! | length (u32), payload             |
//! ```
//!
//! Known chunks are `DATA` (object payload), `OPTS` (import options, from
//! minor version 1 on) and `DESR` (UTF-8 name of the deserializer).
//!
//! The major version selects the reader; unknown majors are rejected, unknown
//! minors of a known major are read with the newest rules that major knows.

mod error;
mod header;
mod reader;
mod writer;

pub use error::*;
pub use header::*;
pub use reader::*;
pub use writer::*;
