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

//! Process-wide logger setup.

use env_logger::{Builder, Env};
use log::LevelFilter;

/// Installs `env_logger` as the global logger.
///
/// `RUST_LOG` controls the filter; `default_filter` applies when it is unset
/// (e.g. `"info"` or `"kiln_io=debug"`). Calling this more than once is
/// harmless: later calls leave the first logger in place and return `false`.
pub fn init_logging(default_filter: &str) -> bool {
    Builder::from_env(Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .try_init()
        .is_ok()
}

/// Installs a logger for tests that writes through the test harness capture.
///
/// Everything at `level` and above from the `kiln_*` crates is shown.
pub fn init_test_logging(level: LevelFilter) {
    let _ = Builder::new()
        .filter_level(LevelFilter::Warn)
        .filter_module("kiln_io", level)
        .filter_module("kiln_telemetry", level)
        .is_test(true)
        .try_init();
}
