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

//! Configuration of an import environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// What happens to a resource whose import failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Remove the failed container; the next import starts from scratch.
    #[default]
    Evict,
    /// Keep the failed container. Imports fail with the recorded error until
    /// the resource is explicitly evicted.
    Quarantine,
}

/// Settings for an [`ImportEnvironment`](crate::ImportEnvironment).
///
/// Every field has a default, so a partial JSON document is valid:
///
/// ```
/// use kiln_io::{FailurePolicy, ImportConfig};
///
/// let config = ImportConfig::from_json(r#"{ "failure_policy": "quarantine" }"#).unwrap();
/// assert_eq!(config.failure_policy, FailurePolicy::Quarantine);
/// assert_eq!(config.metrics_namespace, "import");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Handling of failed imports.
    pub failure_policy: FailurePolicy,
    /// Upper bound on how long shutdown waits for running pipelines before
    /// canceling them. `None` waits indefinitely.
    pub shutdown_timeout_ms: Option<u64>,
    /// Namespace of every metric the environment registers.
    pub metrics_namespace: String,
    /// Log skipped references at `warn` instead of `debug`.
    pub log_unresolved_references: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::Evict,
            shutdown_timeout_ms: None,
            metrics_namespace: "import".to_string(),
            log_unresolved_references: true,
        }
    }
}

impl ImportConfig {
    /// Parses a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Loads a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read import config '{}'", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse import config '{}'", path.display()))
    }

    /// Writes the configuration to a JSON file.
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write import config '{}'", path.display()))
    }

    /// The shutdown drain bound as a `Duration`.
    pub fn shutdown_timeout(&self) -> Option<Duration> {
        self.shutdown_timeout_ms.map(Duration::from_millis)
    }

    /// Returns the config with a different failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Returns the config with a shutdown drain bound.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }
}
