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

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters kept by the dispatcher.
///
/// These are derived bookkeeping, updated next to every state change of the
/// container graph. Requests rejected before a pipeline starts (unknown
/// library, unknown resource) never touch them.
#[derive(Debug, Default)]
pub(crate) struct ImportStatistics {
    reference_count: AtomicU64,
    unique_resources: AtomicU64,
    disposed: AtomicU64,
    undisposed: AtomicU64,
    failed: AtomicU64,
    canceled: AtomicU64,
}

impl ImportStatistics {
    pub(crate) fn reference_acquired(&self) {
        self.reference_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn references_released(&self, count: u64) {
        saturating_sub(&self.reference_count, count);
    }

    pub(crate) fn run_started(&self) {
        self.unique_resources.fetch_add(1, Ordering::Relaxed);
    }

    /// A run ended by disposal (or leaking) of its object.
    pub(crate) fn run_retired(&self, disposed: bool) {
        saturating_sub(&self.unique_resources, 1);
        let counter = if disposed {
            &self.disposed
        } else {
            &self.undisposed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn run_failed(&self) {
        saturating_sub(&self.unique_resources, 1);
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn run_canceled(&self) {
        saturating_sub(&self.unique_resources, 1);
        self.canceled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            reference_count: self.reference_count.load(Ordering::Relaxed),
            unique_resources: self.unique_resources.load(Ordering::Relaxed),
            disposed: self.disposed.load(Ordering::Relaxed),
            undisposed: self.undisposed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            canceled: self.canceled.load(Ordering::Relaxed),
        }
    }
}

fn saturating_sub(counter: &AtomicU64, amount: u64) {
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
        Some(current.saturating_sub(amount))
    });
}

/// A point-in-time copy of the import counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    /// Sum of the reference counts of every cached resource.
    pub reference_count: u64,
    /// Resources with a running or successful pipeline.
    pub unique_resources: u64,
    /// Objects a disposer accepted.
    pub disposed: u64,
    /// Objects no disposer accepted.
    pub undisposed: u64,
    /// Pipeline runs that ended in an error.
    pub failed: u64,
    /// Pipeline runs that were canceled.
    pub canceled: u64,
}
