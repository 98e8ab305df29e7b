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

//! Scoped timers that record their duration into a histogram.

use crate::metrics::registry::HistogramHandle;
use kiln_core::utils::timer::Stopwatch;

/// Times the enclosing scope and records the duration, in milliseconds, into
/// a histogram when dropped.
///
/// The measurement is recorded on every exit path, early returns and `?`
/// included. Call [`discard`](Self::discard) to drop it without recording.
pub struct ScopedMetricTimer<'a> {
    stopwatch: Stopwatch,
    histogram: Option<&'a HistogramHandle>,
}

impl<'a> ScopedMetricTimer<'a> {
    /// Starts timing. A `None` histogram makes the timer a no-op, so callers
    /// with optional metrics do not need two code paths.
    pub fn new(histogram: Option<&'a HistogramHandle>) -> Self {
        Self {
            stopwatch: Stopwatch::start(),
            histogram,
        }
    }

    /// Milliseconds elapsed so far.
    pub fn elapsed_ms(&self) -> f64 {
        self.stopwatch.elapsed_ms()
    }

    /// Stops the timer without recording anything.
    pub fn discard(mut self) {
        self.histogram = None;
    }
}

impl Drop for ScopedMetricTimer<'_> {
    fn drop(&mut self) {
        if let Some(histogram) = self.histogram {
            if let Err(e) = histogram.observe(self.stopwatch.elapsed_ms()) {
                log::warn!("[ScopedMetricTimer] Failed to record {}: {e}", histogram.id());
            }
        }
    }
}
