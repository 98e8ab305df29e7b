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

/// Lifecycle of one import pipeline run.
///
/// ```text
/// Importing ──► Success ──► Disposed
///     ├──────► Failed
///     └──────► Canceled
/// ```
///
/// `Failed` and `Canceled` end a run, not the container: a later import may
/// restart the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ImportingStatus {
    /// The pipeline is running.
    Importing = 0,
    /// The object is deserialized and its reference graph is linked.
    Success = 1,
    /// A phase failed; the error was reported to every awaiter.
    Failed = 2,
    /// The last reference was released before the pipeline finished.
    Canceled = 3,
    /// The object was handed to the disposer chain.
    Disposed = 4,
}

impl ImportingStatus {
    /// Returns `true` once the run can no longer change on its own.
    pub fn is_terminal(self) -> bool {
        match self {
            ImportingStatus::Importing => false,
            ImportingStatus::Success
            | ImportingStatus::Failed
            | ImportingStatus::Canceled
            | ImportingStatus::Disposed => true,
        }
    }

    /// Returns `true` only for [`ImportingStatus::Success`].
    pub fn is_success(self) -> bool {
        matches!(self, ImportingStatus::Success)
    }

    /// Returns `true` when an import may reinitialize the slot in place.
    pub fn is_restartable(self) -> bool {
        match self {
            ImportingStatus::Canceled | ImportingStatus::Disposed => true,
            ImportingStatus::Importing | ImportingStatus::Success | ImportingStatus::Failed => {
                false
            }
        }
    }

    /// Raw discriminant, for atomic storage.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes a discriminant produced by [`as_u8`](Self::as_u8).
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ImportingStatus::Importing),
            1 => Some(ImportingStatus::Success),
            2 => Some(ImportingStatus::Failed),
            3 => Some(ImportingStatus::Canceled),
            4 => Some(ImportingStatus::Disposed),
            _ => None,
        }
    }
}

/// What a single release call ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReleaseStatus {
    /// The reference was dropped. Either other references remain, or the run
    /// had already failed and there was nothing left to clean up.
    Released,
    /// This was the last reference and a disposer released the object.
    Disposed,
    /// This was the last reference but no disposer accepted the object.
    NotDisposed,
    /// This was the last reference and the run was still in flight; it was
    /// canceled and the slot stays available for a later import.
    Canceled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminants_round_trip() {
        for status in [
            ImportingStatus::Importing,
            ImportingStatus::Success,
            ImportingStatus::Failed,
            ImportingStatus::Canceled,
            ImportingStatus::Disposed,
        ] {
            assert_eq!(ImportingStatus::from_u8(status.as_u8()), Some(status));
        }
        assert_eq!(ImportingStatus::from_u8(5), None);
    }

    #[test]
    fn classification_uses_variants() {
        assert!(!ImportingStatus::Importing.is_terminal());
        assert!(ImportingStatus::Failed.is_terminal());
        assert!(ImportingStatus::Success.is_success());
        assert!(!ImportingStatus::Disposed.is_success());
        assert!(ImportingStatus::Canceled.is_restartable());
        assert!(!ImportingStatus::Failed.is_restartable());
    }
}
