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
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Namespace used to derive stable resource ids from names.
const RESOURCE_NAMESPACE: Uuid = Uuid::from_u128(0x6b69_6c6e_2d72_6573_6f75_7263_6500_0001);

/// Namespace used to derive stable library ids from names.
const LIBRARY_NAMESPACE: Uuid = Uuid::from_u128(0x6b69_6c6e_2d6c_6962_7261_7279_0000_0001);

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident, $namespace:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// The nil identifier. Never assigned to a real entry.
            pub const NULL: Self = Self(Uuid::nil());

            /// Creates a new, random (version 4) identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Derives a stable (version 5) identifier from a name.
            ///
            /// The same name always yields the same identifier, which lets the
            /// build stage and the runtime agree on ids without a shared table.
            pub fn from_name(name: &str) -> Self {
                Self(Uuid::new_v5(&$namespace, name.as_bytes()))
            }

            /// Builds an identifier from its raw 128-bit value.
            pub const fn from_u128(value: u128) -> Self {
                Self(Uuid::from_u128(value))
            }

            /// Returns the raw 128-bit value.
            pub const fn as_u128(&self) -> u128 {
                self.0.as_u128()
            }

            /// Returns the underlying UUID.
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Returns `true` for the [`NULL`](Self::NULL) sentinel.
            pub fn is_null(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl Default for $name {
            /// Creates a new, random (version 4) identifier.
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.hyphenated())
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_identifier!(
    /// A globally unique, persistent identifier for one compiled resource.
    ///
    /// The id is assigned at build time and stays stable across rebuilds, so
    /// references between resources survive renames of their source files.
    /// [`ResourceId::NULL`] means "no reference".
    ResourceId,
    RESOURCE_NAMESPACE
);

uuid_identifier!(
    /// Identifies an independently built library of compiled resources.
    LibraryId,
    LIBRARY_NAMESPACE
);
