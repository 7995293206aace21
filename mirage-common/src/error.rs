//  Copyright 2025 Mirage Project Authors
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

/// Error type shared across the mirage crates.
///
/// All failures surface to the caller unchanged; nothing is retried.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Every resident cache slot is occupied by an in-progress
    /// initialization. Fatal programmer error.
    #[error("cache overflow: all resident entries are still initializing")]
    CacheOverflow,

    /// A vref names a kind that was never registered with this manager.
    #[error("unknown kind for {vref}")]
    UnknownKind { vref: String },

    /// Weak-store `init` on a key that already has a binding.
    #[error("{key_name} already registered")]
    AlreadyRegistered { key_name: String },

    /// Weak-store `get`/`set`/`delete` on a key with no binding.
    #[error("{key_name} not found")]
    NotFound { key_name: String },

    /// A property staged during initialization has no ground form.
    #[error("property {property} is not serializable: {reason}")]
    NonSerializable { property: String, reason: String },

    /// State was wrapped while its initialization was still running.
    #[error("state is still initializing")]
    StillInitializing,

    /// Access to a property outside the instance's frozen property set.
    #[error("unknown property {property}")]
    UnknownProperty { property: String },

    /// A slot reference that does not follow the vat-slot grammar.
    #[error("malformed slot {slot}")]
    MalformedSlot { slot: String },

    /// Ground-form conversion failure outside of instance minting.
    #[error("codec: {reason}")]
    Codec { reason: String },

    /// Durable-tier failure, propagated unchanged.
    #[error("storage: {reason}")]
    Storage { reason: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn already_registered(key_name: impl Into<String>) -> Self {
        Self::AlreadyRegistered {
            key_name: key_name.into(),
        }
    }

    pub fn not_found(key_name: impl Into<String>) -> Self {
        Self::NotFound {
            key_name: key_name.into(),
        }
    }

    pub fn storage(reason: impl Into<String>) -> Self {
        Self::Storage {
            reason: reason.into(),
        }
    }
}
