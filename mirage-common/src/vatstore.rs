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

use std::{cell::RefCell, collections::BTreeMap};

/// The durable string-to-string key-value store behind the manager.
///
/// Keys are opaque; values are serialized text. `delete` writes a tombstone:
/// the key reads as absent afterwards, but the store can still distinguish it
/// from a key that was never written.
pub trait Vatstore {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str);

    fn delete(&self, key: &str);
}

/// In-memory vatstore.
///
/// Shared by handle; a host "restart" is simulated by building a second
/// manager over the same store.
#[derive(Default)]
pub struct MemVatstore {
    // None marks a tombstone.
    entries: RefCell<BTreeMap<String, Option<String>>>,
}

impl MemVatstore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the key holds a tombstone (deleted, not merely absent).
    pub fn is_tombstone(&self, key: &str) -> bool {
        matches!(self.entries.borrow().get(key), Some(None))
    }

    /// Snapshot of all live (non-tombstoned) entries.
    pub fn dump(&self) -> BTreeMap<String, String> {
        self.entries
            .borrow()
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|v| (k.clone(), v.clone())))
            .collect()
    }
}

impl Vatstore for MemVatstore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).and_then(|v| v.clone())
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), Some(value.to_string()));
    }

    fn delete(&self, key: &str) {
        self.entries.borrow_mut().insert(key.to_string(), None);
    }
}
