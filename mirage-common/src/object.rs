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

use std::{
    any::Any,
    cell::RefCell,
    rc::{Rc, Weak},
};

use hashbrown::HashMap;

/// Identity handle over an arbitrary heap object.
///
/// Two `ObjectRef`s are the same key iff they point at the same allocation.
#[derive(Clone)]
pub struct ObjectRef(Rc<dyn Any>);

impl ObjectRef {
    pub fn new<T: Any>(object: Rc<T>) -> Self {
        Self(object)
    }

    pub fn from_dyn(object: Rc<dyn Any>) -> Self {
        Self(object)
    }

    /// Allocation address; only meaningful together with a liveness guard.
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn downgrade(&self) -> Weak<dyn Any> {
        Rc::downgrade(&self.0)
    }
}

struct SlotEntry {
    object: Weak<dyn Any>,
    slot: String,
}

/// Associates in-memory objects with their vat-slot strings.
///
/// Entries are keyed by allocation identity and guarded by a weak reference,
/// so a recycled address can never alias a dropped object's slot. The inverse
/// direction (slot to representative) is the caller's concern.
#[derive(Default)]
pub struct SlotTable {
    entries: RefCell<HashMap<usize, SlotEntry>>,
}

impl SlotTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, object: &ObjectRef) -> Option<String> {
        let entries = self.entries.borrow();
        let entry = entries.get(&object.addr())?;
        // A dead weak means the address was recycled; the entry is stale.
        entry
            .object
            .upgrade()
            .is_some()
            .then(|| entry.slot.clone())
    }

    /// Records the association. Idempotent for an already-registered object.
    pub fn set(&self, object: &ObjectRef, slot: &str) {
        let mut entries = self.entries.borrow_mut();
        entries.retain(|_, entry| entry.object.strong_count() > 0);
        entries.insert(
            object.addr(),
            SlotEntry {
                object: object.downgrade(),
                slot: slot.to_string(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
