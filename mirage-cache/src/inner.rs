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

use std::cell::{Ref, RefCell};

use mirage_common::{Ground, RawData};

/// Where one instance's state currently lives.
#[derive(Debug)]
pub enum Residency {
    /// The kind's initializer is still running; staged values live in the
    /// state handle, not here. The evictor must skip this entry.
    Initializing,
    /// Live in memory and serializable.
    Resident(RawData),
    /// Evicted. A later cache lookup revives a fresh resident entry; holders
    /// of this one rebind on their next access.
    Detached,
}

/// The cache-side owner of one virtual object's live state.
///
/// Shared as `Rc<InnerSelf>` between the cache and any state handles bound
/// to it. Identity is the instance key; the residency tag is the only
/// mutable part.
#[derive(Debug)]
pub struct InnerSelf {
    instance_key: String,
    residency: RefCell<Residency>,
}

impl InnerSelf {
    pub fn initializing(instance_key: impl Into<String>) -> Self {
        Self {
            instance_key: instance_key.into(),
            residency: RefCell::new(Residency::Initializing),
        }
    }

    pub fn resident(instance_key: impl Into<String>, data: RawData) -> Self {
        Self {
            instance_key: instance_key.into(),
            residency: RefCell::new(Residency::Resident(data)),
        }
    }

    pub fn instance_key(&self) -> &str {
        &self.instance_key
    }

    pub fn is_initializing(&self) -> bool {
        matches!(*self.residency.borrow(), Residency::Initializing)
    }

    pub fn is_resident(&self) -> bool {
        matches!(*self.residency.borrow(), Residency::Resident(_))
    }

    /// Read access to the live data. `None` unless resident.
    ///
    /// The borrow must be released before any codec or storage call.
    pub fn data(&self) -> Option<Ref<'_, RawData>> {
        Ref::filter_map(self.residency.borrow(), |residency| match residency {
            Residency::Resident(data) => Some(data),
            _ => None,
        })
        .ok()
    }

    /// Overwrites one property of the live data. `false` unless resident.
    pub fn put(&self, property: &str, ground: Ground) -> bool {
        match *self.residency.borrow_mut() {
            Residency::Resident(ref mut data) => {
                data.insert(property.to_string(), ground);
                true
            }
            _ => false,
        }
    }

    /// Finishes initialization: the entry becomes resident with `data`.
    pub fn commit(&self, data: RawData) {
        let mut residency = self.residency.borrow_mut();
        debug_assert!(matches!(*residency, Residency::Initializing));
        *residency = Residency::Resident(data);
    }

    /// Detaches the entry, yielding its data for the store hook.
    ///
    /// `None` when not resident; the evictor never picks such entries.
    pub fn detach(&self) -> Option<RawData> {
        let mut residency = self.residency.borrow_mut();
        match std::mem::replace(&mut *residency, Residency::Detached) {
            Residency::Resident(data) => Some(data),
            other => {
                *residency = other;
                None
            }
        }
    }
}
