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
use itertools::Itertools;
use mirage_common::{parse_slot, Codec, Error, Ground, ObjectRef, Result, SlotTable, Vatstore};

struct LocalEntry<V> {
    object: Weak<dyn Any>,
    value: V,
}

/// A map whose keys split by identity class.
///
/// Keys that resolve through the slot table to a virtual object are persisted
/// in the vatstore under `ws<store_id>.<instance_key>`; every other key is
/// held weakly in memory and forgotten when its referent drops. Virtual keys
/// are never collected: once written, the binding outlives the
/// representative that minted it.
pub struct WeakStore<C: Codec> {
    store_id: u64,
    key_name: String,
    vatstore: Rc<dyn Vatstore>,
    codec: Rc<C>,
    slot_table: Rc<SlotTable>,
    local: RefCell<HashMap<usize, LocalEntry<C::Value>>>,
}

impl<C: Codec> WeakStore<C> {
    pub(crate) fn new(
        store_id: u64,
        key_name: &str,
        vatstore: Rc<dyn Vatstore>,
        codec: Rc<C>,
        slot_table: Rc<SlotTable>,
    ) -> Self {
        Self {
            store_id,
            key_name: key_name.to_string(),
            vatstore,
            codec,
            slot_table,
            local: RefCell::new(HashMap::new()),
        }
    }

    pub fn store_id(&self) -> u64 {
        self.store_id
    }

    /// The vatstore key for `key`, when it is a virtual object.
    fn virtual_key(&self, key: &ObjectRef) -> Option<String> {
        let slot = self.slot_table.get(key)?;
        let parsed = parse_slot(&slot).ok()?;
        parsed
            .virtual_obj
            .then(|| format!("ws{}.{slot}", self.store_id))
    }

    pub fn has(&self, key: &ObjectRef) -> bool {
        match self.virtual_key(key) {
            Some(vkey) => self.vatstore.get(&vkey).is_some(),
            None => {
                self.prune();
                self.local.borrow().contains_key(&key.addr())
            }
        }
    }

    /// Creates the binding; the key must not already be bound.
    pub fn init(&self, key: &ObjectRef, value: C::Value) -> Result<()> {
        match self.virtual_key(key) {
            Some(vkey) => {
                if self.vatstore.get(&vkey).is_some() {
                    return Err(Error::already_registered(&self.key_name));
                }
                self.write_through(&vkey, &value)
            }
            None => {
                self.prune();
                let mut local = self.local.borrow_mut();
                if local.contains_key(&key.addr()) {
                    return Err(Error::already_registered(&self.key_name));
                }
                local.insert(
                    key.addr(),
                    LocalEntry {
                        object: key.downgrade(),
                        value,
                    },
                );
                Ok(())
            }
        }
    }

    pub fn get(&self, key: &ObjectRef) -> Result<C::Value> {
        match self.virtual_key(key) {
            Some(vkey) => {
                let text = self
                    .vatstore
                    .get(&vkey)
                    .ok_or_else(|| Error::not_found(&self.key_name))?;
                let ground: Ground = serde_json::from_str(&text)?;
                self.codec.unserialize(&ground)
            }
            None => {
                self.prune();
                self.local
                    .borrow()
                    .get(&key.addr())
                    .map(|entry| entry.value.clone())
                    .ok_or_else(|| Error::not_found(&self.key_name))
            }
        }
    }

    /// Overwrites an existing binding; the key must already be bound.
    pub fn set(&self, key: &ObjectRef, value: C::Value) -> Result<()> {
        match self.virtual_key(key) {
            Some(vkey) => {
                if self.vatstore.get(&vkey).is_none() {
                    return Err(Error::not_found(&self.key_name));
                }
                self.write_through(&vkey, &value)
            }
            None => {
                self.prune();
                let mut local = self.local.borrow_mut();
                let entry = local
                    .get_mut(&key.addr())
                    .ok_or_else(|| Error::not_found(&self.key_name))?;
                entry.value = value;
                Ok(())
            }
        }
    }

    pub fn delete(&self, key: &ObjectRef) -> Result<()> {
        match self.virtual_key(key) {
            Some(vkey) => {
                if self.vatstore.get(&vkey).is_none() {
                    return Err(Error::not_found(&self.key_name));
                }
                // Tombstone, not a bare removal: the entry stays
                // distinguishable from "never written" at rest.
                self.vatstore.delete(&vkey);
                Ok(())
            }
            None => {
                self.prune();
                self.local
                    .borrow_mut()
                    .remove(&key.addr())
                    .map(|_| ())
                    .ok_or_else(|| Error::not_found(&self.key_name))
            }
        }
    }

    fn write_through(&self, vkey: &str, value: &C::Value) -> Result<()> {
        let ground = self.codec.serialize(value)?;
        let text = serde_json::to_string(&ground)?;
        self.vatstore.set(vkey, &text);
        Ok(())
    }

    /// Drops local entries whose referent is gone.
    fn prune(&self) {
        let mut local = self.local.borrow_mut();
        let dead = local
            .iter()
            .filter(|(_, entry)| entry.object.strong_count() == 0)
            .map(|(addr, _)| *addr)
            .collect_vec();
        for addr in dead {
            local.remove(&addr);
        }
    }
}
