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
    cell::{Cell, RefCell},
    rc::Rc,
};

use hashbrown::HashMap;
use mirage_cache::{Backing, StateCache};
use mirage_common::{
    parse_slot, Codec, Error, ExportIdAllocator, RawData, Result, SequentialExports, SlotTable,
    Vatstore,
};
use tracing::debug;

use crate::kind::{reanimate, Instance, Kind, KindEnv, Representative, State};
use crate::weak_store::WeakStore;

pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Reads and writes instance state as JSON text in the vatstore.
struct VatstoreBacking {
    vatstore: Rc<dyn Vatstore>,
}

impl Backing for VatstoreBacking {
    fn fetch(&self, instance_key: &str) -> Result<RawData> {
        let text = self
            .vatstore
            .get(instance_key)
            .ok_or_else(|| Error::storage(format!("no state under {instance_key}")))?;
        Ok(serde_json::from_str(&text)?)
    }

    fn store(&self, instance_key: &str, data: &RawData) -> Result<()> {
        let text = serde_json::to_string(data)?;
        self.vatstore.set(instance_key, &text);
        Ok(())
    }
}

type Reanimator<C> = Rc<dyn Fn(&str) -> Result<Representative<C>>>;

struct ManagerShared<C: Codec> {
    env: Rc<KindEnv<C>>,
    vatstore: Rc<dyn Vatstore>,
    registry: RefCell<HashMap<u64, Reanimator<C>>>,
    exports: RefCell<Box<dyn ExportIdAllocator>>,
    next_store_id: Cell<u64>,
}

/// Builder for a [`VirtualObjectManager`].
pub struct VomBuilder<C: Codec> {
    vatstore: Rc<dyn Vatstore>,
    codec: C,
    cache_capacity: usize,
    exports: Box<dyn ExportIdAllocator>,
}

impl<C: Codec> VomBuilder<C> {
    pub fn new<V: Vatstore + 'static>(vatstore: Rc<V>, codec: C) -> Self {
        Self {
            vatstore,
            codec,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            exports: Box::new(SequentialExports::default()),
        }
    }

    /// Caps how many instances hold live state at once.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Plugs in the host's export-id allocator.
    pub fn with_export_allocator(mut self, exports: impl ExportIdAllocator + 'static) -> Self {
        self.exports = Box::new(exports);
        self
    }

    pub fn build(self) -> VirtualObjectManager<C> {
        let backing = VatstoreBacking {
            vatstore: self.vatstore.clone(),
        };
        let env = Rc::new(KindEnv {
            cache: Rc::new(StateCache::new(self.cache_capacity, backing)),
            codec: Rc::new(self.codec),
            slot_table: Rc::new(SlotTable::new()),
        });
        VirtualObjectManager {
            shared: Rc::new(ManagerShared {
                env,
                vatstore: self.vatstore,
                registry: RefCell::new(HashMap::new()),
                exports: RefCell::new(self.exports),
                next_store_id: Cell::new(1),
            }),
        }
    }
}

/// The facade over kinds, representatives, the state cache, and weak stores.
pub struct VirtualObjectManager<C: Codec> {
    shared: Rc<ManagerShared<C>>,
}

impl<C: Codec> Clone for VirtualObjectManager<C> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<C: Codec> VirtualObjectManager<C> {
    /// Declares a kind: allocates its id and registers its reanimator.
    pub fn make_kind<B, F>(&self, instance_maker: F) -> Kind<C, B, F>
    where
        B: Instance,
        F: Fn(State<C>) -> B + 'static,
    {
        let kind_id = self.shared.exports.borrow_mut().allocate();
        debug!(kind_id, "declare kind");

        let instance_maker = Rc::new(instance_maker);
        let reanimator: Reanimator<C> = Rc::new({
            let env = self.shared.env.clone();
            let instance_maker = instance_maker.clone();
            move |vref: &str| reanimate::<C, B, F>(&env, &instance_maker, vref)
        });
        self.shared
            .registry
            .borrow_mut()
            .insert(kind_id, reanimator);

        Kind::new(kind_id, self.shared.env.clone(), instance_maker)
    }

    /// Rebuilds a representative for an existing instance.
    pub fn make_representative(&self, vref: &str) -> Result<Representative<C>> {
        let parsed = parse_slot(vref)?;
        if !parsed.virtual_obj {
            return Err(Error::UnknownKind {
                vref: vref.to_string(),
            });
        }
        let reanimator = self
            .shared
            .registry
            .borrow()
            .get(&parsed.id)
            .cloned()
            .ok_or_else(|| Error::UnknownKind {
                vref: vref.to_string(),
            })?;
        // The registry borrow is released; reanimation runs user code.
        reanimator(vref)
    }

    /// Opens a fresh weak store; `key_name` tags its error messages.
    pub fn make_weak_store(&self, key_name: &str) -> WeakStore<C> {
        let store_id = self.shared.next_store_id.get();
        self.shared.next_store_id.set(store_id + 1);
        WeakStore::new(
            store_id,
            key_name,
            self.shared.vatstore.clone(),
            self.shared.env.codec.clone(),
            self.shared.env.slot_table.clone(),
        )
    }

    /// Writes every resident entry out to the vatstore.
    pub fn flush_cache(&self) -> Result<()> {
        self.shared.env.cache.flush()
    }

    /// How many instances currently hold live state.
    pub fn resident_count(&self) -> usize {
        self.shared.env.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use mirage_common::MemVatstore;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_backing_round_trip() {
        let vatstore = Rc::new(MemVatstore::new());
        let backing = VatstoreBacking {
            vatstore: vatstore.clone(),
        };

        let data: RawData = [("count".to_string(), json!(7))].into_iter().collect();
        backing.store("o+1/1", &data).unwrap();
        assert_eq!(vatstore.get("o+1/1"), Some("{\"count\":7}".to_string()));
        assert_eq!(backing.fetch("o+1/1").unwrap(), data);
    }

    #[test]
    fn test_backing_misses_surface_as_storage_errors() {
        let backing = VatstoreBacking {
            vatstore: Rc::new(MemVatstore::new()),
        };
        assert!(matches!(
            backing.fetch("o+1/404"),
            Err(Error::Storage { .. })
        ));
    }
}
