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

use std::rc::Rc;

use mirage::prelude::*;
use serde_json::json;

struct Counter {
    state: State<JsonCodec>,
}

impl Instance for Counter {
    type Args = i64;

    fn initialize(&self, n: i64) -> Result<()> {
        self.state.set("count", json!(n))
    }
}

/// One manager over the given vatstore, with the same declaration order every
/// time, the way a restarted host would rebuild itself.
fn build_vom(
    vatstore: &Rc<MemVatstore>,
) -> (
    VirtualObjectManager<JsonCodec>,
    Kind<JsonCodec, Counter, impl Fn(State<JsonCodec>) -> Counter>,
    WeakStore<JsonCodec>,
) {
    let vom = VomBuilder::new(vatstore.clone(), JsonCodec::new())
        .with_cache_capacity(2)
        .build();
    let kind = vom.make_kind(|state| Counter { state });
    let store = vom.make_weak_store("key");
    (vom, kind, store)
}

#[test_log::test]
fn test_virtual_keys_persist_plain_keys_do_not() {
    let vatstore = Rc::new(MemVatstore::new());
    let (vom, kind, store) = build_vom(&vatstore);

    let rep = kind.make_new_instance(1).unwrap();
    store.init(&rep.object_ref(), json!("durable")).unwrap();

    let plain = ObjectRef::new(Rc::new("plain"));
    store.init(&plain, json!("ephemeral")).unwrap();

    assert_eq!(store.get(&rep.object_ref()).unwrap(), json!("durable"));
    assert_eq!(store.get(&plain).unwrap(), json!("ephemeral"));

    // Only the virtual binding reached the vatstore.
    assert_eq!(vatstore.get("ws1.o+1/1"), Some("\"durable\"".to_string()));
    let ws_entries = vatstore
        .dump()
        .into_keys()
        .filter(|key| key.starts_with("ws"))
        .count();
    assert_eq!(ws_entries, 1);

    vom.flush_cache().unwrap();

    // Restart: rebuild the manager over the same vatstore.
    let (vom2, kind2, store2) = build_vom(&vatstore);
    assert_eq!(kind2.kind_id(), kind.kind_id());
    assert_eq!(store2.store_id(), store.store_id());

    let rep2 = vom2.make_representative("o+1/1").unwrap();
    assert_eq!(rep2.get("count").unwrap(), json!(1));
    assert!(store2.has(&rep2.object_ref()));
    assert_eq!(store2.get(&rep2.object_ref()).unwrap(), json!("durable"));

    // The weakly held binding did not survive.
    let plain2 = ObjectRef::new(Rc::new("plain"));
    assert!(!store2.has(&plain2));
}

#[test]
fn test_same_vref_is_the_same_key() {
    let vatstore = Rc::new(MemVatstore::new());
    let (vom, kind, store) = build_vom(&vatstore);

    let rep = kind.make_new_instance(1).unwrap();
    let first = vom.make_representative(&rep.vref()).unwrap();
    let second = vom.make_representative(&rep.vref()).unwrap();
    assert_eq!(first.vref(), second.vref());

    // Distinct handles, one binding.
    store.init(&first.object_ref(), json!(10)).unwrap();
    assert!(store.has(&second.object_ref()));
    assert_eq!(store.get(&second.object_ref()).unwrap(), json!(10));
    assert!(matches!(
        store.init(&second.object_ref(), json!(11)),
        Err(Error::AlreadyRegistered { .. })
    ));

    store.set(&second.object_ref(), json!(12)).unwrap();
    assert_eq!(store.get(&first.object_ref()).unwrap(), json!(12));
}

#[test]
fn test_set_requires_init() {
    let vatstore = Rc::new(MemVatstore::new());
    let (_vom, kind, store) = build_vom(&vatstore);

    let rep = kind.make_new_instance(1).unwrap();
    assert!(matches!(
        store.set(&rep.object_ref(), json!(1)),
        Err(Error::NotFound { .. })
    ));
    store.init(&rep.object_ref(), json!(1)).unwrap();
    store.set(&rep.object_ref(), json!(2)).unwrap();
    assert_eq!(store.get(&rep.object_ref()).unwrap(), json!(2));
}

#[test]
fn test_delete_tombstones_virtual_bindings() {
    let vatstore = Rc::new(MemVatstore::new());
    let (_vom, kind, store) = build_vom(&vatstore);

    let rep = kind.make_new_instance(1).unwrap();
    store.init(&rep.object_ref(), json!(1)).unwrap();
    store.delete(&rep.object_ref()).unwrap();

    // Gone for readers, still marked deleted at rest.
    assert!(!store.has(&rep.object_ref()));
    assert!(matches!(
        store.get(&rep.object_ref()),
        Err(Error::NotFound { .. })
    ));
    assert!(vatstore.is_tombstone("ws1.o+1/1"));
    assert!(matches!(
        store.delete(&rep.object_ref()),
        Err(Error::NotFound { .. })
    ));
}

#[test]
fn test_stores_are_independent() {
    let vatstore = Rc::new(MemVatstore::new());
    let (vom, kind, first) = build_vom(&vatstore);
    let second = vom.make_weak_store("entry");

    assert_eq!(first.store_id(), 1);
    assert_eq!(second.store_id(), 2);

    let rep = kind.make_new_instance(1).unwrap();
    first.init(&rep.object_ref(), json!("a")).unwrap();
    assert!(!second.has(&rep.object_ref()));

    second.init(&rep.object_ref(), json!("b")).unwrap();
    assert_eq!(first.get(&rep.object_ref()).unwrap(), json!("a"));
    assert_eq!(second.get(&rep.object_ref()).unwrap(), json!("b"));

    assert!(vatstore.get("ws1.o+1/1").is_some());
    assert!(vatstore.get("ws2.o+1/1").is_some());
}
