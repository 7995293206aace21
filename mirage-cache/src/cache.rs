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

use ahash::RandomState;
use hashbrown::HashMap;
use mirage_common::{Error, RawData, Result};
use tracing::{debug, trace};

use crate::inner::InnerSelf;

/// Two-sided storage hook for the cache: fetch on miss, store on eviction.
///
/// Implementations must not call back into the cache.
pub trait Backing {
    fn fetch(&self, instance_key: &str) -> Result<RawData>;

    fn store(&self, instance_key: &str, data: &RawData) -> Result<()>;
}

struct Node {
    inner: Rc<InnerSelf>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Index-linked LRU list over a dense node arena.
#[derive(Default)]
struct Lru {
    index: HashMap<String, usize, RandomState>,
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    /// Most recently used.
    head: Option<usize>,
    /// Least recently used, the eviction candidate.
    tail: Option<usize>,
}

impl Lru {
    fn len(&self) -> usize {
        self.index.len()
    }

    fn node(&self, idx: usize) -> &Node {
        self.nodes[idx].as_ref().unwrap()
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node {
        self.nodes[idx].as_mut().unwrap()
    }

    fn link_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let node = self.node_mut(idx);
            node.prev = None;
            node.next = old_head;
        }
        if let Some(old) = old_head {
            self.node_mut(old).prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.node(idx);
            (node.prev, node.next)
        };

        match prev {
            Some(prev) => self.node_mut(prev).next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.node_mut(next).prev = prev,
            None => self.tail = prev,
        }
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.link_front(idx);
    }

    fn insert(&mut self, inner: Rc<InnerSelf>) {
        let key = inner.instance_key().to_string();
        let node = Node {
            inner,
            prev: None,
            next: None,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = Some(node);
                idx
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        self.index.insert(key, idx);
        self.link_front(idx);
    }

    fn remove(&mut self, idx: usize) -> Rc<InnerSelf> {
        self.unlink(idx);
        let node = self.nodes[idx].take().unwrap();
        self.free.push(idx);
        self.index.remove(node.inner.instance_key());
        node.inner
    }

    #[cfg(feature = "strict_assertions")]
    fn check(&self) {
        let mut walked = 0;
        let mut cursor = self.head;
        let mut prev = None;
        while let Some(idx) = cursor {
            let node = self.node(idx);
            assert_eq!(node.prev, prev, "broken back link at {idx}");
            assert_eq!(
                self.index.get(node.inner.instance_key()),
                Some(&idx),
                "index out of sync at {idx}"
            );
            walked += 1;
            prev = Some(idx);
            cursor = node.next;
        }
        assert_eq!(self.tail, prev, "tail out of sync");
        assert_eq!(walked, self.index.len(), "list and index disagree");
    }

    #[cfg(not(feature = "strict_assertions"))]
    fn check(&self) {}

    /// Instance keys from MRU to LRU.
    #[cfg(test)]
    fn dump(&self) -> Vec<String> {
        let mut keys = vec![];
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let node = self.node(idx);
            keys.push(node.inner.instance_key().to_string());
            cursor = node.next;
        }
        keys
    }
}

/// Bounded LRU over inner selves.
///
/// Misses fetch through the [`Backing`]; evictions store through it. Entries
/// tagged initializing are rotated past the eviction window instead of being
/// written out half-built.
pub struct StateCache {
    capacity: Cell<usize>,
    backing: Box<dyn Backing>,
    lru: RefCell<Lru>,
}

impl StateCache {
    pub fn new(capacity: usize, backing: impl Backing + 'static) -> Self {
        Self {
            capacity: Cell::new(capacity),
            backing: Box::new(backing),
            lru: RefCell::new(Lru::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn len(&self) -> usize {
        self.lru.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, instance_key: &str) -> bool {
        self.lru.borrow().index.contains_key(instance_key)
    }

    /// Returns the live entry for `instance_key`, fetching it from the
    /// backing if it is not resident. The entry ends up most recently used.
    pub fn lookup(&self, instance_key: &str) -> Result<Rc<InnerSelf>> {
        {
            let mut lru = self.lru.borrow_mut();
            if let Some(&idx) = lru.index.get(instance_key) {
                lru.move_to_front(idx);
                lru.check();
                return Ok(lru.node(idx).inner.clone());
            }
        }

        trace!(key = instance_key, "fetch");
        let data = self.backing.fetch(instance_key)?;
        let inner = Rc::new(InnerSelf::resident(instance_key, data));
        self.remember(&inner)?;
        Ok(inner)
    }

    /// Ensures `inner` is cached, inserting it most recently used and then
    /// shedding down to capacity. Present entries are left untouched.
    pub fn remember(&self, inner: &Rc<InnerSelf>) -> Result<()> {
        {
            let mut lru = self.lru.borrow_mut();
            if lru.index.contains_key(inner.instance_key()) {
                return Ok(());
            }
            lru.insert(inner.clone());
            lru.check();
        }
        self.make_room()
    }

    /// Moves `inner` to most recently used; no-op when absent or already
    /// there.
    pub fn refresh(&self, inner: &InnerSelf) {
        let mut lru = self.lru.borrow_mut();
        if let Some(&idx) = lru.index.get(inner.instance_key()) {
            lru.move_to_front(idx);
        }
    }

    /// Evicts from the tail until the cache fits its capacity.
    ///
    /// Initializing tails are rotated to the front instead of evicted; if the
    /// rotations ever exceed the capacity, every slot is occupied by an
    /// in-progress initialization and the caller has overflowed the cache.
    pub fn make_room(&self) -> Result<()> {
        let mut rotations = 0usize;
        loop {
            let victim = {
                let mut lru = self.lru.borrow_mut();
                if lru.len() <= self.capacity.get() {
                    break;
                }
                let Some(tail) = lru.tail else { break };
                if lru.node(tail).inner.is_initializing() {
                    rotations += 1;
                    if rotations > self.capacity.get() {
                        return Err(Error::CacheOverflow);
                    }
                    lru.move_to_front(tail);
                    continue;
                }
                let victim = lru.remove(tail);
                lru.check();
                victim
            };

            // The borrow is released before the store hook runs.
            match victim.detach() {
                Some(data) => {
                    trace!(key = victim.instance_key(), "evict");
                    self.backing.store(victim.instance_key(), &data)?;
                }
                None => debug_assert!(false, "evicted entry had no data"),
            }
        }
        Ok(())
    }

    /// Writes every resident entry out to the backing and empties the cache.
    pub fn flush(&self) -> Result<()> {
        debug!("flush");
        let capacity = self.capacity.replace(0);
        let result = self.make_room();
        self.capacity.set(capacity);
        result
    }

    /// Drops an entry without storing it. Used when minting fails partway,
    /// so a broken entry can never reach the backing.
    pub fn discard(&self, instance_key: &str) {
        let mut lru = self.lru.borrow_mut();
        if let Some(&idx) = lru.index.get(instance_key) {
            lru.remove(idx);
            lru.check();
        }
    }

    /// Instance keys from MRU to LRU.
    #[cfg(test)]
    pub(crate) fn dump(&self) -> Vec<String> {
        self.lru.borrow().dump()
    }
}
