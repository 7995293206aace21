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
    cell::{Cell, RefCell},
    collections::BTreeMap,
    marker::PhantomData,
    rc::Rc,
};

use mirage_cache::{InnerSelf, StateCache};
use mirage_common::{Codec, Error, ObjectRef, RawData, Result, SlotTable};
use tracing::trace;

/// Everything a kind needs to mint and reanimate instances.
pub(crate) struct KindEnv<C: Codec> {
    pub(crate) cache: Rc<StateCache>,
    pub(crate) codec: Rc<C>,
    pub(crate) slot_table: Rc<SlotTable>,
}

/// The mutable state record a kind's behavior holds.
///
/// While the kind's `initialize` runs, writes land in a plain staging map.
/// Once the instance commits, the same handle switches to accessor mode:
/// every access routes through the cache, rehydrating evicted state on
/// demand. Clones share the underlying record, so references retained from
/// `initialize` keep observing the live state.
pub struct State<C: Codec> {
    cell: Rc<StateCell<C>>,
}

impl<C: Codec> Clone for State<C> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

struct StateCell<C: Codec> {
    mode: RefCell<Mode<C>>,
}

enum Mode<C: Codec> {
    Staging {
        data: BTreeMap<String, C::Value>,
        initializing: bool,
    },
    Wrapped {
        inner: Rc<InnerSelf>,
        env: Rc<KindEnv<C>>,
    },
}

impl<C: Codec> State<C> {
    pub(crate) fn staging() -> Self {
        Self {
            cell: Rc::new(StateCell {
                mode: RefCell::new(Mode::Staging {
                    data: BTreeMap::new(),
                    initializing: true,
                }),
            }),
        }
    }

    pub(crate) fn wrapped(inner: Rc<InnerSelf>, env: Rc<KindEnv<C>>) -> Self {
        Self {
            cell: Rc::new(StateCell {
                mode: RefCell::new(Mode::Wrapped { inner, env }),
            }),
        }
    }

    pub fn get(&self, property: &str) -> Result<C::Value> {
        let (inner, env) = {
            let mode = self.cell.mode.borrow();
            match &*mode {
                Mode::Staging { data, .. } => {
                    return data.get(property).cloned().ok_or_else(|| unknown(property));
                }
                Mode::Wrapped { inner, env } => (inner.clone(), env.clone()),
            }
        };

        let inner = self.ensure_state(inner, &env)?;
        let ground = {
            let data = inner
                .data()
                .ok_or_else(|| Error::storage(format!("{} has no live state", inner.instance_key())))?;
            data.get(property).cloned().ok_or_else(|| unknown(property))?
        };
        // All borrows are released; decoding may re-enter the manager.
        env.codec.unserialize(&ground)
    }

    pub fn set(&self, property: &str, value: C::Value) -> Result<()> {
        let (inner, env) = {
            let mut mode = self.cell.mode.borrow_mut();
            match &mut *mode {
                Mode::Staging { data, .. } => {
                    data.insert(property.to_string(), value);
                    return Ok(());
                }
                Mode::Wrapped { inner, env } => (inner.clone(), env.clone()),
            }
        };

        // Encode before touching any state: a codec failure must leave the
        // prior value observable, and encoding itself may re-enter the
        // manager and evict this very entry.
        let ground = env.codec.serialize(&value)?;

        let inner = self.ensure_state(inner, &env)?;
        let known = inner
            .data()
            .map(|data| data.contains_key(property))
            .unwrap_or(false);
        if !known {
            return Err(unknown(property));
        }
        inner.put(property, ground);
        Ok(())
    }

    /// Rebinds to a live cache entry when the bound one was evicted.
    fn ensure_state(&self, inner: Rc<InnerSelf>, env: &Rc<KindEnv<C>>) -> Result<Rc<InnerSelf>> {
        if inner.is_resident() {
            return Ok(inner);
        }
        let fresh = env.cache.lookup(inner.instance_key())?;
        let mut mode = self.cell.mode.borrow_mut();
        if let Mode::Wrapped { inner: bound, .. } = &mut *mode {
            *bound = fresh.clone();
        }
        Ok(fresh)
    }

    pub(crate) fn finish_initializing(&self) {
        if let Mode::Staging { initializing, .. } = &mut *self.cell.mode.borrow_mut() {
            *initializing = false;
        }
    }

    /// Encodes every staged property, naming the first one that fails.
    pub(crate) fn serialize_staged(&self, codec: &C) -> Result<RawData> {
        let staged: Vec<(String, C::Value)> = {
            let mode = self.cell.mode.borrow();
            match &*mode {
                Mode::Staging { data, .. } => data
                    .iter()
                    .map(|(property, value)| (property.clone(), value.clone()))
                    .collect(),
                Mode::Wrapped { .. } => {
                    debug_assert!(false, "state already wrapped");
                    vec![]
                }
            }
        };

        let mut raw = RawData::new();
        for (property, value) in staged {
            let ground = codec
                .serialize(&value)
                .map_err(|e| Error::NonSerializable {
                    property: property.clone(),
                    reason: e.to_string(),
                })?;
            raw.insert(property, ground);
        }
        Ok(raw)
    }

    /// One-shot switch from staged plain values to accessor-backed state.
    pub(crate) fn wrap(&self, inner: Rc<InnerSelf>, env: Rc<KindEnv<C>>) -> Result<()> {
        let mut mode = self.cell.mode.borrow_mut();
        match &*mode {
            Mode::Staging {
                initializing: true, ..
            } => Err(Error::StillInitializing),
            _ => {
                debug_assert!(
                    matches!(&*mode, Mode::Staging { .. }),
                    "state already wrapped"
                );
                *mode = Mode::Wrapped { inner, env };
                Ok(())
            }
        }
    }
}

fn unknown(property: &str) -> Error {
    Error::UnknownProperty {
        property: property.to_string(),
    }
}

/// A kind's behavior over its state handle.
///
/// `initialize` runs exactly once per instance, right after minting; it never
/// runs again on reanimation.
pub trait Instance: 'static {
    type Args;

    fn initialize(&self, _args: Self::Args) -> Result<()> {
        Ok(())
    }
}

/// The user-facing handle to one virtual object instance.
///
/// Identity is stable for the life of the handle; the state underneath may be
/// evicted and rehydrated arbitrarily often.
pub struct Representative<C: Codec> {
    shared: Rc<ReprShared<C>>,
}

impl<C: Codec> Clone for Representative<C> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<C: Codec> std::fmt::Debug for Representative<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Representative")
            .field("instance_key", &self.shared.instance_key)
            .finish()
    }
}

struct ReprShared<C: Codec> {
    state: State<C>,
    body: Box<dyn Any>,
    instance_key: String,
}

impl<C: Codec> Representative<C> {
    fn create(
        state: State<C>,
        body: Box<dyn Any>,
        instance_key: String,
        slot_table: &SlotTable,
    ) -> Self {
        let rep = Self {
            shared: Rc::new(ReprShared {
                state,
                body,
                instance_key,
            }),
        };
        slot_table.set(&rep.object_ref(), &rep.shared.instance_key);
        rep
    }

    /// The durable reference for this instance.
    pub fn vref(&self) -> String {
        self.shared.instance_key.clone()
    }

    pub fn get(&self, property: &str) -> Result<C::Value> {
        self.shared.state.get(property)
    }

    pub fn set(&self, property: &str, value: C::Value) -> Result<()> {
        self.shared.state.set(property, value)
    }

    pub fn state(&self) -> State<C> {
        self.shared.state.clone()
    }

    /// The kind-defined behavior, recovered by type.
    pub fn body<B: Instance>(&self) -> Option<&B> {
        self.shared.body.downcast_ref::<B>()
    }

    /// Identity handle for slot-table and weak-store keying.
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::from_dyn(self.shared.clone())
    }
}

struct KindShared<C: Codec, F> {
    kind_id: u64,
    next_instance_id: Cell<u64>,
    env: Rc<KindEnv<C>>,
    instance_maker: Rc<F>,
}

/// A declared family of instances sharing one behavior and state schema.
pub struct Kind<C: Codec, B, F>
where
    F: Fn(State<C>) -> B,
{
    shared: Rc<KindShared<C, F>>,
    _marker: PhantomData<B>,
}

impl<C: Codec, B, F> Clone for Kind<C, B, F>
where
    F: Fn(State<C>) -> B,
{
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            _marker: PhantomData,
        }
    }
}

impl<C, B, F> Kind<C, B, F>
where
    C: Codec,
    B: Instance,
    F: Fn(State<C>) -> B + 'static,
{
    pub(crate) fn new(kind_id: u64, env: Rc<KindEnv<C>>, instance_maker: Rc<F>) -> Self {
        Self {
            shared: Rc::new(KindShared {
                kind_id,
                next_instance_id: Cell::new(1),
                env,
                instance_maker,
            }),
            _marker: PhantomData,
        }
    }

    pub fn kind_id(&self) -> u64 {
        self.shared.kind_id
    }

    /// Mints a fresh instance: runs the behavior's `initialize` against a
    /// staging record, commits the encoded result to the cache, and hands
    /// back the representative.
    pub fn make_new_instance(&self, args: B::Args) -> Result<Representative<C>> {
        let shared = &self.shared;
        let seq = shared.next_instance_id.get();
        shared.next_instance_id.set(seq + 1);
        let instance_key = format!("o+{}/{}", shared.kind_id, seq);
        trace!(key = %instance_key, "mint");

        let state = State::staging();
        let inner = Rc::new(InnerSelf::initializing(instance_key.clone()));
        let body = (shared.instance_maker)(state.clone());

        let minted = Self::mint(shared, &state, &inner, &body, args);
        if minted.is_err() {
            // Nothing half-built may survive to be flushed later.
            shared.env.cache.discard(&instance_key);
        }
        minted?;

        Ok(Representative::create(
            state,
            Box::new(body),
            instance_key,
            &shared.env.slot_table,
        ))
    }

    fn mint(
        shared: &KindShared<C, F>,
        state: &State<C>,
        inner: &Rc<InnerSelf>,
        body: &B,
        args: B::Args,
    ) -> Result<()> {
        // The initializing tag shields the entry from eviction while user
        // code runs; instances minted inside `initialize` can churn the
        // cache freely.
        shared.env.cache.remember(inner)?;
        body.initialize(args)?;
        state.finish_initializing();

        let raw = state.serialize_staged(shared.env.codec.as_ref())?;
        inner.commit(raw);
        state.wrap(inner.clone(), shared.env.clone())
    }
}

/// Rebuilds a representative for an existing instance from its durable state.
pub(crate) fn reanimate<C, B, F>(
    env: &Rc<KindEnv<C>>,
    instance_maker: &Rc<F>,
    vref: &str,
) -> Result<Representative<C>>
where
    C: Codec,
    B: Instance,
    F: Fn(State<C>) -> B + 'static,
{
    let inner = env.cache.lookup(vref)?;
    let state = State::wrapped(inner.clone(), env.clone());
    let body = (instance_maker)(state.clone());
    env.cache.remember(&inner)?;
    Ok(Representative::create(
        state,
        Box::new(body),
        vref.to_string(),
        &env.slot_table,
    ))
}
