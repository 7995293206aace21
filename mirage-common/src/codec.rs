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

use std::{collections::BTreeMap, marker::PhantomData};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Error, Result};

/// The codec's ground form: JSON-compatible, string-encoded at the vatstore
/// boundary.
pub type Ground = serde_json::Value;

/// One virtual object's encoded state: property name to ground value.
///
/// A `BTreeMap` keeps the persisted key order deterministic.
pub type RawData = BTreeMap<String, Ground>;

/// Converts user property values to and from the ground form.
///
/// Codec calls may re-enter the manager (a value being encoded can touch
/// other virtual objects), so callers must not hold internal borrows across
/// them.
pub trait Codec: 'static {
    type Value: Clone + 'static;

    fn serialize(&self, value: &Self::Value) -> Result<Ground>;

    fn unserialize(&self, ground: &Ground) -> Result<Self::Value>;
}

/// Codec for any serde-representable property value type.
pub struct SerdeCodec<T> {
    _marker: PhantomData<T>,
}

impl<T> SerdeCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for SerdeCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Codec for SerdeCodec<T>
where
    T: Serialize + DeserializeOwned + Clone + 'static,
{
    type Value = T;

    fn serialize(&self, value: &T) -> Result<Ground> {
        serde_json::to_value(value).map_err(|e| Error::Codec {
            reason: e.to_string(),
        })
    }

    fn unserialize(&self, ground: &Ground) -> Result<T> {
        serde_json::from_value(ground.clone()).map_err(|e| Error::Codec {
            reason: e.to_string(),
        })
    }
}

/// Passthrough codec whose property values are raw JSON values.
pub type JsonCodec = SerdeCodec<Ground>;
