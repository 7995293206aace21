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

pub use crate::{
    kind::{Instance, Kind, Representative, State},
    manager::{VirtualObjectManager, VomBuilder, DEFAULT_CACHE_CAPACITY},
    weak_store::WeakStore,
};
pub use mirage_common::{
    parse_slot, Codec, Error, ExportIdAllocator, Ground, JsonCodec, MemVatstore, ObjectRef,
    ParsedSlot, RawData, Result, SequentialExports, SerdeCodec, SlotTable, SlotType, Vatstore,
};
