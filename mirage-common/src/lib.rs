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

pub mod codec;
pub mod error;
pub mod export;
pub mod object;
pub mod slot;
pub mod vatstore;

pub use codec::{Codec, Ground, JsonCodec, RawData, SerdeCodec};
pub use error::{Error, Result};
pub use export::{ExportIdAllocator, SequentialExports};
pub use object::{ObjectRef, SlotTable};
pub use slot::{parse_slot, ParsedSlot, SlotType};
pub use vatstore::{MemVatstore, Vatstore};
