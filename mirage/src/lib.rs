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

//! mirage - virtual object manager for Rust.
//!
//! Projects an unbounded population of long-lived objects onto a bounded
//! in-memory working set, with everything else durably resident in an
//! external key-value vatstore.

pub mod kind;
pub mod manager;
pub mod prelude;
pub mod weak_store;

pub use kind::{Instance, Kind, Representative, State};
pub use manager::{VirtualObjectManager, VomBuilder, DEFAULT_CACHE_CAPACITY};
pub use weak_store::WeakStore;
