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

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotType {
    Object,
    Promise,
    Device,
}

/// A parsed vat-slot reference.
///
/// Grammar: a type character (`o`, `p`, `d`), an allocation sign (`+` for
/// exported, `-` for imported), a decimal id, and an optional `/<subid>`.
/// An exported object slot with a subid refers to a virtual object instance;
/// its id is the kind id and its subid the instance sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSlot {
    pub slot_type: SlotType,
    pub exported: bool,
    pub id: u64,
    pub subid: Option<u64>,
    pub virtual_obj: bool,
}

pub fn parse_slot(slot: &str) -> Result<ParsedSlot> {
    let malformed = || Error::MalformedSlot {
        slot: slot.to_string(),
    };

    let mut chars = slot.chars();
    let slot_type = match chars.next() {
        Some('o') => SlotType::Object,
        Some('p') => SlotType::Promise,
        Some('d') => SlotType::Device,
        _ => return Err(malformed()),
    };
    let exported = match chars.next() {
        Some('+') => true,
        Some('-') => false,
        _ => return Err(malformed()),
    };

    let rest = chars.as_str();
    let (id_text, subid_text) = match rest.split_once('/') {
        Some((id, subid)) => (id, Some(subid)),
        None => (rest, None),
    };

    let id = id_text.parse::<u64>().map_err(|_| malformed())?;
    let subid = subid_text
        .map(|s| s.parse::<u64>().map_err(|_| malformed()))
        .transpose()?;

    let virtual_obj = slot_type == SlotType::Object && exported && subid.is_some();

    Ok(ParsedSlot {
        slot_type,
        exported,
        id,
        subid,
        virtual_obj,
    })
}
