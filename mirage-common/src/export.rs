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

/// Allocates export ids for freshly declared kinds.
///
/// The host may supply its own allocator; the default numbers sequentially,
/// which keeps kind ids stable across a restart that re-declares kinds in the
/// same order.
pub trait ExportIdAllocator {
    fn allocate(&mut self) -> u64;
}

pub struct SequentialExports {
    next: u64,
}

impl SequentialExports {
    pub fn starting_at(next: u64) -> Self {
        Self { next }
    }
}

impl Default for SequentialExports {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl ExportIdAllocator for SequentialExports {
    fn allocate(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential() {
        let mut exports = SequentialExports::default();
        assert_eq!(exports.allocate(), 1);
        assert_eq!(exports.allocate(), 2);

        let mut offset = SequentialExports::starting_at(40);
        assert_eq!(offset.allocate(), 40);
    }
}
