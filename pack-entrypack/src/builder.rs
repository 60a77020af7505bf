// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use pack_common::Result;
use pack_model::{ModuleEntry, SourceLocation};

use crate::pack::{write_pack, EntryPack, PackStrategy};

static NEXT_BUILDER_ID: AtomicU64 = AtomicU64::new(0);

/// Opaque identifier for one `add`ed entry. The first field is unique
/// per `EntryPackBuilder` instance (not per `prefix`), so handles
/// minted by two different builders never collide once their packs
/// are merged — which is what lets §4.D build a compressed and an
/// uncompressed sub-pack independently and merge them into one
/// `EntryPack` addressable by either builder's handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryHandle(u64, u64);

/// The "open" half of an entry pack: stages payloads in memory and
/// dedupes by source location, per spec §4.B `add`. Closed by
/// [EntryPackBuilder::pack], after which the mapping is immutable.
pub struct EntryPackBuilder {
    prefix: String,
    builder_id: u64,
    next_counter: u64,
    next_handle: u64,
    staged: Vec<(String, Vec<u8>)>,
    by_source: HashMap<SourceLocation, String>,
    handle_to_name: HashMap<EntryHandle, String>
}

impl EntryPackBuilder {
    /// `prefix` must be disjoint from any other pack this one might
    /// later be merged with (spec §4.B `merge` precondition).
    pub fn new(prefix: impl Into<String>) -> EntryPackBuilder {
        EntryPackBuilder {
            prefix: prefix.into(),
            builder_id: NEXT_BUILDER_ID.fetch_add(1, Ordering::Relaxed),
            next_counter: 0,
            next_handle: 0,
            staged: Vec::new(),
            by_source: HashMap::new(),
            handle_to_name: HashMap::new()
        }
    }

    /// Reads `entry`'s payload (unless it shares a source location
    /// with a previously added entry, in which case the existing
    /// internal name is reused) and returns a handle resolvable to it
    /// once the pack is closed.
    pub fn add(&mut self, entry: &ModuleEntry) -> Result<EntryHandle> {
        let name = match entry.content.source_location() {
            Some(location) => match self.by_source.get(&location) {
                Some(existing) => existing.clone(),
                None => {
                    let name = self.mint_name();
                    self.staged.push((name.clone(), entry.read()?));
                    self.by_source.insert(location, name.clone());
                    name
                }
            },
            None => {
                let name = self.mint_name();
                self.staged.push((name.clone(), entry.read()?));
                name
            }
        };

        let handle = EntryHandle(self.builder_id, self.next_handle);
        self.next_handle += 1;
        self.handle_to_name.insert(handle, name);
        Ok(handle)
    }

    fn mint_name(&mut self) -> String {
        let name = format!("{}{}", self.prefix, self.next_counter);
        self.next_counter += 1;
        name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Closes the pack by writing every staged payload to `output_path`
    /// using `strategy`. `output_path` must not already exist.
    pub fn pack(self, strategy: PackStrategy, output_path: impl Into<PathBuf>) -> Result<EntryPack> {
        write_pack(self.prefix, self.staged, self.handle_to_name, strategy, output_path.into())
    }
}
