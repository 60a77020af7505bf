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

//! Decides, per entry, whether its payload is worth deflating, and
//! produces the single merged [pack_entrypack::EntryPack] the writer
//! (spec §4.E) selects every final payload from (spec §4.D).

mod policy;

pub use policy::apply_force_uncompressed_policy;

use std::collections::HashMap;
use std::path::Path;

use pack_common::Result;
use pack_entrypack::{EntryHandle, EntryPack, EntryPackBuilder, PackStrategy};
use pack_model::ModuleEntry;
use pack_zip::{ArchiveReader, CompressionMethod};

/// One entry's resolved payload location and final compression method.
pub struct ResolvedEntry {
    pub path: String,
    pub handle: EntryHandle,
    pub method: CompressionMethod
}

pub struct CompressionDecision {
    pub pack: EntryPack,
    pub entries: Vec<ResolvedEntry>
}

enum Placement {
    Forced(EntryHandle),
    Candidate { is_resource: bool, handle: EntryHandle }
}

fn is_resource(entry: &ModuleEntry) -> bool {
    pack_common::rewrite_entry_path(&entry.path).starts_with("res/")
}

/// Runs the spec §4.D decision procedure over `entries`: stages
/// candidates into a resources-level-9 / everything-else-level-6
/// compressed pack (built as two sub-packs in parallel on `pool`, then
/// merged), compares each candidate's compressed size against its
/// uncompressed size, and folds `forceUncompressed` entries plus
/// compression losers into a stored pack merged on top.
///
/// Zero-byte entries are never special-cased: deflating an empty
/// payload never produces a strictly smaller (or, for `res/`, 10%
/// smaller) result, so the materially-smaller tests below already
/// reject them.
pub fn decide(entries: Vec<ModuleEntry>, pool: &rayon::ThreadPool, workdir: &Path) -> Result<CompressionDecision> {
    let mut resource_builder = EntryPackBuilder::new("kr");
    let mut other_builder = EntryPackBuilder::new("ko");
    let mut stored_builder = EntryPackBuilder::new("u");

    let mut placements = Vec::with_capacity(entries.len());
    for entry in &entries {
        let placement = if entry.force_uncompressed {
            Placement::Forced(stored_builder.add(entry)?)
        } else if is_resource(entry) {
            Placement::Candidate { is_resource: true, handle: resource_builder.add(entry)? }
        } else {
            Placement::Candidate { is_resource: false, handle: other_builder.add(entry)? }
        };
        placements.push(placement);
    }

    let resource_pack_path = workdir.join("compress-resources.zip");
    let other_pack_path = workdir.join("compress-other.zip");
    let (resource_pack, other_pack) = pool.install(|| {
        rayon::join(
            || resource_builder.pack(PackStrategy::Deflate { level: 9 }, resource_pack_path),
            || other_builder.pack(PackStrategy::Deflate { level: 6 }, other_pack_path)
        )
    });
    let mut compressed_pack = resource_pack?;
    compressed_pack.merge(other_pack?)?;

    let candidate_handles: Vec<EntryHandle> = placements
        .iter()
        .filter_map(|placement| match placement {
            Placement::Candidate { handle, .. } => Some(*handle),
            Placement::Forced(_) => None
        })
        .collect();

    let selected = compressed_pack.select(&candidate_handles, |_| String::new(), |_| 1)?;
    let reader = ArchiveReader::open(compressed_pack.path())?;
    let sizes_by_name: HashMap<&str, (u64, u64)> = reader
        .entries()
        .iter()
        .map(|e| (e.name.as_str(), (e.compressed_size, e.uncompressed_size)))
        .collect();

    let mut handle_sizes: HashMap<EntryHandle, (u64, u64)> = HashMap::with_capacity(candidate_handles.len());
    for (handle, selected_entry) in candidate_handles.iter().zip(selected.entries.iter()) {
        handle_sizes.insert(*handle, sizes_by_name[selected_entry.original_name.as_str()]);
    }

    let mut resolved: Vec<Option<ResolvedEntry>> = (0..entries.len()).map(|_| None).collect();
    for (index, placement) in placements.into_iter().enumerate() {
        resolved[index] = Some(match placement {
            Placement::Forced(handle) => ResolvedEntry { path: entries[index].path.clone(), handle, method: CompressionMethod::Stored },
            Placement::Candidate { is_resource, handle } => {
                let (compressed, uncompressed) = handle_sizes[&handle];
                let materially_smaller = if is_resource {
                    compressed + compressed / 10 <= uncompressed
                } else {
                    compressed < uncompressed
                };
                if materially_smaller {
                    ResolvedEntry { path: entries[index].path.clone(), handle, method: CompressionMethod::Deflated }
                } else {
                    let stored_handle = stored_builder.add(&entries[index])?;
                    ResolvedEntry { path: entries[index].path.clone(), handle: stored_handle, method: CompressionMethod::Stored }
                }
            }
        });
    }

    let stored_pack = stored_builder.pack(PackStrategy::Uncompressed, workdir.join("compress-stored.zip"))?;
    compressed_pack.merge(stored_pack)?;

    Ok(CompressionDecision {
        pack: compressed_pack,
        entries: resolved.into_iter().map(|entry| entry.expect("every placement resolves to exactly one entry")).collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pack_model::ContentSource;
    use tempfile::tempdir;

    fn pool() -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    #[test]
    fn forced_uncompressed_entry_is_stored() {
        let dir = tempdir().unwrap();
        let entries = vec![ModuleEntry::new("lib/arm64-v8a/libfoo.so", ContentSource::memory(vec![7; 4096])).with_force_uncompressed(true)];
        let decision = decide(entries, &pool(), dir.path()).unwrap();
        assert_eq!(decision.entries.len(), 1);
        assert!(matches!(decision.entries[0].method, CompressionMethod::Stored));
    }

    #[test]
    fn highly_compressible_candidate_stays_compressed() {
        let dir = tempdir().unwrap();
        let payload = vec![b'a'; 8192];
        let entries = vec![ModuleEntry::new("classes.dex", ContentSource::memory(payload))];
        let decision = decide(entries, &pool(), dir.path()).unwrap();
        assert!(matches!(decision.entries[0].method, CompressionMethod::Deflated));
    }

    #[test]
    fn incompressible_candidate_falls_back_to_stored() {
        // Pseudo-random bytes deflate to roughly their own size (plus
        // header overhead), so neither materially-smaller test passes.
        let dir = tempdir().unwrap();
        let mut payload = Vec::with_capacity(4096);
        let mut state: u32 = 0x9E3779B9;
        for _ in 0..4096 {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            payload.push((state & 0xFF) as u8);
        }
        let entries = vec![ModuleEntry::new("assets/blob.bin", ContentSource::memory(payload))];
        let decision = decide(entries, &pool(), dir.path()).unwrap();
        assert!(matches!(decision.entries[0].method, CompressionMethod::Stored));
    }

    #[test]
    fn resource_entries_require_a_ten_percent_margin() {
        // A payload compressible just enough to beat the plain "strict
        // savings" rule but not the res/ 10% margin should still store.
        let dir = tempdir().unwrap();
        let mut payload = Vec::with_capacity(2048);
        for i in 0..2048u32 {
            payload.push((i % 251) as u8);
        }
        let entries = vec![ModuleEntry::new("res/raw/near_incompressible.bin", ContentSource::memory(payload.clone()))];
        let res_decision = decide(entries, &pool(), dir.path()).unwrap();

        let other_dir = tempdir().unwrap();
        let other_entries = vec![ModuleEntry::new("assets/near_incompressible.bin", ContentSource::memory(payload))];
        let other_decision = decide(other_entries, &pool(), other_dir.path()).unwrap();

        // Whichever of the two methods each lands on, the res/ entry
        // is never compressed unless the non-res/ entry is too, since
        // the res/ rule is strictly stricter for the same bytes.
        if matches!(res_decision.entries[0].method, CompressionMethod::Deflated) {
            assert!(matches!(other_decision.entries[0].method, CompressionMethod::Deflated));
        }
    }

    #[test]
    fn zero_byte_entry_is_stored() {
        let dir = tempdir().unwrap();
        let entries = vec![ModuleEntry::new("res/raw/empty.bin", ContentSource::memory(vec![]))];
        let decision = decide(entries, &pool(), dir.path()).unwrap();
        assert!(matches!(decision.entries[0].method, CompressionMethod::Stored));
    }

    #[test]
    fn every_entry_payload_is_selectable_from_the_merged_pack() {
        let dir = tempdir().unwrap();
        let entries = vec![
            ModuleEntry::new("classes.dex", ContentSource::memory(vec![b'a'; 2048])),
            ModuleEntry::new("assets/blob.bin", ContentSource::memory(vec![1, 2, 3])),
            ModuleEntry::new("resources.arsc", ContentSource::memory(vec![9; 64])).with_force_uncompressed(true)
        ];
        let decision = decide(entries, &pool(), dir.path()).unwrap();
        let handles: Vec<EntryHandle> = decision.entries.iter().map(|e| e.handle).collect();
        let selected = decision.pack.select(&handles, |_| String::new(), |_| 1).unwrap();
        assert_eq!(selected.entries.len(), 3);
    }
}
