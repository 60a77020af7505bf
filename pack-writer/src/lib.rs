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

//! Writes one split's entries to an unsigned, aligned APK zip (spec
//! §4.E). Consults the compression decision (D) and the merged entry
//! pack (B) it produces; signing and the final rename are the
//! assembler's (J) job, not this crate's.

use std::collections::HashMap;
use std::path::Path;

use prost::Message;

use pack_common::{Result, MANIFEST_PATH, RESOURCE_TABLE_PATH};
use pack_compress::ResolvedEntry;
use pack_entrypack::EntryHandle;
use pack_model::{ContentSource, ModuleEntry, ModuleSplit};
use pack_proto::aapt::pb::XmlNode;
use pack_zip::{ArchiveReader, ArchiveWriter, CompressionMethod};

/// Hooks for spec §4.E step 7 ("signs embedded APKs first"). Both are
/// optional: when neither is given, step 7 is a no-op, which is the
/// overwhelmingly common case for a split with no embedded APK.
#[derive(Default)]
pub struct EmbeddedApkPolicy<'a> {
    /// Given the split's manifest, returns the in-bundle paths of any
    /// embedded APK payloads referenced from it (spec §9 open
    /// question: treated as an injected interface rather than a
    /// hardcoded `res/raw/*` lookup).
    pub discover: Option<&'a dyn Fn(&XmlNode) -> Vec<String>>,
    /// Signs one embedded APK's raw bytes independently of the parent
    /// split's own signing pass.
    pub sign: Option<&'a dyn Fn(&[u8]) -> Result<Vec<u8>>>
}

/// Writes `split` to `temp_path` as an unsigned, aligned zip. Any
/// failure aborts the whole split; `temp_path` is removed before
/// returning an error so no partial file is left behind.
pub fn write_split(
    mut split: ModuleSplit,
    is_asset_slice: bool,
    embedded_apks: &EmbeddedApkPolicy<'_>,
    pool: &rayon::ThreadPool,
    workdir: &Path,
    temp_path: &Path
) -> Result<()> {
    match write_split_inner(&mut split, is_asset_slice, embedded_apks, pool, workdir, temp_path) {
        Ok(()) => Ok(()),
        Err(err) => {
            let _ = std::fs::remove_file(temp_path);
            Err(err)
        }
    }
}

fn write_split_inner(
    split: &mut ModuleSplit,
    is_asset_slice: bool,
    embedded_apks: &EmbeddedApkPolicy<'_>,
    pool: &rayon::ThreadPool,
    workdir: &Path,
    temp_path: &Path
) -> Result<()> {
    mark_embedded_apks(split, embedded_apks.discover);
    inject_manifest_and_table(split);
    sign_embedded_apks(split, embedded_apks.sign)?;

    let mut entries: Vec<ModuleEntry> = std::mem::take(&mut split.entries);
    rewrite_paths(&mut entries);
    dedupe_by_path(&mut entries);
    entries.sort_by(|a, b| a.path.cmp(&b.path));

    let decision = pack_compress::decide(entries, pool, workdir)?;
    write_zip(&decision, is_asset_slice, temp_path)
}

/// Marks entries referenced from the manifest as embedded APKs that
/// need independent signing (spec §4.E step 7), before the manifest
/// itself is injected as a plain entry.
fn mark_embedded_apks(split: &mut ModuleSplit, discover: Option<&dyn Fn(&XmlNode) -> Vec<String>>) {
    let Some(discover) = discover else { return };
    if split.manifest == XmlNode::default() {
        return;
    }
    let embedded_paths = discover(&split.manifest);
    if embedded_paths.is_empty() {
        return;
    }
    for entry in split.entries.iter_mut() {
        if embedded_paths.iter().any(|path| path == &entry.path) {
            entry.should_sign = true;
        }
    }
}

/// spec §4.E step 1: injects the manifest and (if present) resource
/// table as entries at their reserved paths, removing any prior
/// entries there. A split that already went through resource
/// conversion (spec §4.C) has `manifest` and `resource_table` already
/// cleared to their defaults, so this is a no-op for it.
fn inject_manifest_and_table(split: &mut ModuleSplit) {
    if split.manifest != XmlNode::default() {
        split.entries.retain(|entry| entry.path != MANIFEST_PATH);
        split.entries.push(ModuleEntry::new(MANIFEST_PATH, ContentSource::memory(split.manifest.encode_to_vec())));
        split.manifest = XmlNode::default();
    }
    if let Some(table) = split.resource_table.take() {
        split.entries.retain(|entry| entry.path != RESOURCE_TABLE_PATH);
        split
            .entries
            .push(ModuleEntry::new(RESOURCE_TABLE_PATH, ContentSource::memory(table.encode_to_vec())).with_force_uncompressed(true));
    }
}

fn sign_embedded_apks(split: &mut ModuleSplit, sign: Option<&dyn Fn(&[u8]) -> Result<Vec<u8>>>) -> Result<()> {
    let Some(sign) = sign else { return Ok(()) };
    for entry in split.entries.iter_mut() {
        if entry.should_sign {
            let signed = sign(&entry.read()?)?;
            entry.content = ContentSource::memory(signed);
        }
    }
    Ok(())
}

/// spec §4.E step 2: dex/root/manifest/apex path rewrite rules.
fn rewrite_paths(entries: &mut [ModuleEntry]) {
    for entry in entries {
        entry.path = pack_common::rewrite_entry_path(&entry.path);
    }
}

/// spec §4.E step 3: keep the last entry in input order on a path collision.
fn dedupe_by_path(entries: &mut Vec<ModuleEntry>) {
    let mut last_occurrence: HashMap<&str, usize> = HashMap::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        last_occurrence.insert(entry.path.as_str(), index);
    }
    let mut index = 0;
    entries.retain(|entry| {
        let keep = last_occurrence.get(entry.path.as_str()) == Some(&index);
        index += 1;
        keep
    });
}

/// spec §4.E step 6: 0 for compressed records (mapped to this zip
/// writer's "1 = no alignment requirement" convention), 4096 for
/// uncompressed `.so` and asset-slice `assets/` entries, 4 otherwise.
fn alignment_for(entry: &ResolvedEntry, is_asset_slice: bool) -> u32 {
    match entry.method {
        CompressionMethod::Deflated => 1,
        CompressionMethod::Stored => {
            if entry.path.ends_with(".so") || (is_asset_slice && entry.path.starts_with("assets/")) {
                4096
            } else {
                4
            }
        }
    }
}

fn write_zip(decision: &pack_compress::CompressionDecision, is_asset_slice: bool, temp_path: &Path) -> Result<()> {
    let by_handle: HashMap<EntryHandle, &ResolvedEntry> = decision.entries.iter().map(|entry| (entry.handle, entry)).collect();
    let handles: Vec<EntryHandle> = decision.entries.iter().map(|entry| entry.handle).collect();

    let selected = decision.pack.select(
        &handles,
        |handle| by_handle[&handle].path.clone(),
        |handle| alignment_for(by_handle[&handle], is_asset_slice)
    )?;

    let mut writer = ArchiveWriter::create_new(temp_path)?;
    let reader = ArchiveReader::open(&selected.source_path)?;
    for selected_entry in &selected.entries {
        let raw = reader
            .entries()
            .iter()
            .find(|e| e.name == selected_entry.original_name)
            .expect("selected entry must exist in the source pack");
        pack_zip::copy_entry(&mut writer, &reader, raw, &selected_entry.new_name, selected_entry.alignment)?;
    }
    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pack_model::targeting::{ApkTargeting, VariantTargeting};
    use pack_model::SplitType;
    use tempfile::tempdir;

    fn empty_split() -> ModuleSplit {
        ModuleSplit {
            module_name: "base".to_string(),
            split_type: SplitType::Split,
            is_master: true,
            is_apex: false,
            apk_targeting: ApkTargeting::default(),
            variant_targeting: VariantTargeting::default(),
            entries: vec![],
            manifest: XmlNode::default(),
            resource_table: None,
            suffix: String::new()
        }
    }

    fn pool() -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    fn sample_manifest() -> XmlNode {
        use pack_proto::aapt::pb::{xml_node::Node, XmlText};
        XmlNode { node: Some(Node::Text(XmlText { text: "manifest".to_string() })), source: None }
    }

    #[test]
    fn dedupe_keeps_last_entry_in_input_order() {
        let mut entries = vec![
            ModuleEntry::new("res/values/strings.xml", ContentSource::memory(b"first".to_vec())),
            ModuleEntry::new("res/values/strings.xml", ContentSource::memory(b"second".to_vec()))
        ];
        dedupe_by_path(&mut entries);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].read().unwrap(), b"second");
    }

    #[test]
    fn rewrite_applies_path_rules_before_dedup() {
        let mut entries = vec![ModuleEntry::new("root/lib/arm64-v8a/libfoo.so", ContentSource::memory(vec![]))];
        rewrite_paths(&mut entries);
        assert_eq!(entries[0].path, "lib/arm64-v8a/libfoo.so");
    }

    #[test]
    fn writes_injected_manifest_and_sorted_entries_to_an_unsigned_zip() {
        let dir = tempdir().unwrap();
        let mut split = empty_split();
        split.manifest = sample_manifest();
        split.entries = vec![
            ModuleEntry::new("classes.dex", ContentSource::memory(b"dex".to_vec())),
            ModuleEntry::new("res/values/strings.xml", ContentSource::memory(b"<resources/>".to_vec()))
        ];

        let temp_path = dir.path().join("base-master.apk.tmp");
        write_split(split, false, &EmbeddedApkPolicy::default(), &pool(), dir.path(), &temp_path).unwrap();

        let reader = ArchiveReader::open(&temp_path).unwrap();
        let names: Vec<&str> = reader.entries().iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&MANIFEST_PATH));
        assert!(names.contains(&"classes.dex"));
        assert!(names.contains(&"res/values/strings.xml"));

        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn failure_leaves_no_partial_file_behind() {
        let dir = tempdir().unwrap();
        let temp_path = dir.path().join("nested/does/not/exist.apk.tmp");
        let split = empty_split();
        let err = write_split(split, false, &EmbeddedApkPolicy::default(), &pool(), dir.path(), &temp_path);
        assert!(err.is_err());
        assert!(!temp_path.exists());
    }

    #[test]
    fn embedded_apk_discovered_from_manifest_is_signed_independently() {
        let dir = tempdir().unwrap();
        let mut split = empty_split();
        split.manifest = sample_manifest();
        split.entries = vec![ModuleEntry::new("res/raw/watchface.apk", ContentSource::memory(b"unsigned".to_vec()))];

        let discover = |_: &XmlNode| vec!["res/raw/watchface.apk".to_string()];
        let sign = |bytes: &[u8]| -> Result<Vec<u8>> {
            let mut signed = bytes.to_vec();
            signed.extend_from_slice(b"-signed");
            Ok(signed)
        };
        let policy = EmbeddedApkPolicy { discover: Some(&discover), sign: Some(&sign) };

        let temp_path = dir.path().join("base-master.apk.tmp");
        write_split(split, false, &policy, &pool(), dir.path(), &temp_path).unwrap();

        let reader = ArchiveReader::open(&temp_path).unwrap();
        let entry = reader.entries().iter().find(|e| e.name == "res/raw/watchface.apk").unwrap();
        assert_eq!(reader.decompressed_bytes(entry).unwrap(), b"unsigned-signed");
    }
}
