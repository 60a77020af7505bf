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

//! Batched conversion of proto-form resources/manifest into the binary
//! form accepted on-device, via an external child process (spec §4.C).

mod config;
mod process;

pub use config::ResourceCompilerConfig;

use std::fs;
use std::path::Path;

use prost::Message;
use rayon::prelude::*;

use pack_common::{PackError, Result, MANIFEST_PATH, RESOURCE_TABLE_PATH};
use pack_entrypack::{EntryHandle, EntryPack, EntryPackBuilder, PackStrategy};
use pack_model::{ContentSource, ModuleEntry, ModuleSplit};
use pack_proto::aapt::pb::XmlNode;
use pack_zip::{ArchiveReader, ArchiveWriter, CompressionMethod};

fn is_convertible(entry: &ModuleEntry) -> bool {
    pack_common::rewrite_entry_path(&entry.path).starts_with("res/")
}

/// Converts every split's proto-form resources and manifest to binary
/// form. Runs one child process per split on `pool`, in parallel;
/// aborts on the first failure (spec §4.C, §5).
pub fn convert_splits(splits: Vec<ModuleSplit>, config: &ResourceCompilerConfig, pool: &rayon::ThreadPool, workdir: &Path) -> Result<Vec<ModuleSplit>> {
    let mut builder = EntryPackBuilder::new("c");
    let mut per_split_handles: Vec<Vec<(EntryHandle, String)>> = Vec::with_capacity(splits.len());

    for split in &splits {
        let mut handles = Vec::new();
        for entry in &split.entries {
            if is_convertible(entry) {
                handles.push((builder.add(entry)?, entry.path.clone()));
            }
        }
        per_split_handles.push(handles);
    }

    let pack = builder.pack(PackStrategy::Uncompressed, workdir.join("rescompile-p0.zip"))?;
    let resource_config_path = write_resource_config_if_needed(config, workdir)?;

    pool.install(|| {
        splits
            .into_par_iter()
            .zip(per_split_handles.into_par_iter())
            .enumerate()
            .map(|(index, (split, handles))| convert_one(split, handles, &pack, config, resource_config_path.as_deref(), workdir, index))
            .collect()
    })
}

fn write_resource_config_if_needed(config: &ResourceCompilerConfig, workdir: &Path) -> Result<Option<std::path::PathBuf>> {
    if config.no_collapse_resources.is_empty() && config.no_collapse_resource_types.is_empty() {
        return Ok(None);
    }

    let path = workdir.join("resource-config.textproto");
    let mut contents = String::new();
    for name in &config.no_collapse_resources {
        contents.push_str(&format!("resource: \"{name}\"\n"));
    }
    for kind in &config.no_collapse_resource_types {
        contents.push_str(&format!("resource_type: \"{kind}\"\n"));
    }
    fs::write(&path, contents)?;
    Ok(Some(path))
}

fn convert_one(
    mut split: ModuleSplit,
    convertible: Vec<(EntryHandle, String)>,
    pack: &EntryPack,
    config: &ResourceCompilerConfig,
    resource_config_path: Option<&Path>,
    workdir: &Path,
    index: usize
) -> Result<ModuleSplit> {
    if split.manifest == XmlNode::default() {
        return Err(PackError::InvalidBundle(format!("Split \"{}\" has no manifest; every APK-producing split must carry one.", split.module_name)));
    }

    let handles: Vec<EntryHandle> = convertible.iter().map(|(h, _)| *h).collect();
    let selected = pack.select(
        &handles,
        |handle| convertible.iter().find(|(h, _)| *h == handle).expect("handle minted for this split").1.clone(),
        |_| 1
    )?;

    let proto_path = workdir.join(format!("split-{index}-proto.zip"));
    let binary_path = workdir.join(format!("split-{index}-binary.zip"));

    {
        let mut writer = ArchiveWriter::create_new(&proto_path)?;
        let source_reader = ArchiveReader::open(&selected.source_path)?;
        for entry in &selected.entries {
            let raw = source_reader
                .entries()
                .iter()
                .find(|e| e.name == entry.original_name)
                .expect("selected entry must exist in the source pack");
            pack_zip::copy_entry(&mut writer, &source_reader, raw, &entry.new_name, entry.alignment)?;
        }
        writer.append(MANIFEST_PATH, CompressionMethod::Stored, 1, &split.manifest.encode_to_vec())?;
        if let Some(table) = &split.resource_table {
            writer.append("resources.pb", CompressionMethod::Stored, 1, &table.encode_to_vec())?;
        }
        writer.finish()?;
    }

    let result = process::run(config, &proto_path, &binary_path, resource_config_path, &split.module_name);
    let _ = fs::remove_file(&proto_path);
    result?;

    let binary_reader = ArchiveReader::open(&binary_path)?;
    let mut new_entries: Vec<ModuleEntry> = split.entries.iter().filter(|e| !is_convertible(e)).cloned().collect();

    for raw in binary_reader.entries() {
        let bytes = binary_reader.decompressed_bytes(raw)?;
        let entry = if raw.name == MANIFEST_PATH {
            ModuleEntry::new(MANIFEST_PATH, ContentSource::memory(bytes)).with_force_uncompressed(false)
        } else if raw.name == RESOURCE_TABLE_PATH {
            ModuleEntry::new(RESOURCE_TABLE_PATH, ContentSource::memory(bytes)).with_force_uncompressed(true)
        } else {
            ModuleEntry::new(raw.name.clone(), ContentSource::memory(bytes))
        };
        new_entries.push(entry);
    }

    let _ = fs::remove_file(&binary_path);

    split.entries = new_entries;
    // The manifest/resource table now live as entries; clear the proto
    // fields so the writer (spec §4.E step 1) doesn't re-inject them.
    split.manifest = XmlNode::default();
    split.resource_table = None;

    Ok(split)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pack_model::targeting::{ApkTargeting, VariantTargeting};
    use pack_model::SplitType;
    use tempfile::tempdir;

    #[test]
    fn convertible_classification_uses_rewritten_path() {
        let entry = ModuleEntry::new("res/values/strings.pb", ContentSource::memory(vec![]));
        assert!(is_convertible(&entry));

        let entry = ModuleEntry::new("assets/foo.txt", ContentSource::memory(vec![]));
        assert!(!is_convertible(&entry));

        // `root/res/...` does not rewrite to a `res/`-prefixed path (the
        // `root/` rule only strips the literal `root/` prefix once), so
        // this checks the rewrite is applied, not guessed at.
        let entry = ModuleEntry::new("root/res/values/strings.pb", ContentSource::memory(vec![]));
        assert!(is_convertible(&entry));
    }

    #[test]
    fn missing_manifest_is_rejected_before_invoking_the_compiler() {
        let dir = tempdir().unwrap();
        let split = ModuleSplit {
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
        };

        let config = ResourceCompilerConfig::new("/bin/true", &pack_model::config::ResourceOptimizationsConfig::default());
        let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
        let err = convert_splits(vec![split], &config, &pool, dir.path()).unwrap_err();
        assert!(matches!(err, PackError::InvalidBundle(_)));
    }

    #[test]
    fn resource_config_file_written_only_when_exclusions_present() {
        let dir = tempdir().unwrap();
        let mut opts = pack_model::config::ResourceOptimizationsConfig::default();
        let config = ResourceCompilerConfig::new("/bin/true", &opts);
        assert!(write_resource_config_if_needed(&config, dir.path()).unwrap().is_none());

        opts.collapsed_resource_names.no_collapse_resources = vec!["app_name".to_string()];
        let config = ResourceCompilerConfig::new("/bin/true", &opts);
        let path = write_resource_config_if_needed(&config, dir.path()).unwrap().unwrap();
        let contents = fs::read_to_string(path).unwrap();
        assert!(contents.contains("app_name"));
    }
}
