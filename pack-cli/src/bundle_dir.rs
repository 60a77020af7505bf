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

//! Reads an already-split bundle from disk, laid out the way bundletool
//! stores one on disk: one top-level directory per module, each holding
//! `manifest/AndroidManifest.xml` as a binary `XmlNode` proto, an optional
//! `resources.pb` binary `ResourceTable` proto, and raw entries under
//! `dex/`, `res/`, `assets/`, `lib/`, `root/`. Producing splits from a raw
//! `.aab` archive is an upstream splitter's job (spec §1 non-goals); this
//! only reads splits that already exist in that shape.
//!
//! Each module directory becomes a single master split — this reader
//! doesn't reconstruct config splits or targeting from the directory
//! layout, since that's a modeling decision bundletool itself makes
//! upstream of this core.

use std::fs;
use std::path::Path;

use prost::Message;

use pack_common::{PackError, Result};
use pack_model::entry::{ContentSource, ModuleEntry};
use pack_model::split::{ModuleSplit, SplitType};
use pack_model::targeting::{ApkTargeting, VariantTargeting};
use pack_proto::aapt::pb::{ResourceTable, XmlNode};

const MANIFEST_RELATIVE_PATH: &str = "manifest/AndroidManifest.xml";
const RESOURCE_TABLE_RELATIVE_PATH: &str = "resources.pb";

pub fn read_bundle_dir(root: &Path) -> Result<Vec<ModuleSplit>> {
    let mut splits = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let module_name = entry.file_name().to_string_lossy().into_owned();
        splits.push(read_module(&entry.path(), module_name)?);
    }
    splits.sort_by(|a, b| a.module_name.cmp(&b.module_name));
    Ok(splits)
}

fn read_module(module_dir: &Path, module_name: String) -> Result<ModuleSplit> {
    let manifest_bytes = fs::read(module_dir.join(MANIFEST_RELATIVE_PATH))
        .map_err(|_| PackError::InvalidBundle(format!("module \"{module_name}\" has no {MANIFEST_RELATIVE_PATH}")))?;
    let manifest = XmlNode::decode(manifest_bytes.as_slice())?;

    let resource_table = match fs::read(module_dir.join(RESOURCE_TABLE_RELATIVE_PATH)) {
        Ok(bytes) => Some(ResourceTable::decode(bytes.as_slice())?),
        Err(_) => None
    };

    let mut entries = Vec::new();
    collect_entries(module_dir, module_dir, &mut entries)?;

    Ok(ModuleSplit {
        module_name,
        split_type: SplitType::Split,
        is_master: true,
        is_apex: false,
        apk_targeting: ApkTargeting::default(),
        variant_targeting: VariantTargeting::default(),
        entries,
        manifest,
        resource_table,
        suffix: String::new()
    })
}

fn collect_entries(module_root: &Path, dir: &Path, entries: &mut Vec<ModuleEntry>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let relative = path.strip_prefix(module_root).expect("walked path is under module_root");

        if relative == Path::new(MANIFEST_RELATIVE_PATH) || relative == Path::new(RESOURCE_TABLE_RELATIVE_PATH) {
            continue;
        }
        if entry.file_type()?.is_dir() {
            collect_entries(module_root, &path, entries)?;
            continue;
        }

        let in_bundle_path = relative_to_bundle_path(relative);
        entries.push(ModuleEntry::new(in_bundle_path, ContentSource::memory(fs::read(&path)?)));
    }
    Ok(())
}

fn relative_to_bundle_path(relative: &Path) -> String {
    relative.components().map(|component| component.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_minimal_module(module_dir: &Path) {
        fs::create_dir_all(module_dir.join("manifest")).unwrap();
        fs::write(module_dir.join(MANIFEST_RELATIVE_PATH), XmlNode::default().encode_to_vec()).unwrap();
        fs::create_dir_all(module_dir.join("dex")).unwrap();
        fs::write(module_dir.join("dex/classes.dex"), b"dex-bytes").unwrap();
    }

    #[test]
    fn reads_one_split_per_top_level_module_directory() {
        let root = tempfile::tempdir().unwrap();
        write_minimal_module(&root.path().join("base"));
        write_minimal_module(&root.path().join("feature"));
        fs::write(root.path().join("not_a_module.txt"), b"ignored").unwrap();

        let splits = read_bundle_dir(root.path()).unwrap();

        assert_eq!(splits.len(), 2);
        assert_eq!(splits[0].module_name, "base");
        assert_eq!(splits[1].module_name, "feature");
        assert_eq!(splits[0].entries.len(), 1);
        assert_eq!(splits[0].entries[0].path, "dex/classes.dex");
    }

    #[test]
    fn missing_manifest_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("base/dex")).unwrap();

        let error = read_bundle_dir(root.path()).unwrap_err();
        assert!(matches!(error, PackError::InvalidBundle(_)));
    }

    #[test]
    fn resource_table_is_read_when_present() {
        let root = tempfile::tempdir().unwrap();
        let module_dir = root.path().join("base");
        write_minimal_module(&module_dir);
        fs::write(module_dir.join(RESOURCE_TABLE_RELATIVE_PATH), ResourceTable::default().encode_to_vec()).unwrap();

        let splits = read_bundle_dir(root.path()).unwrap();
        assert!(splits[0].resource_table.is_some());
    }
}
