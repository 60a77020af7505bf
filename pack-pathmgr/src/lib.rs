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

//! Assigns deterministic, unique in-APK-Set paths (spec §4.G). Thread-safe:
//! the used-path set is the one piece of shared mutable state this core
//! has (spec §9 "Global mutable state"), confined behind a single mutex.

use std::collections::HashSet;
use std::sync::Mutex;

use pack_model::{ApkBuildMode, ModuleSplit, SplitType};

/// Thread-safe path allocator. One instance per build.
pub struct PathManager {
    used: Mutex<HashSet<String>>
}

impl Default for PathManager {
    fn default() -> Self {
        PathManager::new()
    }
}

impl PathManager {
    pub fn new() -> PathManager {
        PathManager { used: Mutex::new(HashSet::new()) }
    }

    /// Returns the in-APK-Set path for `split`, guaranteed distinct
    /// from every path previously returned by this instance.
    pub fn get_apk_path(&self, split: &ModuleSplit, mode: ApkBuildMode) -> String {
        let (dir, stem) = Self::directory_and_stem(split, mode);
        let ext = if split.is_apex { "apex" } else { "apk" };
        self.claim(&dir, &stem, ext)
    }

    fn directory_and_stem(split: &ModuleSplit, mode: ApkBuildMode) -> (String, String) {
        if mode == ApkBuildMode::Universal {
            return (String::new(), "universal".to_string());
        }

        let suffix_or_master = || if split.suffix.is_empty() { "master" } else { split.suffix.as_str() };

        match split.split_type {
            SplitType::Split => ("splits/".to_string(), hyphen_join(&[&split.module_name, suffix_or_master()])),
            SplitType::Instant => ("instant/".to_string(), hyphen_join(&["instant", &split.module_name, suffix_or_master()])),
            SplitType::Standalone => ("standalones/".to_string(), hyphen_join(&["standalone", &split.suffix])),
            SplitType::System => {
                if split.is_master && split.is_base_module() {
                    ("system/".to_string(), "system".to_string())
                } else {
                    ("splits/".to_string(), hyphen_join(&[&split.module_name, suffix_or_master()]))
                }
            }
            SplitType::AssetSlice => ("asset-slices/".to_string(), hyphen_join(&[&split.module_name, suffix_or_master()])),
            SplitType::Archive => ("archive/".to_string(), "archive".to_string())
        }
    }

    fn claim(&self, dir: &str, stem: &str, ext: &str) -> String {
        let mut used = self.used.lock().expect("path manager mutex poisoned");

        let candidate = format!("{dir}{stem}.{ext}");
        if used.insert(candidate.clone()) {
            return candidate;
        }

        let mut n = 2;
        loop {
            let attempt = format!("{dir}{stem}_{n}.{ext}");
            if used.insert(attempt.clone()) {
                return attempt;
            }
            n += 1;
        }
    }
}

fn hyphen_join(parts: &[&str]) -> String {
    parts.iter().filter(|p| !p.is_empty()).copied().collect::<Vec<_>>().join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pack_model::targeting::{ApkTargeting, VariantTargeting};
    use pack_proto::aapt::pb::XmlNode;

    fn sample_split(module_name: &str, split_type: SplitType, is_master: bool, suffix: &str) -> ModuleSplit {
        ModuleSplit {
            module_name: module_name.to_string(),
            split_type,
            is_master,
            is_apex: false,
            apk_targeting: ApkTargeting::default(),
            variant_targeting: VariantTargeting::default(),
            entries: vec![],
            manifest: XmlNode::default(),
            resource_table: None,
            suffix: suffix.to_string()
        }
    }

    #[test]
    fn split_paths_use_module_and_suffix() {
        let mgr = PathManager::new();
        let split = sample_split("base", SplitType::Split, true, "");
        assert_eq!(mgr.get_apk_path(&split, ApkBuildMode::Default), "splits/base-master.apk");

        let hdpi = sample_split("base", SplitType::Split, false, "hdpi");
        assert_eq!(mgr.get_apk_path(&hdpi, ApkBuildMode::Default), "splits/base-hdpi.apk");
    }

    #[test]
    fn system_master_base_gets_reserved_name() {
        let mgr = PathManager::new();
        let split = sample_split("base", SplitType::System, true, "");
        assert_eq!(mgr.get_apk_path(&split, ApkBuildMode::Default), "system/system.apk");
    }

    #[test]
    fn universal_mode_ignores_split_shape() {
        let mgr = PathManager::new();
        let split = sample_split("base", SplitType::Standalone, true, "arm64_v8a");
        assert_eq!(mgr.get_apk_path(&split, ApkBuildMode::Universal), "universal.apk");
    }

    #[test]
    fn colliding_candidates_get_numeric_suffixes() {
        let mgr = PathManager::new();
        let a = sample_split("base", SplitType::Split, true, "");
        let b = sample_split("base", SplitType::Split, true, "");
        let c = sample_split("base", SplitType::Split, true, "");

        assert_eq!(mgr.get_apk_path(&a, ApkBuildMode::Default), "splits/base-master.apk");
        assert_eq!(mgr.get_apk_path(&b, ApkBuildMode::Default), "splits/base-master_2.apk");
        assert_eq!(mgr.get_apk_path(&c, ApkBuildMode::Default), "splits/base-master_3.apk");
    }

    #[test]
    fn apex_standalone_gets_apex_extension() {
        let mgr = PathManager::new();
        let mut split = sample_split("base", SplitType::Standalone, true, "x86_64");
        split.is_apex = true;
        assert_eq!(mgr.get_apk_path(&split, ApkBuildMode::Default), "standalones/standalone-x86_64.apex");
    }
}
