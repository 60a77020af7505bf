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

use pack_proto::aapt::pb::{ResourceTable, XmlNode};

use crate::{
    entry::ModuleEntry,
    targeting::{ApkTargeting, VariantTargeting}
};

/// The base module's reserved name (spec §3 "base module has a reserved
/// name").
pub const BASE_MODULE_NAME: &str = "base";

/// spec §3 `ModuleSplit.splitType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SplitType {
    Split,
    Instant,
    Standalone,
    System,
    AssetSlice,
    Archive
}

/// The unit of APK generation (spec §3 `ModuleSplit`).
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleSplit {
    pub module_name: String,
    pub split_type: SplitType,
    pub is_master: bool,
    /// True for a `STANDALONE` split whose payload is an APEX image
    /// rather than an APK (spec §4.G path table, §6.3 output formats).
    pub is_apex: bool,
    pub apk_targeting: ApkTargeting,
    pub variant_targeting: VariantTargeting,
    pub entries: Vec<ModuleEntry>,
    pub manifest: XmlNode,
    pub resource_table: Option<ResourceTable>,
    /// Derived from targeting; used for the filename (spec §3, §4.G).
    pub suffix: String
}

impl ModuleSplit {
    pub fn is_base_module(&self) -> bool {
        self.module_name == BASE_MODULE_NAME
    }
}
