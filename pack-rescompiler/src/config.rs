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

use std::path::PathBuf;

use pack_model::config::ResourceOptimizationsConfig;

/// Flags forwarded to the external resource-compiler child process
/// (spec §6.2), plus the path to the binary itself.
#[derive(Debug, Clone)]
pub struct ResourceCompilerConfig {
    pub binary: PathBuf,
    pub sparse_encoding: bool,
    pub collapse_resource_names: bool,
    pub deduplicate_resource_entries: bool,
    pub no_collapse_resources: Vec<String>,
    pub no_collapse_resource_types: Vec<String>
}

impl ResourceCompilerConfig {
    pub fn new(binary: impl Into<PathBuf>, optimizations: &ResourceOptimizationsConfig) -> ResourceCompilerConfig {
        ResourceCompilerConfig {
            binary: binary.into(),
            sparse_encoding: optimizations.sparse_encoding,
            collapse_resource_names: optimizations.collapsed_resource_names.collapse_resource_names,
            deduplicate_resource_entries: optimizations.collapsed_resource_names.deduplicate_resource_entries,
            no_collapse_resources: optimizations.collapsed_resource_names.no_collapse_resources.clone(),
            no_collapse_resource_types: optimizations.collapsed_resource_names.no_collapse_resource_types.clone()
        }
    }
}
