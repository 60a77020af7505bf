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

//! The core data model (spec §3): `ModuleSplit`, `ModuleEntry`,
//! targeting, `VariantKey`, build configuration, and the device spec
//! used for filtering.

pub mod config;
pub mod device;
pub mod entry;
pub mod split;
pub mod targeting;

pub use config::{
    ApkBuildMode, BundleConfig, BundleConfigBuilder, CompressionAlgorithm, CompressionConfig,
    SigningConfig, SigningConfigBuilder
};
pub use device::DeviceSpec;
pub use entry::{ContentSource, ModuleEntry, SourceLocation};
pub use split::{ModuleSplit, SplitType, BASE_MODULE_NAME};
pub use targeting::VariantKey;
