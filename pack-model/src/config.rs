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

//! Immutable, builder-constructed configuration objects (spec §6.1, §9
//! "Config objects": "forbid nullable field-by-field mutation after
//! build").

use std::path::PathBuf;

/// spec §6.1 `compression.apkCompressionAlgorithm`.
#[derive(Debug, Clone)]
pub enum CompressionAlgorithm {
    Deflate,
    /// §4.B "external compressor": delegate to an external tool over the
    /// intermediate zip, per §9's open question about the external path.
    External { binary: PathBuf, working_dir: PathBuf }
}

#[derive(Debug, Clone)]
pub struct CompressionConfig {
    pub uncompressed_glob: Vec<String>,
    pub algorithm: CompressionAlgorithm
}

#[derive(Debug, Clone, Default)]
pub struct CollapsedResourceNamesConfig {
    pub collapse_resource_names: bool,
    pub deduplicate_resource_entries: bool,
    pub no_collapse_resources: Vec<String>,
    pub no_collapse_resource_types: Vec<String>
}

#[derive(Debug, Clone, Default)]
pub struct ResourceOptimizationsConfig {
    pub sparse_encoding: bool,
    pub collapsed_resource_names: CollapsedResourceNamesConfig
}

#[derive(Debug, Clone)]
pub struct BundleConfig {
    pub compression: CompressionConfig,
    pub resource_optimizations: ResourceOptimizationsConfig
}

pub struct BundleConfigBuilder {
    uncompressed_glob: Vec<String>,
    algorithm: CompressionAlgorithm,
    resource_optimizations: ResourceOptimizationsConfig
}

impl Default for BundleConfigBuilder {
    fn default() -> Self {
        BundleConfigBuilder {
            uncompressed_glob: vec![],
            algorithm: CompressionAlgorithm::Deflate,
            resource_optimizations: ResourceOptimizationsConfig::default()
        }
    }
}

impl BundleConfigBuilder {
    pub fn new() -> BundleConfigBuilder {
        BundleConfigBuilder::default()
    }

    pub fn uncompressed_glob(mut self, globs: Vec<String>) -> Self {
        self.uncompressed_glob = globs;
        self
    }

    pub fn algorithm(mut self, algorithm: CompressionAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn resource_optimizations(mut self, opts: ResourceOptimizationsConfig) -> Self {
        self.resource_optimizations = opts;
        self
    }

    pub fn build(self) -> BundleConfig {
        BundleConfig {
            compression: CompressionConfig {
                uncompressed_glob: self.uncompressed_glob,
                algorithm: self.algorithm
            },
            resource_optimizations: self.resource_optimizations
        }
    }
}

/// spec §4.J "apkBuildMode" / §4.H mode invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApkBuildMode {
    Default,
    Universal,
    System,
    SystemCompressed,
    Archive,
    Instant
}

/// Optional attestation config (spec §4.F "source stamp").
#[derive(Debug, Clone)]
pub struct SourceStampConfig {
    pub signing_key_path: PathBuf
}

/// spec §6.1 `SigningConfig`. The actual key material lives in
/// `pack_sign::crypto_keys::Keys`; this wraps it with the policy flags
/// that §4.F's `signWithV1`/`signWithV3` decisions read.
pub struct SigningConfig {
    pub keys: pack_sign::crypto_keys::Keys,
    pub lineage: Option<Vec<u8>>,
    pub restrict_v3_signing_to_r_plus: bool,
    /// §4.F's `featureFlag(noV1WhenPossible)`: when set, a split whose
    /// effective min-SDK already clears Android N skips the v1/JAR
    /// signature. Defaults to `false` (always sign v1) since that's the
    /// conservative choice for a caller that hasn't thought about it.
    pub no_v1_signing_when_possible: bool,
    pub source_stamp: Option<SourceStampConfig>
}

pub struct SigningConfigBuilder {
    keys: pack_sign::crypto_keys::Keys,
    lineage: Option<Vec<u8>>,
    restrict_v3_signing_to_r_plus: bool,
    no_v1_signing_when_possible: bool,
    source_stamp: Option<SourceStampConfig>
}

impl SigningConfigBuilder {
    pub fn new(keys: pack_sign::crypto_keys::Keys) -> SigningConfigBuilder {
        SigningConfigBuilder {
            keys,
            lineage: None,
            restrict_v3_signing_to_r_plus: true,
            no_v1_signing_when_possible: false,
            source_stamp: None
        }
    }

    pub fn lineage(mut self, lineage: Option<Vec<u8>>) -> Self {
        self.lineage = lineage;
        self
    }

    pub fn restrict_v3_signing_to_r_plus(mut self, restrict: bool) -> Self {
        self.restrict_v3_signing_to_r_plus = restrict;
        self
    }

    pub fn no_v1_signing_when_possible(mut self, no_v1_when_possible: bool) -> Self {
        self.no_v1_signing_when_possible = no_v1_when_possible;
        self
    }

    pub fn source_stamp(mut self, stamp: Option<SourceStampConfig>) -> Self {
        self.source_stamp = stamp;
        self
    }

    pub fn build(self) -> SigningConfig {
        SigningConfig {
            keys: self.keys,
            lineage: self.lineage,
            restrict_v3_signing_to_r_plus: self.restrict_v3_signing_to_r_plus,
            no_v1_signing_when_possible: self.no_v1_signing_when_possible,
            source_stamp: self.source_stamp
        }
    }
}
