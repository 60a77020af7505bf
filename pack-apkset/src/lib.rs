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

//! The APK Set assembler (spec §4.J): the top-level coordinator that
//! turns a bundle's module splits into a signed, TOC-indexed APK Set.
//!
//! `assemble` runs the seven-step pipeline: variant computation
//! ([`pack_variant`]), optional device filtering ([`pack_devicematch`]),
//! cross-variant split dedup, resource compilation ([`pack_rescompiler`]),
//! parallel write-and-sign ([`pack_writer`], [`pack_sign`]), TOC assembly
//! ([`toc`]) and output emission ([`emit`]).

mod emit;
mod manifest;
mod toc;
mod workdir;

use std::path::{Path, PathBuf};

use prost::Message;
use rayon::prelude::*;

use pack_common::{PackError, Result};
use pack_model::config::{ApkBuildMode, BundleConfig, SigningConfig};
use pack_model::{DeviceSpec, ModuleSplit, SplitType};
use pack_pathmgr::PathManager;
use pack_proto::android::bundle::BuildApksResult;
use pack_rescompiler::ResourceCompilerConfig;
use pack_sign::{SigningPolicy, SigningPolicyInputs};
use pack_variant::{ManifestModifier, Variant};
use pack_writer::EmbeddedApkPolicy;

pub use emit::EmittedSplit;
pub use toc::TocSummary;
pub use workdir::ScopedWorkdir;

/// Everything `assemble` needs about the bundle itself; the worker pool
/// size and resource-compiler binary are runtime concerns the caller
/// decides, not bundle content.
pub struct AssembleRequest<'a> {
    pub splits: Vec<ModuleSplit>,
    pub bundle_config: &'a BundleConfig,
    pub signing_config: &'a SigningConfig,
    pub resource_compiler: &'a ResourceCompilerConfig,
    pub device_spec: Option<&'a DeviceSpec>,
    pub mode: ApkBuildMode,
    pub first_variant_number: i32,
    pub worker_threads: Option<usize>
}

/// Where the finished APK Set should land.
pub enum ApkSetOutput<'a> {
    Archive(&'a Path),
    Directory(&'a Path)
}

/// Runs the full assembler pipeline and returns the `BuildApksResult`
/// that was also written out as `toc.pb`.
///
/// `manifest_modifier` is [`pack_variant::build_variants`]'s hook for
/// stamping each split's manifest with its variant/split metadata before
/// variant targeting is discarded; pass `None` when the caller already
/// did that upstream.
pub fn assemble(
    request: AssembleRequest<'_>,
    manifest_modifier: Option<&mut ManifestModifier<'_>>,
    output: ApkSetOutput<'_>
) -> Result<BuildApksResult> {
    let workdir = ScopedWorkdir::new()?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(request.worker_threads.unwrap_or(0))
        .build()
        .map_err(|error| PackError::WorkerPoolBuildFailed(error.to_string()))?;

    let mut variants = pack_variant::build_variants(request.splits, request.first_variant_number, request.mode, manifest_modifier)?;
    tracing::info!(variant_count = variants.len(), "computed variants");

    if let Some(device) = request.device_spec {
        filter_for_device(&mut variants, device)?;
    }

    let (mut unique_splits, occurrence_map) = dedup_splits(&variants);
    tracing::debug!(unique_split_count = unique_splits.len(), "deduplicated splits across variants");

    let signing_inputs: Vec<SigningInputs> =
        unique_splits.iter().map(|split| compute_signing_inputs(split, request.signing_config)).collect();
    for split in unique_splits.iter_mut() {
        let extract_native_libs = manifest::manifest_extract_native_libs(&split.manifest);
        pack_compress::apply_force_uncompressed_policy(&mut split.entries, extract_native_libs, &request.bundle_config.compression.uncompressed_glob, false);
    }

    let path_manager = PathManager::new();
    let unique_paths: Vec<String> = unique_splits.iter().map(|split| path_manager.get_apk_path(split, request.mode)).collect();

    let converted = pack_rescompiler::convert_splits(unique_splits, request.resource_compiler, &pool, workdir.path())?;

    // Every task is submitted; a task that errors doesn't stop the ones
    // already running on other threads (spec §5 "cancel remaining,
    // propagate the first"), it just makes the whole collect fail once
    // this batch finishes.
    let final_paths: Vec<PathBuf> = pool.install(|| {
        converted
            .into_par_iter()
            .zip(signing_inputs.into_par_iter())
            .enumerate()
            .map(|(index, (split, signing))| write_and_sign_one(split, &signing, request.signing_config, workdir.path(), index, &pool))
            .collect::<Result<Vec<_>>>()
    })?;

    let toc = toc::build(&variants, &occurrence_map, &unique_paths, env!("CARGO_PKG_VERSION").to_string());
    let toc_bytes = toc.encode_to_vec();

    let emitted: Vec<EmittedSplit> = unique_paths
        .into_iter()
        .zip(final_paths)
        .map(|(path, temp_path)| EmittedSplit { path, temp_path })
        .collect();

    match output {
        ApkSetOutput::Archive(path) => emit::emit_archive(path, &toc_bytes, &emitted)?,
        ApkSetOutput::Directory(path) => emit::emit_directory(path, &toc_bytes, &emitted)?
    }

    tracing::info!(variant_count = toc.variant.len(), apk_count = emitted.len(), "assembled apk set");
    Ok(toc)
}

fn filter_for_device(variants: &mut Vec<Variant>, device: &DeviceSpec) -> Result<()> {
    for variant in variants.iter_mut() {
        let mut kept = Vec::with_capacity(variant.splits.len());
        for split in variant.splits.drain(..) {
            if pack_devicematch::matches(&split, device)? {
                kept.push(split);
            }
        }
        variant.splits = kept;
    }
    variants.retain(|variant| !variant.splits.is_empty());
    Ok(())
}

/// Flattens every variant's splits and deduplicates identical ones
/// globally, mirroring the linear-scan dedup `pack_variant` already
/// does within a single variant. `occurrence_map[v][i]` is the index
/// into `unique` (and later `unique_paths`) for `variants[v].splits[i]`.
fn dedup_splits(variants: &[Variant]) -> (Vec<ModuleSplit>, Vec<Vec<usize>>) {
    let mut unique: Vec<ModuleSplit> = Vec::new();
    let mut occurrence_map: Vec<Vec<usize>> = Vec::with_capacity(variants.len());

    for variant in variants {
        let mut occurrences = Vec::with_capacity(variant.splits.len());
        for split in &variant.splits {
            let index = match unique.iter().position(|existing| existing == split) {
                Some(index) => index,
                None => {
                    unique.push(split.clone());
                    unique.len() - 1
                }
            };
            occurrences.push(index);
        }
        occurrence_map.push(occurrences);
    }

    (unique, occurrence_map)
}

struct SigningInputs {
    policy: SigningPolicy,
    min_sdk: u32
}

fn compute_signing_inputs(split: &ModuleSplit, signing_config: &SigningConfig) -> SigningInputs {
    let manifest_min_sdk = manifest::manifest_min_sdk(&split.manifest).max(1) as u32;
    let apk_targeting_min_sdk = split
        .apk_targeting
        .sdk_version_targeting
        .as_ref()
        .and_then(|targeting| targeting.value.iter().map(|version| version.min).min())
        .map(|min| min.max(1) as u32)
        .unwrap_or(1);
    let effective_min_sdk = manifest_min_sdk.max(apk_targeting_min_sdk);

    let policy = SigningPolicy::decide(&SigningPolicyInputs {
        effective_min_sdk,
        manifest_min_sdk,
        apk_targeting_min_sdk,
        no_v1_when_possible: signing_config.no_v1_signing_when_possible,
        restrict_v3_to_r_plus: signing_config.restrict_v3_signing_to_r_plus
    });

    SigningInputs { policy, min_sdk: effective_min_sdk }
}

#[tracing::instrument(skip(signing, signing_config, workdir, pool), fields(module = %split.module_name, split_type = ?split.split_type))]
fn write_and_sign_one(
    split: ModuleSplit,
    signing: &SigningInputs,
    signing_config: &SigningConfig,
    workdir: &Path,
    index: usize,
    pool: &rayon::ThreadPool
) -> Result<PathBuf> {
    let is_asset_slice = split.split_type == SplitType::AssetSlice;
    let is_apex = split.is_apex;
    let unsigned_path = workdir.join(format!("unique-{index}-unsigned.apk"));
    let final_path = workdir.join(format!("unique-{index}-final.apk"));

    pack_writer::write_split(split, is_asset_slice, &EmbeddedApkPolicy::default(), pool, workdir, &unsigned_path)?;

    if is_apex {
        tracing::warn!("apex payload carried through unsigned, v1/v2/v3 apk signing does not apply");
        std::fs::rename(&unsigned_path, &final_path)?;
    } else {
        pack_sign::sign_apk_file(&unsigned_path, &final_path, &signing_config.keys, &signing.policy, signing.min_sdk)?;
        tracing::debug!(path = %final_path.display(), "signed split");
    }

    Ok(final_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pack_model::targeting::{ApkTargeting, SdkVersion, SdkVersionTargeting, VariantTargeting};
    use pack_proto::aapt::pb::XmlNode;

    fn split(module: &str, split_type: SplitType) -> ModuleSplit {
        ModuleSplit {
            module_name: module.to_string(),
            split_type,
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

    #[test]
    fn dedup_splits_shares_index_for_identical_splits_across_variants() {
        let variants = vec![
            Variant { number: 0, targeting: VariantTargeting::default(), splits: vec![split("base", SplitType::Split)] },
            Variant { number: 1, targeting: VariantTargeting::default(), splits: vec![split("base", SplitType::Split)] }
        ];
        let (unique, occurrence_map) = dedup_splits(&variants);
        assert_eq!(unique.len(), 1);
        assert_eq!(occurrence_map, vec![vec![0], vec![0]]);
    }

    #[test]
    fn dedup_splits_keeps_distinct_splits_separate() {
        let variants = vec![Variant {
            number: 0,
            targeting: VariantTargeting::default(),
            splits: vec![split("base", SplitType::Split), split("feature", SplitType::Split)]
        }];
        let (unique, occurrence_map) = dedup_splits(&variants);
        assert_eq!(unique.len(), 2);
        assert_eq!(occurrence_map, vec![vec![0, 1]]);
    }

    #[test]
    fn compute_signing_inputs_reads_effective_min_sdk_from_targeting() {
        let mut candidate = split("base", SplitType::Split);
        candidate.apk_targeting.sdk_version_targeting = Some(SdkVersionTargeting { value: vec![SdkVersion { min: 24 }], alternatives: vec![] });
        let keys = pack_sign::crypto_keys::Keys::generate_random_testing_keys().unwrap();
        let signing_config = pack_model::config::SigningConfigBuilder::new(keys).build();
        let signing = compute_signing_inputs(&candidate, &signing_config);
        assert_eq!(signing.min_sdk, 24);
    }

    #[test]
    fn manifest_extract_native_libs_feeds_the_compression_force_policy() {
        use pack_model::ModuleEntry;
        use pack_proto::aapt::pb::{xml_node, XmlAttribute, XmlElement};

        let mut candidate = split("base", SplitType::Split);
        candidate.manifest = XmlNode {
            node: Some(xml_node::Node::Element(XmlElement {
                namespace_declaration: vec![],
                namespace_uri: String::new(),
                name: "manifest".to_string(),
                attribute: vec![],
                child: vec![XmlNode {
                    node: Some(xml_node::Node::Element(XmlElement {
                        namespace_declaration: vec![],
                        namespace_uri: String::new(),
                        name: "application".to_string(),
                        attribute: vec![XmlAttribute {
                            namespace_uri: String::new(),
                            name: "extractNativeLibs".to_string(),
                            value: "false".to_string(),
                            source: None,
                            resource_id: 0,
                            compiled_item: None
                        }],
                        child: vec![]
                    })),
                    source: None
                }]
            })),
            source: None
        };
        candidate.entries =
            vec![ModuleEntry::new("lib/arm64-v8a/libfoo.so".to_string(), pack_model::ContentSource::memory(vec![0u8; 8]))];

        let extract_native_libs = manifest::manifest_extract_native_libs(&candidate.manifest);
        pack_compress::apply_force_uncompressed_policy(&mut candidate.entries, extract_native_libs, &[], false);
        assert!(candidate.entries[0].force_uncompressed);
    }

    #[test]
    fn filter_for_device_drops_non_matching_splits_and_empty_variants() {
        use pack_model::targeting::{Abi, AbiTargeting};

        let mut candidate = split("base", SplitType::Split);
        // 4 == Abi.AbiAlias.X86
        candidate.apk_targeting.abi_targeting = Some(AbiTargeting { value: vec![Abi { alias: 4 }], alternatives: vec![] });

        let mut variants = vec![Variant { number: 0, targeting: VariantTargeting::default(), splits: vec![candidate] }];
        let device = DeviceSpec { abi: Some("arm64-v8a".to_string()), ..Default::default() };

        filter_for_device(&mut variants, &device).unwrap();
        assert!(variants.is_empty());
    }
}
