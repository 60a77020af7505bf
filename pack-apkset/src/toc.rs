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

//! Builds the `BuildApksResult` table of contents (spec §4.J step 6, §5
//! ordering guarantees): one `Variant` per variant number, one `ApkSet`
//! per module in module-name order, `ApkDescription`s in input split
//! order within a module.

use std::fmt;

use pack_model::{ModuleSplit, SplitType};
use pack_proto::android::bundle::apk_description::ApkMetadataOneof;
use pack_proto::android::bundle::{
    ApexApkMetadata, ApkDescription, ApkSet, ArchivedApkMetadata, AssetSliceMetadata,
    BuildApksResult, InstantApkMetadata, ModuleMetadata, StandaloneApkMetadata,
    SystemApkMetadata, SplitApkMetadata, Variant as ProtoVariant
};
use pack_variant::Variant;

/// `unique_paths[occurrence_map[variant_index][split_index]]` is the
/// in-APK-Set path for `variants[variant_index].splits[split_index]`;
/// several occurrences can point at the same path when §4.J step 4
/// deduplicated their split before writing it.
pub fn build(variants: &[Variant], occurrence_map: &[Vec<usize>], unique_paths: &[String], bundletool_version: String) -> BuildApksResult {
    let variant = variants
        .iter()
        .zip(occurrence_map.iter())
        .map(|(variant, occurrences)| build_variant(variant, occurrences, unique_paths))
        .collect();

    BuildApksResult { bundletool_version, variant }
}

fn build_variant(variant: &Variant, occurrences: &[usize], unique_paths: &[String]) -> ProtoVariant {
    let mut order: Vec<usize> = (0..variant.splits.len()).collect();
    order.sort_by(|&a, &b| variant.splits[a].module_name.cmp(&variant.splits[b].module_name));

    let mut apk_sets: Vec<ApkSet> = Vec::new();
    for index in order {
        let split = &variant.splits[index];
        let path = unique_paths[occurrences[index]].clone();
        let description = build_apk_description(split, path);

        match apk_sets.last_mut() {
            Some(last) if last.module_metadata.as_ref().is_some_and(|m| m.name == split.module_name) => {
                last.apk_description.push(description);
            }
            _ => apk_sets.push(ApkSet {
                module_metadata: Some(ModuleMetadata { name: split.module_name.clone() }),
                apk_description: vec![description]
            })
        }
    }

    ProtoVariant { targeting: Some(variant.targeting.clone()), apk_set: apk_sets, variant_number: variant.number }
}

fn build_apk_description(split: &ModuleSplit, path: String) -> ApkDescription {
    let metadata = match split.split_type {
        SplitType::Split => ApkMetadataOneof::SplitApkMetadata(SplitApkMetadata { is_master_split: split.is_master }),
        SplitType::Instant => ApkMetadataOneof::InstantApkMetadata(InstantApkMetadata { is_master_split: split.is_master }),
        SplitType::Standalone if split.is_apex => ApkMetadataOneof::ApexApkMetadata(ApexApkMetadata {}),
        SplitType::Standalone => {
            ApkMetadataOneof::StandaloneApkMetadata(StandaloneApkMetadata { fused_module_name: vec![split.module_name.clone()] })
        }
        SplitType::System => ApkMetadataOneof::SystemApkMetadata(SystemApkMetadata { fused_module_name: vec![split.module_name.clone()] }),
        SplitType::AssetSlice => ApkMetadataOneof::AssetSliceMetadata(AssetSliceMetadata {}),
        SplitType::Archive => ApkMetadataOneof::ArchivedApkMetadata(ArchivedApkMetadata {})
    };

    ApkDescription {
        targeting: Some(split.apk_targeting.clone()),
        path,
        module_name: split.module_name.clone(),
        apk_metadata_oneof: Some(metadata)
    }
}

/// A human-readable render of a `toc.pb` (a supplemented feature: pairing
/// the wire struct with a `Display` impl rather than a separate ad-hoc
/// printing routine at each call site).
pub struct TocSummary<'a>(pub &'a BuildApksResult);

impl fmt::Display for TocSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "bundletool_version: {}", self.0.bundletool_version)?;
        for variant in &self.0.variant {
            writeln!(f, "variant {}", variant.variant_number)?;
            for apk_set in &variant.apk_set {
                let module_name = apk_set.module_metadata.as_ref().map(|m| m.name.as_str()).unwrap_or("?");
                writeln!(f, "  module {module_name}")?;
                for description in &apk_set.apk_description {
                    let kind = apk_metadata_kind(&description.apk_metadata_oneof);
                    writeln!(f, "    {} ({kind})", description.path)?;
                }
            }
        }
        Ok(())
    }
}

fn apk_metadata_kind(metadata: &Option<ApkMetadataOneof>) -> &'static str {
    match metadata {
        Some(ApkMetadataOneof::SplitApkMetadata(_)) => "split",
        Some(ApkMetadataOneof::InstantApkMetadata(_)) => "instant",
        Some(ApkMetadataOneof::StandaloneApkMetadata(_)) => "standalone",
        Some(ApkMetadataOneof::SystemApkMetadata(_)) => "system",
        Some(ApkMetadataOneof::AssetSliceMetadata(_)) => "asset-slice",
        Some(ApkMetadataOneof::ArchivedApkMetadata(_)) => "archived",
        Some(ApkMetadataOneof::ApexApkMetadata(_)) => "apex",
        None => "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pack_model::targeting::{ApkTargeting, VariantTargeting};
    use pack_proto::aapt::pb::XmlNode;

    fn split(module: &str, split_type: SplitType, is_master: bool) -> ModuleSplit {
        ModuleSplit {
            module_name: module.to_string(),
            split_type,
            is_master,
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
    fn apk_sets_are_ordered_by_module_name() {
        let variant = Variant {
            number: 0,
            targeting: VariantTargeting::default(),
            splits: vec![split("zeta", SplitType::Split, true), split("alpha", SplitType::Split, true)]
        };
        let paths = vec!["splits/zeta-master.apk".to_string(), "splits/alpha-master.apk".to_string()];
        let result = build(&[variant], &[vec![0, 1]], &paths, "1.0.0".to_string());

        let names: Vec<&str> = result.variant[0]
            .apk_set
            .iter()
            .map(|set| set.module_metadata.as_ref().unwrap().name.as_str())
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn duplicate_occurrences_share_one_path() {
        let variant = Variant {
            number: 2,
            targeting: VariantTargeting::default(),
            splits: vec![split("base", SplitType::Split, true)]
        };
        let paths = vec!["splits/base-master.apk".to_string(), "splits/other.apk".to_string()];
        let result = build(&[variant], &[vec![1]], &paths, "1.0.0".to_string());
        assert_eq!(result.variant[0].apk_set[0].apk_description[0].path, "splits/other.apk");
    }

    #[test]
    fn standalone_apex_split_gets_apex_metadata() {
        let mut apex = split("base", SplitType::Standalone, true);
        apex.is_apex = true;
        let variant = Variant { number: 0, targeting: VariantTargeting::default(), splits: vec![apex] };
        let result = build(&[variant], &[vec![0]], &["standalones/standalone-arm64_v8a.apex".to_string()], "1.0.0".to_string());
        assert!(matches!(
            result.variant[0].apk_set[0].apk_description[0].apk_metadata_oneof,
            Some(ApkMetadataOneof::ApexApkMetadata(_))
        ));
    }

    #[test]
    fn summary_lists_variants_modules_and_paths() {
        let variant = Variant { number: 0, targeting: VariantTargeting::default(), splits: vec![split("base", SplitType::Split, true)] };
        let result = build(&[variant], &[vec![0]], &["splits/base-master.apk".to_string()], "1.0.0".to_string());
        let rendered = TocSummary(&result).to_string();
        assert!(rendered.contains("bundletool_version: 1.0.0"));
        assert!(rendered.contains("variant 0"));
        assert!(rendered.contains("module base"));
        assert!(rendered.contains("splits/base-master.apk (split)"));
    }

    #[test]
    fn variant_number_and_targeting_are_carried_through() {
        let variant = Variant { number: 7, targeting: VariantTargeting::default(), splits: vec![split("base", SplitType::Split, true)] };
        let result = build(&[variant], &[vec![0]], &["splits/base-master.apk".to_string()], "1.0.0".to_string());
        assert_eq!(result.variant[0].variant_number, 7);
        assert!(result.variant[0].targeting.is_some());
    }
}
