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

//! Groups splits into variants, numbers them densely, and applies the
//! mode/content invariants of spec §4.H and §7.

use std::collections::HashMap;

use pack_common::{PackError, Result};
use pack_model::targeting::{ApkTargeting, VariantTargeting};
use pack_model::{ApkBuildMode, ModuleSplit, SplitType, VariantKey};

/// One group of splits sharing a `VariantKey`, numbered densely from
/// the caller's offset.
#[derive(Debug, Clone)]
pub struct Variant {
    pub number: i32,
    pub targeting: VariantTargeting,
    pub splits: Vec<ModuleSplit>
}

/// Called once per split before its `variantTargeting` is cleared
/// (spec §4.H step 3). `is_base` is whether the split belongs to the
/// base module; `is_master` is `split.is_master` (standalone/system
/// splits have no "config split" concept, so this single flag covers
/// the spec's "isMaster|isStandalone|isConfig" distinction — the
/// caller still has the full `ModuleSplit`, including `split_type`,
/// to tell standalone/system splits apart from configuration splits).
pub type ManifestModifier<'a> =
    dyn FnMut(&mut ModuleSplit, i32, bool, bool, &ApkTargeting, &VariantTargeting) + 'a;

/// Groups `splits` by `VariantKey`, assigns dense variant numbers
/// starting at `first_variant_number`, runs `manifest_modifier` (if
/// given) on every split, clears each split's `variantTargeting`,
/// dedupes identical splits within a variant, and validates the
/// mode/content invariants (spec §7) for `mode`.
pub fn build_variants(
    splits: Vec<ModuleSplit>,
    first_variant_number: i32,
    mode: ApkBuildMode,
    manifest_modifier: Option<&mut ManifestModifier<'_>>
) -> Result<Vec<Variant>> {
    let mut order: Vec<VariantKey> = Vec::new();
    let mut groups: HashMap<VariantKey, Vec<ModuleSplit>> = HashMap::new();

    for split in splits {
        let key = VariantKey::from_targeting(&split.variant_targeting);
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(split);
    }

    let mut manifest_modifier = manifest_modifier;
    let mut variants = Vec::with_capacity(order.len());

    for (offset, key) in order.into_iter().enumerate() {
        let number = first_variant_number + offset as i32;
        let mut members = groups.remove(&key).expect("grouped key must be present");
        let targeting = members[0].variant_targeting.clone();

        for split in members.iter_mut() {
            let is_base = split.is_base_module();
            let is_master = split.is_master;
            let apk_targeting = split.apk_targeting.clone();
            let variant_targeting = split.variant_targeting.clone();
            if let Some(ref mut modifier) = manifest_modifier {
                modifier(split, number, is_base, is_master, &apk_targeting, &variant_targeting);
            }
            split.variant_targeting = VariantTargeting::default();
        }

        let mut deduped: Vec<ModuleSplit> = Vec::with_capacity(members.len());
        for split in members {
            if !deduped.contains(&split) {
                deduped.push(split);
            }
        }

        variants.push(Variant { number, targeting, splits: deduped });
    }

    validate_mode_invariants(mode, &variants)?;
    Ok(variants)
}

fn validate_mode_invariants(mode: ApkBuildMode, variants: &[Variant]) -> Result<()> {
    let splits: Vec<&ModuleSplit> = variants.iter().flat_map(|v| v.splits.iter()).collect();

    match mode {
        ApkBuildMode::Default => {
            if splits.iter().any(|s| s.split_type == SplitType::System) {
                return Err(PackError::InvalidCommand("DEFAULT build mode forbids SYSTEM splits.".to_string()));
            }
        }
        ApkBuildMode::Universal => {
            if splits.iter().any(|s| s.split_type != SplitType::Standalone) {
                return Err(PackError::InvalidCommand("UNIVERSAL build mode requires every split to be STANDALONE.".to_string()));
            }
        }
        ApkBuildMode::System | ApkBuildMode::SystemCompressed => {
            if splits.iter().any(|s| matches!(s.split_type, SplitType::Split | SplitType::Instant | SplitType::Standalone)) {
                return Err(PackError::InvalidCommand("SYSTEM build modes forbid SPLIT, INSTANT, and STANDALONE splits.".to_string()));
            }
        }
        ApkBuildMode::Archive | ApkBuildMode::Instant => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pack_model::targeting::{SdkVersion, SdkVersionTargeting};
    use pack_proto::aapt::pb::XmlNode;

    fn split(module: &str, split_type: SplitType, is_master: bool, variant_targeting: VariantTargeting) -> ModuleSplit {
        ModuleSplit {
            module_name: module.to_string(),
            split_type,
            is_master,
            is_apex: false,
            apk_targeting: ApkTargeting::default(),
            variant_targeting,
            entries: vec![],
            manifest: XmlNode::default(),
            resource_table: None,
            suffix: String::new()
        }
    }

    fn sdk_variant_targeting(min: i32) -> VariantTargeting {
        VariantTargeting {
            sdk_version_targeting: Some(SdkVersionTargeting { value: vec![SdkVersion { min }], alternatives: vec![] }),
            ..Default::default()
        }
    }

    #[test]
    fn groups_by_variant_key_and_numbers_densely() {
        let splits = vec![
            split("base", SplitType::Split, true, sdk_variant_targeting(21)),
            split("base", SplitType::Split, true, sdk_variant_targeting(29)),
            split("feature", SplitType::Split, true, sdk_variant_targeting(21))
        ];

        let variants = build_variants(splits, 0, ApkBuildMode::Default, None).unwrap();
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].number, 0);
        assert_eq!(variants[0].splits.len(), 2);
        assert_eq!(variants[1].number, 1);
        assert_eq!(variants[1].splits.len(), 1);
    }

    #[test]
    fn variant_numbers_start_at_caller_offset() {
        let splits = vec![split("base", SplitType::Split, true, sdk_variant_targeting(21))];
        let variants = build_variants(splits, 5, ApkBuildMode::Default, None).unwrap();
        assert_eq!(variants[0].number, 5);
    }

    #[test]
    fn variant_targeting_is_cleared_after_grouping() {
        let splits = vec![split("base", SplitType::Split, true, sdk_variant_targeting(21))];
        let variants = build_variants(splits, 0, ApkBuildMode::Default, None).unwrap();
        assert_eq!(variants[0].splits[0].variant_targeting, VariantTargeting::default());
    }

    #[test]
    fn identical_splits_within_a_variant_are_deduped() {
        let splits = vec![
            split("base", SplitType::Split, true, sdk_variant_targeting(21)),
            split("base", SplitType::Split, true, sdk_variant_targeting(21))
        ];
        let variants = build_variants(splits, 0, ApkBuildMode::Default, None).unwrap();
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].splits.len(), 1);
    }

    #[test]
    fn manifest_modifier_runs_before_targeting_is_cleared() {
        let splits = vec![split("base", SplitType::Split, true, sdk_variant_targeting(21))];
        let mut seen_targeting_was_non_default = false;
        let mut modifier = |_: &mut ModuleSplit, number: i32, is_base: bool, is_master: bool, _: &ApkTargeting, targeting: &VariantTargeting| {
            assert_eq!(number, 0);
            assert!(is_base);
            assert!(is_master);
            seen_targeting_was_non_default = *targeting != VariantTargeting::default();
        };
        build_variants(splits, 0, ApkBuildMode::Default, Some(&mut modifier)).unwrap();
        assert!(seen_targeting_was_non_default);
    }

    #[test]
    fn default_mode_rejects_system_splits() {
        let splits = vec![split("base", SplitType::System, true, VariantTargeting::default())];
        let err = build_variants(splits, 0, ApkBuildMode::Default, None).unwrap_err();
        assert!(matches!(err, PackError::InvalidCommand(_)));
    }

    #[test]
    fn universal_mode_rejects_non_standalone_splits() {
        let splits = vec![split("base", SplitType::Split, true, VariantTargeting::default())];
        let err = build_variants(splits, 0, ApkBuildMode::Universal, None).unwrap_err();
        assert!(matches!(err, PackError::InvalidCommand(_)));
    }

    #[test]
    fn universal_mode_accepts_standalone_splits() {
        let splits = vec![split("base", SplitType::Standalone, true, VariantTargeting::default())];
        let variants = build_variants(splits, 0, ApkBuildMode::Universal, None).unwrap();
        assert_eq!(variants.len(), 1);
    }

    #[test]
    fn system_mode_rejects_split_type_splits() {
        let splits = vec![split("base", SplitType::Split, true, VariantTargeting::default())];
        let err = build_variants(splits, 0, ApkBuildMode::System, None).unwrap_err();
        assert!(matches!(err, PackError::InvalidCommand(_)));
    }
}
