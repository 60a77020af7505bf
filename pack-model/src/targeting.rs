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

//! Targeting types are the generated protobuf messages themselves
//! (`pack_proto::android::bundle::{ApkTargeting, VariantTargeting, ...}`):
//! spec.md already describes them as "normalized sum-of-dimensions
//! structures", which is exactly bundletool's wire shape, so there's no
//! separate domain type to maintain in parallel.

pub use pack_proto::android::bundle::{
    Abi, AbiTargeting, ApkTargeting, CountrySet, CountrySetTargeting, DeviceTier,
    DeviceTierTargeting, LanguageTargeting, MultiAbi, MultiAbiTargeting, ScreenDensity,
    ScreenDensityTargeting, SdkRuntime, SdkRuntimeTargeting, SdkVersion, SdkVersionTargeting,
    TextureCompressionFormat, TextureCompressionFormatTargeting, VariantTargeting
};
use prost::Message;

/// The unique targeting fingerprint of a variant (spec §3 `VariantKey`).
/// Computed as the canonical proto-encoded bytes of a `VariantTargeting`
/// so it can key a `HashMap` without requiring prost to derive `Eq`/`Hash`
/// (float-bearing protobuf messages can't derive them in general).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariantKey(Vec<u8>);

impl VariantKey {
    pub fn from_targeting(targeting: &VariantTargeting) -> VariantKey {
        VariantKey(targeting.encode_to_vec())
    }
}

/// True when a dimension carries no restriction: empty `values` and
/// empty `alternatives`. Used throughout device matching (§4.I) and
/// variant grouping (§4.H).
pub fn is_default<T>(values: &[T], alternatives: &[T]) -> bool {
    values.is_empty() && alternatives.is_empty()
}

pub fn abi_is_default(t: &AbiTargeting) -> bool {
    is_default(&t.value, &t.alternatives)
}

pub fn screen_density_is_default(t: &ScreenDensityTargeting) -> bool {
    is_default(&t.value, &t.alternatives)
}

pub fn language_is_default(t: &LanguageTargeting) -> bool {
    is_default(&t.value, &t.alternatives)
}

pub fn sdk_version_is_default(t: &SdkVersionTargeting) -> bool {
    is_default(&t.value, &t.alternatives)
}

pub fn texture_compression_format_is_default(t: &TextureCompressionFormatTargeting) -> bool {
    is_default(&t.value, &t.alternatives)
}

pub fn device_tier_is_default(t: &DeviceTierTargeting) -> bool {
    is_default(&t.value, &t.alternatives)
}

pub fn country_set_is_default(t: &CountrySetTargeting) -> bool {
    is_default(&t.value, &t.alternatives)
}

pub fn multi_abi_is_default(t: &MultiAbiTargeting) -> bool {
    is_default(&t.value, &t.alternatives)
}

pub fn sdk_runtime_is_default(t: &SdkRuntimeTargeting) -> bool {
    is_default(&t.value, &t.alternatives)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_targeting_produces_identical_key() {
        let a = VariantTargeting {
            sdk_version_targeting: Some(SdkVersionTargeting {
                value: vec![SdkVersion { min: 21 }],
                alternatives: vec![]
            }),
            ..Default::default()
        };
        let b = a.clone();
        assert_eq!(VariantKey::from_targeting(&a), VariantKey::from_targeting(&b));
    }

    #[test]
    fn differing_targeting_produces_differing_key() {
        let a = VariantTargeting {
            sdk_version_targeting: Some(SdkVersionTargeting {
                value: vec![SdkVersion { min: 21 }],
                alternatives: vec![]
            }),
            ..Default::default()
        };
        let b = VariantTargeting {
            sdk_version_targeting: Some(SdkVersionTargeting {
                value: vec![SdkVersion { min: 24 }],
                alternatives: vec![]
            }),
            ..Default::default()
        };
        assert_ne!(VariantKey::from_targeting(&a), VariantKey::from_targeting(&b));
    }

    #[test]
    fn default_targeting_detected() {
        assert!(abi_is_default(&AbiTargeting::default()));
        let non_default = AbiTargeting {
            value: vec![Abi { alias: 3 }],
            alternatives: vec![]
        };
        assert!(!abi_is_default(&non_default));
    }
}
