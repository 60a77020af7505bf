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

//! Decides whether a device spec matches a split's `ApkTargeting` (spec
//! §4.I). Each dimension is checked independently; a split matches iff
//! every non-default dimension admits the device. A dimension the
//! device spec doesn't provide but the bundle targets raises
//! `InvalidDeviceSpec`, except `deviceTier`, which defaults to tier 0
//! when absent.

use pack_common::{PackError, Result};
use pack_model::targeting::{
    abi_is_default, country_set_is_default, device_tier_is_default, language_is_default,
    multi_abi_is_default, sdk_runtime_is_default, sdk_version_is_default,
    texture_compression_format_is_default, AbiTargeting, CountrySetTargeting,
    DeviceTierTargeting, LanguageTargeting, MultiAbiTargeting, ScreenDensity,
    ScreenDensityTargeting, SdkRuntimeTargeting, SdkVersionTargeting,
    TextureCompressionFormatTargeting
};
use pack_model::{DeviceSpec, ModuleSplit};

/// True iff `device` satisfies every dimension of `split`'s targeting.
pub fn matches(split: &ModuleSplit, device: &DeviceSpec) -> Result<bool> {
    let targeting = &split.apk_targeting;

    Ok(abi_matches(device, targeting.abi_targeting.as_ref())?
        && density_matches(device, targeting.screen_density_targeting.as_ref())?
        && language_matches(device, targeting.language_targeting.as_ref())?
        && sdk_matches(device, targeting.sdk_version_targeting.as_ref())?
        && texture_matches(device, targeting.texture_compression_format_targeting.as_ref())?
        && device_tier_matches(device, targeting.device_tier_targeting.as_ref())?
        && country_set_matches(device, targeting.country_set_targeting.as_ref())?
        && multi_abi_matches(device, targeting.multi_abi_targeting.as_ref())?
        && sdk_runtime_matches(device, targeting.sdk_runtime_targeting.as_ref())?)
}

fn missing(dimension: &str) -> PackError {
    PackError::InvalidDeviceSpec(format!("Device spec does not provide \"{dimension}\", but the bundle targets it."))
}

/// Canonical membership rule shared by the "simple bucket" dimensions
/// (texture compression, device tier, country set, multi-ABI, SDK
/// runtime): a non-empty `values` is an explicit allowlist, an empty
/// one is the fallback bucket that only matches devices no sibling
/// bucket claims via `alternatives`.
fn fallback_match<T>(values: &[T], alternatives: &[T], admits: impl Fn(&T) -> bool) -> bool {
    if values.is_empty() {
        !alternatives.iter().any(&admits)
    } else {
        values.iter().any(&admits)
    }
}

fn abi_matches(device: &DeviceSpec, targeting: Option<&AbiTargeting>) -> Result<bool> {
    let Some(targeting) = targeting else { return Ok(true) };
    if abi_is_default(targeting) {
        return Ok(true);
    }
    let raw = device.abi.as_deref().ok_or_else(|| missing("abi"))?;
    let alias = parse_abi_alias(raw).ok_or_else(|| {
        PackError::InvalidDeviceSpec(format!("Device spec names unrecognised ABI \"{raw}\"."))
    })?;
    Ok(targeting.value.iter().any(|a| a.alias == alias))
}

fn parse_abi_alias(name: &str) -> Option<i32> {
    Some(match name {
        "armeabi" => 1,
        "armeabi-v7a" => 2,
        "arm64-v8a" => 3,
        "x86" => 4,
        "x86_64" => 5,
        "mips" => 6,
        "mips64" => 7,
        "riscv64" => 8,
        _ => return None
    })
}

/// Standard Android density buckets, in dots per inch.
fn alias_to_dpi(alias: i32) -> i32 {
    match alias {
        2 => 120,  // LDPI
        3 => 160,  // MDPI
        4 => 213,  // TVDPI
        5 => 240,  // HDPI
        6 => 320,  // XHDPI
        7 => 480,  // XXHDPI
        8 => 640,  // XXXHDPI
        _ => 160   // NODPI / ANY_DENSITY and unknown aliases fall back to baseline
    }
}

fn density_to_dpi(density: &ScreenDensity) -> i32 {
    use pack_proto::android::bundle::screen_density::DensityOneof;
    match density.density_oneof {
        Some(DensityOneof::DensityDpi(dpi)) => dpi,
        Some(DensityOneof::DensityAlias(alias)) => alias_to_dpi(alias),
        None => 160
    }
}

/// Nearest-bucket rule: among every bucket this targeting or its
/// siblings declare, the device picks whichever is numerically
/// closest to its own density and matches iff that bucket belongs to
/// this targeting's own `value` list.
fn density_matches(device: &DeviceSpec, targeting: Option<&ScreenDensityTargeting>) -> Result<bool> {
    let Some(targeting) = targeting else { return Ok(true) };
    if pack_model::targeting::screen_density_is_default(targeting) {
        return Ok(true);
    }
    let device_dpi = device.screen_density.ok_or_else(|| missing("screen_density"))?;

    let own: Vec<i32> = targeting.value.iter().map(density_to_dpi).collect();
    let all_buckets = own.iter().copied().chain(targeting.alternatives.iter().map(density_to_dpi));

    let nearest = all_buckets.min_by_key(|&bucket| (bucket - device_dpi).abs());
    Ok(nearest.map_or(false, |n| own.contains(&n)))
}

fn language_matches(device: &DeviceSpec, targeting: Option<&LanguageTargeting>) -> Result<bool> {
    let Some(targeting) = targeting else { return Ok(true) };
    if language_is_default(targeting) {
        return Ok(true);
    }
    let locales = device.supported_locales.as_ref().ok_or_else(|| missing("supported_locales"))?;
    Ok(locales.iter().any(|locale| targeting.value.contains(locale)))
}

fn sdk_matches(device: &DeviceSpec, targeting: Option<&SdkVersionTargeting>) -> Result<bool> {
    let Some(targeting) = targeting else { return Ok(true) };
    if sdk_version_is_default(targeting) {
        return Ok(true);
    }
    let device_sdk = device.sdk_version.ok_or_else(|| missing("sdk_version"))?;

    let min_value = targeting.value.iter().map(|v| v.min).min().unwrap_or(1);
    if device_sdk < min_value {
        return Ok(false);
    }
    let upper_bound = targeting.alternatives.iter().map(|v| v.min).filter(|&min| min > min_value).min();
    Ok(upper_bound.map_or(true, |bound| device_sdk < bound))
}

fn texture_matches(device: &DeviceSpec, targeting: Option<&TextureCompressionFormatTargeting>) -> Result<bool> {
    let Some(targeting) = targeting else { return Ok(true) };
    if texture_compression_format_is_default(targeting) {
        return Ok(true);
    }
    let formats = device
        .supported_texture_compression_formats
        .as_ref()
        .ok_or_else(|| missing("supported_texture_compression_formats"))?;
    let device_aliases: Vec<i32> = formats.iter().filter_map(|f| parse_texture_alias(f)).collect();

    Ok(fallback_match(&targeting.value, &targeting.alternatives, |bucket| {
        device_aliases.contains(&bucket.alias)
    }))
}

fn parse_texture_alias(name: &str) -> Option<i32> {
    Some(match name {
        "etc1_rgb8" => 1,
        "palette" => 2,
        "astc" => 3,
        "atc" => 4,
        "dxt1" => 5,
        "latc" => 6,
        "pvrtc" => 7,
        "3dc" => 8,
        "s3tc" => 9,
        _ => return None
    })
}

/// Device tiers default to 0 when absent rather than raising
/// `InvalidDeviceSpec`, since an un-tiered device is a normal case
/// (spec §4.I), not a malformed one.
fn device_tier_matches(device: &DeviceSpec, targeting: Option<&DeviceTierTargeting>) -> Result<bool> {
    let Some(targeting) = targeting else { return Ok(true) };
    if device_tier_is_default(targeting) {
        return Ok(true);
    }
    let tier = device.device_tier.unwrap_or(0);
    Ok(fallback_match(&targeting.value, &targeting.alternatives, |bucket| bucket.value == tier))
}

fn country_set_matches(device: &DeviceSpec, targeting: Option<&CountrySetTargeting>) -> Result<bool> {
    let Some(targeting) = targeting else { return Ok(true) };
    if country_set_is_default(targeting) {
        return Ok(true);
    }
    let country_set = device.country_set.as_ref().ok_or_else(|| missing("country_set"))?;
    Ok(fallback_match(&targeting.value, &targeting.alternatives, |bucket| {
        bucket.value.iter().any(|v| v == country_set)
    }))
}

/// The device spec only tells us whether the device can run a
/// multi-ABI split at all, not which ABI combination; so a non-empty
/// bucket matches iff the device supports multi-ABI, and the fallback
/// (empty) bucket matches the rest.
fn multi_abi_matches(device: &DeviceSpec, targeting: Option<&MultiAbiTargeting>) -> Result<bool> {
    let Some(targeting) = targeting else { return Ok(true) };
    if multi_abi_is_default(targeting) {
        return Ok(true);
    }
    let supports = device.supports_multi_abi.ok_or_else(|| missing("supports_multi_abi"))?;
    Ok(fallback_match(&targeting.value, &targeting.alternatives, |_| supports))
}

fn sdk_runtime_matches(device: &DeviceSpec, targeting: Option<&SdkRuntimeTargeting>) -> Result<bool> {
    let Some(targeting) = targeting else { return Ok(true) };
    if sdk_runtime_is_default(targeting) {
        return Ok(true);
    }
    let supported = device.sdk_runtime_supported.ok_or_else(|| missing("sdk_runtime_supported"))?;
    Ok(fallback_match(&targeting.value, &targeting.alternatives, |bucket| {
        bucket.requires_sdk_runtime == supported
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pack_model::targeting::{Abi, ApkTargeting, SdkVersion, VariantTargeting};
    use pack_model::SplitType;
    use pack_proto::aapt::pb::XmlNode;

    fn split_with_targeting(apk_targeting: ApkTargeting) -> ModuleSplit {
        ModuleSplit {
            module_name: "base".to_string(),
            split_type: SplitType::Split,
            is_master: false,
            is_apex: false,
            apk_targeting,
            variant_targeting: VariantTargeting::default(),
            entries: vec![],
            manifest: XmlNode::default(),
            resource_table: None,
            suffix: "hdpi".to_string()
        }
    }

    fn device(abi: &str, sdk: i32, density: i32) -> DeviceSpec {
        DeviceSpec {
            abi: Some(abi.to_string()),
            screen_density: Some(density),
            supported_locales: Some(vec!["en-US".to_string()]),
            sdk_version: Some(sdk),
            supported_texture_compression_formats: Some(vec!["astc".to_string()]),
            device_tier: None,
            country_set: None,
            supports_multi_abi: Some(false),
            sdk_runtime_supported: Some(false)
        }
    }

    #[test]
    fn matching_abi_and_sdk_admits_device() {
        let split = split_with_targeting(ApkTargeting {
            abi_targeting: Some(AbiTargeting { value: vec![Abi { alias: 3 }], alternatives: vec![] }),
            sdk_version_targeting: Some(SdkVersionTargeting { value: vec![SdkVersion { min: 21 }], alternatives: vec![] }),
            ..Default::default()
        });
        assert!(matches(&split, &device("arm64-v8a", 30, 480)).unwrap());
    }

    #[test]
    fn mismatched_abi_rejects_device() {
        let split = split_with_targeting(ApkTargeting {
            abi_targeting: Some(AbiTargeting { value: vec![Abi { alias: 2 }], alternatives: vec![] }),
            ..Default::default()
        });
        assert!(!matches(&split, &device("arm64-v8a", 30, 480)).unwrap());
    }

    fn density_alias(alias: i32) -> ScreenDensity {
        use pack_proto::android::bundle::screen_density::DensityOneof;
        ScreenDensity { density_oneof: Some(DensityOneof::DensityAlias(alias)) }
    }

    #[test]
    fn density_split_rejects_device_nearer_another_bucket() {
        let split = split_with_targeting(ApkTargeting {
            screen_density_targeting: Some(ScreenDensityTargeting {
                value: vec![density_alias(5)],        // HDPI, 240
                alternatives: vec![density_alias(6)]   // XHDPI, 320
            }),
            ..Default::default()
        });
        // Device at 310dpi is nearer XHDPI (320) than HDPI (240), so the HDPI split must not match.
        assert!(!matches(&split, &device("arm64-v8a", 30, 310)).unwrap());
    }

    #[test]
    fn density_split_admits_device_nearer_its_own_bucket() {
        let split = split_with_targeting(ApkTargeting {
            screen_density_targeting: Some(ScreenDensityTargeting {
                value: vec![density_alias(5)],
                alternatives: vec![density_alias(6)]
            }),
            ..Default::default()
        });
        assert!(matches(&split, &device("arm64-v8a", 30, 250)).unwrap());
    }

    #[test]
    fn missing_dimension_used_by_bundle_is_invalid_device_spec() {
        let split = split_with_targeting(ApkTargeting {
            abi_targeting: Some(AbiTargeting { value: vec![Abi { alias: 3 }], alternatives: vec![] }),
            ..Default::default()
        });
        let mut spec = device("arm64-v8a", 30, 480);
        spec.abi = None;
        let err = matches(&split, &spec).unwrap_err();
        assert!(matches!(err, PackError::InvalidDeviceSpec(_)));
    }

    #[test]
    fn missing_device_tier_defaults_to_zero() {
        let split = split_with_targeting(ApkTargeting {
            device_tier_targeting: Some(DeviceTierTargeting {
                value: vec![pack_model::targeting::DeviceTier { value: 0 }],
                alternatives: vec![pack_model::targeting::DeviceTier { value: 1 }]
            }),
            ..Default::default()
        });
        assert!(matches(&split, &device("arm64-v8a", 30, 480)).unwrap());
    }

    #[test]
    fn sdk_version_within_alternatives_window_matches() {
        let split = split_with_targeting(ApkTargeting {
            sdk_version_targeting: Some(SdkVersionTargeting {
                value: vec![SdkVersion { min: 21 }],
                alternatives: vec![SdkVersion { min: 29 }]
            }),
            ..Default::default()
        });
        assert!(matches(&split, &device("arm64-v8a", 25, 480)).unwrap());
        assert!(!matches(&split, &device("arm64-v8a", 29, 480)).unwrap());
    }
}
