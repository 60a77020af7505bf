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

/// The device attributes §4.I's matchers compare targeting against.
/// `None` on a field means the device spec doesn't provide that
/// dimension at all (distinct from providing an empty list), which
/// matters for `InvalidDeviceSpec` (spec §4.I, §7).
#[derive(Debug, Clone, Default)]
pub struct DeviceSpec {
    pub abi: Option<String>,
    pub screen_density: Option<i32>,
    /// BCP-47 locale tags, most preferred first.
    pub supported_locales: Option<Vec<String>>,
    pub sdk_version: Option<i32>,
    pub supported_texture_compression_formats: Option<Vec<String>>,
    pub device_tier: Option<i32>,
    pub country_set: Option<String>,
    pub supports_multi_abi: Option<bool>,
    pub sdk_runtime_supported: Option<bool>
}
