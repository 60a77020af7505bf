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

//! Per-split signing scheme policy determination (spec §4.F). v2 has no
//! gate of its own: every split gets a v2 block regardless of targeting.

const ANDROID_N: u32 = 24;
const ANDROID_R: u32 = 30;

/// Everything the policy decision needs, collected from the split's own
/// manifest/targeting plus the caller's [crate::SigningConfig].
pub struct SigningPolicyInputs {
    pub effective_min_sdk: u32,
    pub manifest_min_sdk: u32,
    pub apk_targeting_min_sdk: u32,
    pub no_v1_when_possible: bool,
    pub restrict_v3_to_r_plus: bool
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigningPolicy {
    pub sign_with_v1: bool,
    pub sign_with_v3: bool
}

impl SigningPolicy {
    pub fn decide(inputs: &SigningPolicyInputs) -> SigningPolicy {
        let sign_with_v1 = inputs.effective_min_sdk < ANDROID_N || !inputs.no_v1_when_possible;
        let sign_with_v3 = inputs.manifest_min_sdk.max(inputs.apk_targeting_min_sdk) >= ANDROID_R
            || !inputs.restrict_v3_to_r_plus;
        SigningPolicy { sign_with_v1, sign_with_v3 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(effective_min_sdk: u32, manifest_min_sdk: u32, apk_targeting_min_sdk: u32) -> SigningPolicyInputs {
        SigningPolicyInputs {
            effective_min_sdk,
            manifest_min_sdk,
            apk_targeting_min_sdk,
            no_v1_when_possible: true,
            restrict_v3_to_r_plus: true
        }
    }

    #[test]
    fn v1_required_below_android_n_regardless_of_feature_flag() {
        let policy = SigningPolicy::decide(&inputs(21, 21, 0));
        assert!(policy.sign_with_v1);
    }

    #[test]
    fn v1_skipped_at_or_above_android_n_when_feature_flag_is_set() {
        let policy = SigningPolicy::decide(&inputs(26, 26, 0));
        assert!(!policy.sign_with_v1);
    }

    #[test]
    fn v1_always_required_when_feature_flag_is_unset() {
        let mut inputs = inputs(30, 30, 0);
        inputs.no_v1_when_possible = false;
        assert!(SigningPolicy::decide(&inputs).sign_with_v1);
    }

    #[test]
    fn v3_required_at_or_above_android_r_even_when_restricted() {
        let policy = SigningPolicy::decide(&inputs(30, 30, 30));
        assert!(policy.sign_with_v3);
    }

    #[test]
    fn v3_skipped_below_android_r_when_restricted() {
        let policy = SigningPolicy::decide(&inputs(26, 26, 26));
        assert!(!policy.sign_with_v3);
    }

    #[test]
    fn v3_always_applied_when_restriction_is_disabled() {
        let mut inputs = inputs(21, 21, 21);
        inputs.restrict_v3_to_r_plus = false;
        assert!(SigningPolicy::decide(&inputs).sign_with_v3);
    }

    #[test]
    fn v3_threshold_uses_the_larger_of_manifest_and_targeting_min_sdk() {
        let policy = SigningPolicy::decide(&inputs(21, 18, 30));
        assert!(policy.sign_with_v3);
    }
}
