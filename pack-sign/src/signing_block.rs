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

use crate::{
    crypto::get_signature_for_signed_data,
    crypto_keys::Keys,
    signing_types::{
        ApkSigningBlock, SignatureSchemeV2Block, SignatureSchemeV3Block, SignedData, V3SignedData
    }
};
use pack_common::Result;

/// `min_sdk` is the split's effective min-SDK (spec §4.F); the V3 block,
/// when included, advertises it as its signer's lower bound. `sign_with_v3`
/// is the §4.F `signWithV3` policy decision — `false` omits the V3 pair
/// entirely rather than include one with a lowered bound, since a missing
/// V3 block is what actually gets a verifier to fall back to V2.
pub fn compute_signing_block(
    top_level_hash: [u8; 32],
    keys: &Keys,
    min_sdk: u32,
    sign_with_v3: bool
) -> Result<ApkSigningBlock> {
    // We deal with this unsigned, but it seems Android parses it as signed, hence the 7F.
    let max_sdk = 0x7FFFFFFF;
    // Construct the data block that we're going to sign
    // NOTE: The signature does NOT include the length prefix
    let signed_data = SignedData::new(top_level_hash, keys);
    // Sign it with RSA
    let signature = get_signature_for_signed_data(&signed_data, keys)?;
    // Create the V2 Scheme block, always present
    let scheme_block = SignatureSchemeV2Block::new(signed_data.clone(), signature, keys)?;

    let v3_scheme_block = if sign_with_v3 {
        let v3_signed_data = V3SignedData::from(&signed_data, min_sdk, max_sdk);
        let v3_signature = get_signature_for_signed_data(&v3_signed_data, keys)?;
        Some(SignatureSchemeV3Block::new(v3_signed_data, v3_signature, keys, min_sdk, max_sdk)?)
    } else {
        None
    };

    // Create and serialise the entire APK Signing Block that goes straight into the zip file
    let signing_block = ApkSigningBlock::new(scheme_block, v3_scheme_block)?;
    Ok(signing_block)
}
