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

use std::path::Path;

use crypto_keys::Keys;
use deku::DekuContainerWrite;
use hasher::compute_top_level_hash;
use pack_common::Result;
use pack_zip::{ArchiveReader, ArchiveWriter, CompressionMethod};
pub use policy::{SigningPolicy, SigningPolicyInputs};
use signing_block::compute_signing_block;
use zip_parser::find_offsets;
use zip_rebuilder::rebuild_zip_with_signing_block;

mod crypto;
pub mod crypto_keys;
mod hasher;
mod policy;
mod signed_data_block;
mod signing_block;
mod signing_types;
pub mod v1_signing;
mod zip_parser;
mod zip_rebuilder;

// APK Signature Scheme v2 based on https://source.android.com/docs/security/features/apksigning/v2
// APK Signature Scheme v3 based on https://source.android.com/docs/security/features/apksigning/v3
/// Signs a ZIP file buffer, adding an APK Signature Block before its Central Directory.
/// Can be used for both APK and AAB files. `sign_with_v3` is spec §4.F's
/// per-split `signWithV3` decision; `min_sdk` becomes the V3 signer's
/// advertised lower bound when it's included.
pub fn sign_apk_buffer(apk_buf: &mut [u8], keys: &Keys, min_sdk: u32, sign_with_v3: bool) -> Result<Vec<u8>> {
    // Dry-run the block to figure out how long it will be given our key
    let dry_run = compute_signing_block([0; 32], keys, min_sdk, sign_with_v3)?;
    let signing_block_size = dry_run.to_bytes()?.len();
    // Read ZIP file to find central directory
    let offsets = find_offsets(apk_buf)?;
    // SHA-256 hash of ZIP contents (accounting for APK Signing Block)
    let top_level_hash = compute_top_level_hash(apk_buf, &offsets, signing_block_size)?;
    // Compute again using the real hash this time
    let signing_block = compute_signing_block(top_level_hash, keys, min_sdk, sign_with_v3)?;
    // Build up the final zip file again
    rebuild_zip_with_signing_block(&offsets, apk_buf, signing_block)
}

/// Rewrites `input_path`'s zip, inserting the three `META-INF` v1/JAR
/// signature entries (spec §4.F "Sign APK v1"). Every existing entry is
/// carried over bit-exact via [pack_zip::copy_entry]; only the alignment
/// of stored entries is recomputed, since the original `ArchiveWriter`
/// call that picked it isn't available here. This mirrors the alignment
/// rule `pack-writer` applies to everything except asset-slice `assets/`
/// entries, which this step has no way to distinguish from a regular
/// split's.
fn apply_v1_signature(apk_buf: &[u8], keys: &Keys) -> Result<Vec<u8>> {
    let reader = ArchiveReader::from_bytes(apk_buf.to_vec())?;
    let mut decompressed_files: Vec<pack_zip::File> = reader
        .entries()
        .iter()
        .map(|entry| Ok(pack_zip::File { path: entry.name.clone(), data: reader.decompressed_bytes(entry)? }))
        .collect::<Result<_>>()?;

    let existing_count = decompressed_files.len();
    v1_signing::add_v1_signature_files(&mut decompressed_files, keys)?;
    let signature_files = &decompressed_files[existing_count..];

    let mut writer = ArchiveWriter::new(Vec::new());
    for entry in reader.entries() {
        let alignment = match entry.method {
            CompressionMethod::Deflated => 1,
            CompressionMethod::Stored if entry.name.starts_with("lib/") && entry.name.ends_with(".so") => 4096,
            CompressionMethod::Stored => 4
        };
        pack_zip::copy_entry(&mut writer, &reader, entry, &entry.name, alignment)?;
    }
    for file in signature_files {
        writer.append(&file.path, CompressionMethod::Deflated, 4, &file.data)?;
    }
    writer.finish()
}

/// The spec §4.F signer entrypoint: reads the unsigned APK at
/// `input_path`, applies v1/v2/v3 per `policy`, and atomically replaces
/// `input_path` with the signed result written to `output_path`.
/// `output_path` may equal `input_path`.
///
/// `lineage` and a source-stamp signature (both optional per §4.F) are
/// accepted by [pack_model::SigningConfig] one layer up but are not yet
/// folded into the signing block here — see the design ledger.
pub fn sign_apk_file(
    input_path: &Path,
    output_path: &Path,
    keys: &Keys,
    policy: &SigningPolicy,
    min_sdk: u32
) -> Result<()> {
    let original = std::fs::read(input_path)?;
    let v1_signed = if policy.sign_with_v1 { apply_v1_signature(&original, keys)? } else { original };

    let mut buf = v1_signed;
    let signed = sign_apk_buffer(&mut buf, keys, min_sdk, policy.sign_with_v3)?;

    let temp_path = output_path.with_extension("signing-tmp");
    std::fs::write(&temp_path, &signed)?;
    std::fs::rename(&temp_path, output_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pack_zip::{ArchiveWriter, CompressionMethod};
    use tempfile::tempdir;

    fn unsigned_apk_bytes() -> Vec<u8> {
        let mut writer = ArchiveWriter::new(Vec::new());
        writer.append("AndroidManifest.xml", CompressionMethod::Deflated, 4, b"<manifest/>").unwrap();
        writer.append("classes.dex", CompressionMethod::Deflated, 4, b"dex bytes").unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn sign_apk_file_atomically_replaces_input() {
        let dir = tempdir().unwrap();
        let input_path = dir.path().join("unsigned.apk");
        std::fs::write(&input_path, unsigned_apk_bytes()).unwrap();

        let keys = Keys::generate_random_testing_keys().unwrap();
        let policy = SigningPolicy { sign_with_v1: true, sign_with_v3: true };
        sign_apk_file(&input_path, &input_path, &keys, &policy, 24).unwrap();

        let signed = std::fs::read(&input_path).unwrap();
        assert_ne!(signed, unsigned_apk_bytes());
        assert!(dir.path().join("unsigned.signing-tmp").metadata().is_err());
    }

    #[test]
    fn v1_signature_files_are_present_only_when_policy_requires_them() {
        let dir = tempdir().unwrap();
        let input_path = dir.path().join("unsigned.apk");
        std::fs::write(&input_path, unsigned_apk_bytes()).unwrap();
        let output_path = dir.path().join("signed.apk");

        let keys = Keys::generate_random_testing_keys().unwrap();
        let policy = SigningPolicy { sign_with_v1: false, sign_with_v3: true };
        sign_apk_file(&input_path, &output_path, &keys, &policy, 30).unwrap();

        let signed = std::fs::read(&output_path).unwrap();
        let reader = ArchiveReader::from_bytes(signed).unwrap();
        assert!(reader.entries().iter().all(|e| !e.name.starts_with("META-INF/")));
    }

    #[test]
    fn v1_signature_files_are_added_when_policy_requires_them() {
        let dir = tempdir().unwrap();
        let input_path = dir.path().join("unsigned.apk");
        std::fs::write(&input_path, unsigned_apk_bytes()).unwrap();
        let output_path = dir.path().join("signed.apk");

        let keys = Keys::generate_random_testing_keys().unwrap();
        let policy = SigningPolicy { sign_with_v1: true, sign_with_v3: false };
        sign_apk_file(&input_path, &output_path, &keys, &policy, 21).unwrap();

        let signed = std::fs::read(&output_path).unwrap();
        let reader = ArchiveReader::from_bytes(signed).unwrap();
        let names: Vec<&str> = reader.entries().iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"META-INF/MANIFEST.MF"));
        assert!(names.contains(&"META-INF/ALIAS.SF"));
        assert!(names.contains(&"META-INF/ALIAS.RSA"));
    }
}
