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

use core::fmt;
use std::{io, num::ParseIntError, rc::Rc};

use deku::prelude::*;
use rsa::pkcs8;

/// Common error type making it easier to share `Result`s between PACK crates.
///
/// In general designed to avoid needing utilities like `map_err`.
#[derive(Debug, Clone)]
pub enum PackError {
    /// pack-cli encountered an error while processing something specific to the
    /// command line implementation. For example, not enough arguments were
    /// passed via the shell.
    Cli(String),
    /// PACK only supports UTF-8 encoding for AAPT StringPools. In this format,
    /// string lengths are stored in signed 16-bit integers, meaning the
    /// maximum supported string length is `0x7FFF` bytes.
    StringPoolStringTooLong(String),
    /// Attempted to construct an APK resource table with a package identifier
    /// longer than 128 bytes long.
    PackageNameTooLong(String),
    /// When AssetCompiler was trying to serialise a struct similar to AAPT,
    /// something went wrong. See [DekuError].
    ByteSerialisationFailed(DekuError),
    /// In APK encoding, XML files require a first-pass to figure out how many
    /// `android:`-prefixed attributes they contain. If that code has a mistake
    /// in it, a later part of the process will throw this error.
    ///
    /// **If you experience this, it is considered an internal bug in PACK.
    /// Please report it.**
    TooManyUniqueAndroidInternalAttributes,
    /// PACK needs to know about all possible internal attributes, such as
    /// `android:name`, `android:compileSdkVersion`, etc. If a newer attribute
    /// is introduced and used in a file, this error will be thrown.
    UnknownAndroidInternalAttribute(String),
    /// An attribute was persent in an XML file which was expected to be an
    /// integer (eg. `android:minSdkVersion`), but its value was not a valid
    /// integer (eg. `"abc"`).
    IntegerAttributeParsingFailed(ParseIntError),
    /// An XML attribute value began with `@` as though it was a reference
    /// (eg. `@drawable/preview`), but its format didn't fit what was expected
    /// (two strings with one slash separator).
    ReferenceAttributeParsingFailed(String),
    /// An XML attribute value was parsed, but its target wasn't in the APK.
    ReferenceAttributeLookupFailed(String),
    /// PACK's AAB compiler tried to cast a ProtoXML Node to an Element.
    ///
    /// **If you experience this, it is considered an internal bug in PACK.
    /// Please report it.**
    ProtoXmlNodeIsNotAnElement,
    /// An error occurred while a package was writing to disk. Since only
    /// `pack-cli` interacts with the disk, it's likely that one of the file
    /// paths you passed to it is invalid, or the disk was full or similar.
    FileIoError(Rc<io::Error>),
    /// `pack-zip` was asked to append an entry whose name already exists
    /// in the archive being written.
    ZipEntryAlreadyExists(String),
    /// A zip entry's compressed or uncompressed size, or the archive's
    /// central directory, exceeded the 4 GiB limit of the classic zip
    /// format. `pack-zip` does not implement Zip64.
    ZipRecordTooLarge { name: String, size: u64 },
    /// `pack-zip`'s archive writer was asked to create a file that
    /// already exists on disk.
    ZipArchiveAlreadyExists(std::path::PathBuf),
    /// A zip archive being read was truncated, had a corrupt or missing
    /// End Of Central Directory record, or otherwise didn't parse as a
    /// well-formed classic zip file.
    ZipMalformed(String),
    /// The APK Signature Scheme v2/v3 code failed to find the ZIP End Of
    /// Central Directory marker within the zip file.
    SignerZipParsingFailed,
    /// An error occurred while trying to instantiate a `Keys` object from a
    /// `.pem` string.
    SignerPemParsingFailed(Rc<pem::PemError>),
    /// The `.pem` file passed to `Keys` was valid, but it was missing either
    /// a certificate or private key.
    SignerNoKeys,
    /// The `PRIVATE KEY` in the `.pem` was present, but it wasn't an RSA
    /// Private Key.
    SignerRsaPrivateKeyParsingFailed(pkcs8::Error),
    /// An error occurred while signing a hash, see [rsa::Error].
    SignerRsaSigningFailed(Rc<rsa::Error>),
    /// An error occurred while serialising the RSA key, see
    /// [pkcs8::spki::Error].
    SignerRsaKeySerialisationFailed(pkcs8::spki::Error),
    /// The signing certificate couldn't be loaded for V1 AAB signing.
    SignerCertificateDecodingFailed(Rc<rasn::error::DecodeError>),
    /// V1 Signing data couldn't be serialised
    SignerPKCS7EncodingFailed(Rc<rasn::error::EncodeError>),
    /// A bundle violated a structural or semantic invariant (missing base
    /// module, inconsistent `targetSandboxVersion`, an APK-producing split
    /// with no manifest, etc). Raised before any APK is written.
    InvalidBundle(String),
    /// The caller's combination of options is inconsistent (eg. `UNIVERSAL`
    /// mode requested alongside instant splits). Raised before work begins.
    InvalidCommand(String),
    /// A `DeviceSpec` omitted a targeting dimension the bundle uses, or
    /// named a value outside the bundle's available values.
    InvalidDeviceSpec(String),
    /// The external resource-compiler child process exited non-zero.
    ResourceCompilerFailure {
        split: String,
        exit_code: Option<i32>,
        stderr: String
    },
    /// The external resource-compiler child process did not exit within
    /// its allotted timeout (5 minutes, see spec §6.2).
    ResourceCompilerTimedOut { split: String },
    /// A worker observed cancellation and stopped before finishing its unit
    /// of work. Distinct from other fatal kinds so callers can tell a
    /// deliberate interruption apart from a hard failure.
    Interrupted,
    /// Failed to decode a protobuf message (resource table, manifest,
    /// `BundleConfig.pb`, or table-of-contents).
    ProtoDecodingFailed(String),
    /// Failed to build the bounded worker pool the assembler uses to run
    /// split conversion/writing/signing in parallel.
    WorkerPoolBuildFailed(String),
    /// Two entry packs were merged whose internal-name prefixes were
    /// not disjoint (spec §4.B `merge` precondition).
    EntryPackPrefixConflict(String, String)
}

/// Result type where the error is always [PackError].
pub type Result<T> = std::result::Result<T, PackError>;

impl fmt::Display for PackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use PackError::*;
        match self {
            Cli(msg) => write!(f, "{msg}"),
            StringPoolStringTooLong(_) => write!(f, "XML file contained a string longer than 32,767 (0x7FFF) characters. Pack does not support arbitrary-size string pools."),
            PackageNameTooLong(pkg) => write!(f, "Package name \"{pkg}\" is too long. Maximum length is 128 characters."),
            ByteSerialisationFailed(deku_error) => write!(f, "Failed to get byte representation of an object.\nInternal error: {deku_error:?}"),
            TooManyUniqueAndroidInternalAttributes => write!(f, "Internal Pack bug: Too many unique Android Internal Attributes. This shouldn't be possible, please file a bug in the Pack repo."),
            UnknownAndroidInternalAttribute(attr) => write!(f, "Unknown Android Internal Attribute \"{attr}\". This may be because the attribute is not valid, or because Pack is not up-to-date on the latest added attributes. If you believe the latter, please file a bug in the Pack repo."),
            IntegerAttributeParsingFailed(err) => write!(f, "Encountered a non-integer value in an attribute that was expected to be an integer.\nInternal error: {err:?}"),
            ReferenceAttributeParsingFailed(attr) => write!(f, "Failed to parse attribute reference \"{attr}\". Expected a format like \"@drawable/preview\" since the value begins with \"@\"."),
            ReferenceAttributeLookupFailed(attr) => write!(f, "Failed to lookup attribute reference \"{attr}\". Does it exist in the input files?"),
            ProtoXmlNodeIsNotAnElement => write!(f, "Internal Pack bug: Failed to cast ProtoXml Node to Element. This shouldn't be possible, please file a bug in the Pack repo."),
            FileIoError(io_err) => write!(f, "File I/O failed. Did you specify a valid input/output path?\nInternal error: {io_err:?}"),
            ZipEntryAlreadyExists(name) => write!(f, "Zip entry \"{name}\" already exists in this archive."),
            ZipRecordTooLarge { name, size } => write!(f, "Zip entry \"{name}\" is {size} bytes, exceeding the 4 GiB limit of the classic zip format. Zip64 is not supported."),
            ZipArchiveAlreadyExists(path) => write!(f, "Refusing to overwrite existing file at \"{}\".", path.display()),
            ZipMalformed(msg) => write!(f, "Malformed zip archive: {msg}"),
            SignerZipParsingFailed => write!(f, "Signer failed to find the Zip End of Central Directory Marker."),
            SignerPemParsingFailed(pem_error) => write!(f, "A signing .pem was provided, but it didn't parse as valid syntax.\nInternal error: {pem_error:?}"),
            SignerNoKeys => write!(f, "A signing .pem was provided, but it didn't contain one usable PRIVATE KEY and CERTIFICATE.\nEnsure keys are not protected with passwords, as Pack does not support parsing these. Else, ensure your .pem is formatted correctly so as not to trip up the parser."),
            SignerRsaPrivateKeyParsingFailed(pkcs_error) => write!(f, "RSA Private Key parsing failed.\nInternal error: {pkcs_error:?}"),
            SignerRsaSigningFailed(rsa_error) => write!(f, "RSA signing failed.\nInternal error: {rsa_error:?}"),
            SignerRsaKeySerialisationFailed(pkcs_error) => write!(f, "Failed to serialise RSA key for APK Signing Scheme v1.\nInternal error: {pkcs_error:?}"),
            SignerCertificateDecodingFailed(decode_error) => write!(f, "Failed to decode certificate from .pem.\nInternal error: {decode_error:?}"),
            SignerPKCS7EncodingFailed(encode_error) => write!(f, "Failed to write PKCS7 signature for APK Signature Scheme v1.\nInternal error: {encode_error:?}"),
            InvalidBundle(msg) => write!(f, "Invalid bundle: {msg}"),
            InvalidCommand(msg) => write!(f, "Invalid command: {msg}"),
            InvalidDeviceSpec(msg) => write!(f, "Invalid device spec: {msg}"),
            ResourceCompilerFailure { split, exit_code, stderr } => write!(f, "Resource compiler failed for split \"{split}\" (exit code {exit_code:?}):\n{stderr}"),
            ResourceCompilerTimedOut { split } => write!(f, "Resource compiler timed out after 5 minutes for split \"{split}\"."),
            Interrupted => write!(f, "Build was interrupted."),
            ProtoDecodingFailed(msg) => write!(f, "Failed to decode protobuf message.\nInternal error: {msg}"),
            WorkerPoolBuildFailed(msg) => write!(f, "Failed to build worker pool.\nInternal error: {msg}"),
            EntryPackPrefixConflict(a, b) => write!(f, "Internal Pack bug: tried to merge entry packs with overlapping name prefixes \"{a}\" and \"{b}\". Please file a bug in the Pack repo."),
        }
    }
}

impl std::error::Error for PackError {}

/// This makes it easier for Result<Something, PackError> to be returned from WASM functions
impl From<PackError> for String {
    fn from(value: PackError) -> Self {
        format!("{value}")
    }
}

// Automatic conversion from other types of error to PackError makes the rest of the code cleaner
impl From<io::Error> for PackError {
    fn from(value: io::Error) -> Self {
        PackError::FileIoError(value.into())
    }
}

impl From<DekuError> for PackError {
    fn from(value: DekuError) -> Self {
        PackError::ByteSerialisationFailed(value)
    }
}

impl From<ParseIntError> for PackError {
    fn from(value: ParseIntError) -> Self {
        PackError::IntegerAttributeParsingFailed(value)
    }
}

impl From<pem::PemError> for PackError {
    fn from(value: pem::PemError) -> Self {
        PackError::SignerPemParsingFailed(value.into())
    }
}

impl From<pkcs8::Error> for PackError {
    fn from(value: pkcs8::Error) -> Self {
        PackError::SignerRsaPrivateKeyParsingFailed(value)
    }
}

impl From<rsa::Error> for PackError {
    fn from(value: rsa::Error) -> Self {
        PackError::SignerRsaSigningFailed(value.into())
    }
}

impl From<pkcs8::spki::Error> for PackError {
    fn from(value: pkcs8::spki::Error) -> Self {
        PackError::SignerRsaKeySerialisationFailed(value)
    }
}

impl From<rasn::error::DecodeError> for PackError {
    fn from(value: rasn::error::DecodeError) -> Self {
        PackError::SignerCertificateDecodingFailed(value.into())
    }
}

impl From<rasn::error::EncodeError> for PackError {
    fn from(value: rasn::error::EncodeError) -> Self {
        PackError::SignerPKCS7EncodingFailed(value.into())
    }
}

impl From<prost::DecodeError> for PackError {
    fn from(value: prost::DecodeError) -> Self {
        PackError::ProtoDecodingFailed(value.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for PackError {
    fn from(value: rayon::ThreadPoolBuildError) -> Self {
        PackError::WorkerPoolBuildFailed(value.to_string())
    }
}

/// The in-APK path of a split's manifest (spec §4.C step 3d, §4.E step 1).
pub const MANIFEST_PATH: &str = "AndroidManifest.xml";

/// The in-APK path of a split's resource table (spec §4.C step 3d, §4.E step 1).
pub const RESOURCE_TABLE_PATH: &str = "resources.arsc";

/// Rewrites an in-bundle entry path to its in-APK path (spec §4.E step
/// 2, §4.C "entry-path normalization"). Total: paths not matching one
/// of the four prefixes are returned unchanged. Idempotent: applying
/// this to its own output returns the same string.
pub fn rewrite_entry_path(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("dex/") {
        if !rest.contains('/') && rest.ends_with(".dex") {
            return rest.to_string();
        }
        return path.to_string();
    }

    if let Some(rest) = path.strip_prefix("root/") {
        return rest.to_string();
    }

    if let Some(rest) = path.strip_prefix("manifest/") {
        if !rest.contains('/') && rest.ends_with(".xml") {
            return rest.to_string();
        }
        return path.to_string();
    }

    if let Some(rest) = path.strip_prefix("apex/") {
        if !rest.contains('/') {
            if rest.ends_with(".img") {
                return "apex_payload.img".to_string();
            }
            if rest.ends_with(".pb") {
                return "apex_build_info.pb".to_string();
            }
        }
        return path.to_string();
    }

    path.to_string()
}

/// A validated, normalised in-archive path: '/'-delimited, no leading
/// slash, no `.` or `..` segments. Used both as the key in an output
/// archive and as the path field in the table of contents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ZipPath(String);

impl ZipPath {
    pub fn new(path: impl Into<String>) -> Result<ZipPath> {
        let path = path.into();
        if path.starts_with('/') {
            return Err(PackError::InvalidBundle(format!(
                "Zip path \"{path}\" must not start with a slash."
            )));
        }
        for segment in path.split('/') {
            if segment == "." || segment == ".." {
                return Err(PackError::InvalidBundle(format!(
                    "Zip path \"{path}\" must not contain \".\" or \"..\" segments."
                )));
            }
        }
        Ok(ZipPath(path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZipPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ZipPath> for String {
    fn from(value: ZipPath) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_each_reserved_prefix() {
        assert_eq!(rewrite_entry_path("dex/classes.dex"), "classes.dex");
        assert_eq!(rewrite_entry_path("root/assets/foo.txt"), "assets/foo.txt");
        assert_eq!(rewrite_entry_path("manifest/AndroidManifest.xml"), "AndroidManifest.xml");
        assert_eq!(rewrite_entry_path("apex/foo.img"), "apex_payload.img");
        assert_eq!(rewrite_entry_path("apex/foo.pb"), "apex_build_info.pb");
    }

    #[test]
    fn leaves_unmatched_paths_unchanged() {
        assert_eq!(rewrite_entry_path("res/values/strings.xml"), "res/values/strings.xml");
        assert_eq!(rewrite_entry_path("lib/arm64-v8a/libx.so"), "lib/arm64-v8a/libx.so");
    }

    #[test]
    fn rewrite_is_idempotent() {
        for path in ["dex/classes.dex", "root/assets/foo.txt", "manifest/AndroidManifest.xml", "apex/foo.img", "res/values/strings.xml"] {
            let once = rewrite_entry_path(path);
            let twice = rewrite_entry_path(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn malformed_dex_path_is_left_unchanged() {
        assert_eq!(rewrite_entry_path("dex/nested/classes.dex"), "dex/nested/classes.dex");
        assert_eq!(rewrite_entry_path("dex/classes.txt"), "dex/classes.txt");
    }
}
