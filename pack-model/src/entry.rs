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

use std::{path::PathBuf, sync::Arc};

use pack_common::{PackError, Result};

/// Where a `ModuleEntry`'s byte source comes from. This is a content
/// addressed index into the bundle file plus a lazy reader, never a
/// cyclic owner: many `ModuleEntry`s can point at the same
/// `(bundle_path, entry_name)` pair without either of them owning it.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentSource {
    /// The content already lives in memory (eg. a manifest rewritten by a
    /// modifier, or a file synthesised by this core rather than read
    /// verbatim from the bundle).
    Memory(Arc<Vec<u8>>),
    /// Zero-copy passthrough: read lazily from a zip entry inside the
    /// bundle file. Two `ModuleEntry`s with the same `(bundle_path,
    /// entry_name)` are considered the same source location for entry
    /// pack deduplication purposes (see `SourceLocation`).
    BundleZip {
        bundle_path: Arc<PathBuf>,
        entry_name: Arc<str>
    }
}

impl ContentSource {
    pub fn memory(bytes: Vec<u8>) -> ContentSource {
        ContentSource::Memory(Arc::new(bytes))
    }

    pub fn bundle_zip(bundle_path: impl Into<PathBuf>, entry_name: impl Into<String>) -> ContentSource {
        ContentSource::BundleZip {
            bundle_path: Arc::new(bundle_path.into()),
            entry_name: Arc::from(entry_name.into())
        }
    }

    /// The `(bundlePath, entryName)` identity used to dedupe entries that
    /// refer to the same underlying payload (spec §3 ModuleEntry,
    /// EntryPack invariant 2).
    pub fn source_location(&self) -> Option<SourceLocation> {
        match self {
            ContentSource::Memory(_) => None,
            ContentSource::BundleZip { bundle_path, entry_name } => Some(SourceLocation {
                bundle_path: bundle_path.clone(),
                entry_name: entry_name.clone()
            })
        }
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        match self {
            ContentSource::Memory(bytes) => Ok((**bytes).clone()),
            ContentSource::BundleZip { bundle_path, entry_name } => {
                let archive = pack_zip::ArchiveReader::open(bundle_path.as_path())?;
                let entry = archive
                    .entries()
                    .iter()
                    .find(|e| e.name.as_str() == entry_name.as_ref())
                    .ok_or_else(|| {
                        PackError::InvalidBundle(format!(
                            "Bundle \"{}\" has no entry named \"{entry_name}\".",
                            bundle_path.display()
                        ))
                    })?;
                archive.decompressed_bytes(entry)
            }
        }
    }
}

/// Identity key for "two `ModuleEntry`s refer to the same source
/// location" (spec §3, §4.B `add`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub bundle_path: Arc<PathBuf>,
    pub entry_name: Arc<str>
}

/// One file destined for an APK (spec §3).
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleEntry {
    /// The in-bundle path. Rewritten to an in-APK path by the path
    /// rewrite rules (spec §4.E step 2) during writing; this field itself
    /// is never mutated in place.
    pub path: String,
    pub content: ContentSource,
    pub force_uncompressed: bool,
    /// Marks embedded APK payloads (eg. a nested watch-face APK) that
    /// must be signed independently before inclusion in the parent APK.
    pub should_sign: bool
}

impl ModuleEntry {
    pub fn new(path: impl Into<String>, content: ContentSource) -> ModuleEntry {
        ModuleEntry {
            path: path.into(),
            content,
            force_uncompressed: false,
            should_sign: false
        }
    }

    pub fn with_force_uncompressed(mut self, force_uncompressed: bool) -> ModuleEntry {
        self.force_uncompressed = force_uncompressed;
        self
    }

    pub fn with_should_sign(mut self, should_sign: bool) -> ModuleEntry {
        self.should_sign = should_sign;
        self
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        self.content.read()
    }
}
