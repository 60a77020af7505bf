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

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use pack_common::{PackError, Result};
use pack_zip::{ArchiveReader, ArchiveWriter, CompressionMethod};

use crate::builder::EntryHandle;

/// How [crate::EntryPackBuilder::pack] serializes its staged entries
/// (spec §4.B `pack`).
#[derive(Debug, Clone)]
pub enum PackStrategy {
    Uncompressed,
    Deflate { level: u32 },
    /// Delegate compression to an external tool. The tool is invoked
    /// as `<binary> <uncompressed.zip> <output.zip>` with `working_dir`
    /// as its current directory (spec §9 open question: "assume the
    /// external compressor consumes an uncompressed zip and produces
    /// an equivalent zip with compressed payloads").
    External { binary: PathBuf, working_dir: PathBuf }
}

/// A closed entry pack: an immutable `EntryHandle -> internal name`
/// mapping backed by a single zip file on disk.
pub struct EntryPack {
    prefix: String,
    path: PathBuf,
    handle_to_name: HashMap<EntryHandle, String>
}

/// A reference to a subset of another pack's entries, with renamed
/// names and alignments, ready for bit-exact inclusion elsewhere
/// (spec §4.B `select`).
pub struct SelectedSource {
    pub source_path: PathBuf,
    pub entries: Vec<SelectedEntry>
}

pub struct SelectedEntry {
    pub original_name: String,
    pub new_name: String,
    pub alignment: u32
}

pub(crate) fn write_pack(
    prefix: String,
    staged: Vec<(String, Vec<u8>)>,
    handle_to_name: HashMap<EntryHandle, String>,
    strategy: PackStrategy,
    output_path: PathBuf
) -> Result<EntryPack> {
    match strategy {
        PackStrategy::Uncompressed => {
            write_zip(&output_path, &staged, CompressionMethod::Stored, 6)?;
        }
        PackStrategy::Deflate { level } => {
            write_zip(&output_path, &staged, CompressionMethod::Deflated, level)?;
        }
        PackStrategy::External { binary, working_dir } => {
            let intermediate_path = output_path.with_extension("uncompressed.zip");
            write_zip(&intermediate_path, &staged, CompressionMethod::Stored, 6)?;

            let status = Command::new(&binary)
                .current_dir(&working_dir)
                .arg(&intermediate_path)
                .arg(&output_path)
                .status()?;

            let _ = fs::remove_file(&intermediate_path);

            if !status.success() {
                return Err(PackError::ResourceCompilerFailure {
                    split: format!("entry pack (external compressor {})", binary.display()),
                    exit_code: status.code(),
                    stderr: String::new()
                });
            }

            let expected: HashSet<&str> = staged.iter().map(|(name, _)| name.as_str()).collect();
            let reader = ArchiveReader::open(&output_path)?;
            let actual: HashSet<&str> = reader.entries().iter().map(|e| e.name.as_str()).collect();
            if expected != actual {
                return Err(PackError::InvalidCommand(format!(
                    "External compressor {} changed the entry set of the pack it was given.",
                    binary.display()
                )));
            }
        }
    }

    Ok(EntryPack { prefix, path: output_path, handle_to_name })
}

fn write_zip(path: &Path, staged: &[(String, Vec<u8>)], method: CompressionMethod, level: u32) -> Result<()> {
    let mut writer = ArchiveWriter::create_new(path)?;
    for (name, data) in staged {
        writer.append_with_level(name, method, 1, data, level)?;
    }
    writer.finish()?;
    Ok(())
}

impl EntryPack {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn name_for(&self, handle: EntryHandle) -> Result<&str> {
        self.handle_to_name
            .get(&handle)
            .map(String::as_str)
            .ok_or_else(|| PackError::InvalidBundle("Entry handle not present in this pack.".to_string()))
    }

    /// Produces a reference to `handles`' payloads, renamed and
    /// re-aligned by the given functions, ready for bit-exact
    /// inclusion in another archive (spec §4.B `select`).
    pub fn select(
        &self,
        handles: &[EntryHandle],
        mut name_fn: impl FnMut(EntryHandle) -> String,
        mut alignment_fn: impl FnMut(EntryHandle) -> u32
    ) -> Result<SelectedSource> {
        let mut entries = Vec::with_capacity(handles.len());
        for &handle in handles {
            entries.push(SelectedEntry {
                original_name: self.name_for(handle)?.to_string(),
                new_name: name_fn(handle),
                alignment: alignment_fn(handle)
            });
        }
        Ok(SelectedSource { source_path: self.path.clone(), entries })
    }

    /// Merges `other` into `self`. Requires disjoint name prefixes.
    /// The combined contents end up at `self`'s original path (the
    /// "to" side retains its path); `other`'s backing file is deleted.
    /// On a handle present in both packs, `other`'s binding wins.
    pub fn merge(&mut self, other: EntryPack) -> Result<()> {
        if self.prefix == other.prefix {
            return Err(PackError::EntryPackPrefixConflict(self.prefix.clone(), other.prefix.clone()));
        }

        let combined_path = self.path.with_extension("merged.zip");
        {
            let mut writer = ArchiveWriter::create_new(&combined_path)?;
            let self_reader = ArchiveReader::open(&self.path)?;
            for entry in self_reader.entries() {
                pack_zip::copy_entry(&mut writer, &self_reader, entry, &entry.name, 1)?;
            }
            let other_reader = ArchiveReader::open(&other.path)?;
            for entry in other_reader.entries() {
                // `self`'s entries were already written; a name collision here
                // would violate the disjoint-prefix precondition, so the
                // writer's duplicate-name check is the backstop.
                pack_zip::copy_entry(&mut writer, &other_reader, entry, &entry.name, 1)?;
            }
            writer.finish()?;
        }

        fs::remove_file(&self.path)?;
        fs::rename(&combined_path, &self.path)?;
        fs::remove_file(&other.path)?;

        for (handle, name) in other.handle_to_name {
            self.handle_to_name.insert(handle, name);
        }

        Ok(())
    }
}
