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

//! Emits the assembled APK Set (spec §4.J step 7, §6.3): either a single
//! archive with `toc.pb` first, or a directory with `toc.pb` alongside
//! the loose APK files.

use std::fs;
use std::path::Path;

use pack_common::Result;
use pack_zip::{ArchiveWriter, CompressionMethod};

/// One written-and-signed (or, for an APEX payload, unsigned) split:
/// its final in-set path and where its bytes currently sit on disk.
pub struct EmittedSplit {
    pub path: String,
    pub temp_path: std::path::PathBuf
}

/// Archive mode: a single zip with `toc.pb` uncompressed first, then
/// every APK uncompressed in deterministic path order (spec §5
/// "fixed ... compression level per policy" / §6.3).
pub fn emit_archive(output_path: &Path, toc_bytes: &[u8], splits: &[EmittedSplit]) -> Result<()> {
    let mut writer = ArchiveWriter::create_new(output_path)?;
    writer.append("toc.pb", CompressionMethod::Stored, 1, toc_bytes)?;

    let mut ordered: Vec<&EmittedSplit> = splits.iter().collect();
    ordered.sort_by(|a, b| a.path.cmp(&b.path));

    for split in ordered {
        let bytes = fs::read(&split.temp_path)?;
        writer.append(&split.path, CompressionMethod::Stored, 1, &bytes)?;
    }

    writer.finish()?;
    Ok(())
}

/// Directory mode: `toc.pb` plus the APKs at their assigned paths,
/// relative to `output_dir`.
pub fn emit_directory(output_dir: &Path, toc_bytes: &[u8], splits: &[EmittedSplit]) -> Result<()> {
    fs::create_dir_all(output_dir)?;
    fs::write(output_dir.join("toc.pb"), toc_bytes)?;

    for split in splits {
        let destination = output_dir.join(&split.path);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&split.temp_path, &destination)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pack_zip::ArchiveReader;
    use tempfile::tempdir;

    fn write_temp_file(dir: &Path, name: &str, contents: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn archive_puts_toc_first_and_sorts_apks_by_path() {
        let dir = tempdir().unwrap();
        let splits = vec![
            EmittedSplit { path: "splits/zeta.apk".to_string(), temp_path: write_temp_file(dir.path(), "zeta.tmp", b"zeta bytes") },
            EmittedSplit { path: "splits/alpha.apk".to_string(), temp_path: write_temp_file(dir.path(), "alpha.tmp", b"alpha bytes") }
        ];

        let output_path = dir.path().join("out.apks");
        emit_archive(&output_path, b"toc bytes", &splits).unwrap();

        let reader = ArchiveReader::open(&output_path).unwrap();
        let names: Vec<&str> = reader.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["toc.pb", "splits/alpha.apk", "splits/zeta.apk"]);
    }

    #[test]
    fn directory_mode_writes_toc_and_nested_apk_paths() {
        let dir = tempdir().unwrap();
        let output_dir = dir.path().join("out");
        let splits = vec![EmittedSplit {
            path: "splits/base-master.apk".to_string(),
            temp_path: write_temp_file(dir.path(), "base.tmp", b"apk bytes")
        }];

        emit_directory(&output_dir, b"toc bytes", &splits).unwrap();

        assert_eq!(fs::read(output_dir.join("toc.pb")).unwrap(), b"toc bytes");
        assert_eq!(fs::read(output_dir.join("splits/base-master.apk")).unwrap(), b"apk bytes");
    }
}
