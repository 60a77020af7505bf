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

//! A minimal, hand-rolled classic zip reader/writer (spec §4.A, §4.E
//! alignment rules, §8 "round-trip bit identity"). No Zip64: entries
//! and archives over 4 GiB are rejected rather than silently widened.

mod format;
mod reader;
mod writer;

use std::io::Write;

pub use format::CompressionMethod;
pub use reader::{ArchiveReader, RawEntry};
pub use writer::ArchiveWriter;

use pack_common::*;

/// One entry to be written by [zip_apk]. Kept for callers that just
/// want every entry deflated and 4-byte-aligned, the way AAPT-produced
/// APKs traditionally are; writers that need per-entry compression or
/// alignment control (everything past the resource compiler stage)
/// should drive [ArchiveWriter] directly.
pub struct File {
    pub path: String,
    pub data: Vec<u8>
}

/// Entries that Android refuses to let compress, regardless of how
/// the bundle author configured compression.
const UNCOMPRESSED_FILES: &[&str] = &["resources.arsc"];

/// The select-and-copy primitive (spec §4.A): moves one entry from a
/// source archive into a destination writer verbatim, optionally
/// under a new name and a new alignment. Compression method and CRC
/// never change.
pub fn copy_entry<W: Write>(
    writer: &mut ArchiveWriter<W>,
    reader: &ArchiveReader,
    entry: &RawEntry,
    new_name: &str,
    alignment: u32
) -> Result<()> {
    writer.append_raw(
        new_name,
        entry.method,
        entry.crc32,
        entry.uncompressed_size,
        alignment,
        reader.raw_bytes(entry)
    )
}

/// Output can be a file *or* a buffer in memory.
pub fn zip_apk<T: Write>(files: &[File], output: T) -> Result<()> {
    let mut writer = ArchiveWriter::new(output);

    for file in files {
        let method = if UNCOMPRESSED_FILES.contains(&&file.path[..]) {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflated
        };
        writer.append(&file.path, method, 4, &file.data)?;
    }

    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_stored_and_deflated_entries() {
        let mut writer = ArchiveWriter::new(Vec::new());
        writer.append("res/values/strings.xml", CompressionMethod::Deflated, 4, b"<resources/>").unwrap();
        writer.append("resources.arsc", CompressionMethod::Stored, 4096, &[0u8; 128]).unwrap();
        let bytes = writer.finish().unwrap();

        let reader = ArchiveReader::from_bytes(bytes).unwrap();
        let names: Vec<&str> = reader.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["res/values/strings.xml", "resources.arsc"]);

        let xml_entry = &reader.entries()[0];
        assert_eq!(reader.decompressed_bytes(xml_entry).unwrap(), b"<resources/>");

        let arsc_entry = &reader.entries()[1];
        assert_eq!(arsc_entry.method, CompressionMethod::Stored);
        assert_eq!(reader.decompressed_bytes(arsc_entry).unwrap(), vec![0u8; 128]);
    }

    #[test]
    fn rejects_duplicate_entry_names() {
        let mut writer = ArchiveWriter::new(Vec::new());
        writer.append("a.txt", CompressionMethod::Stored, 1, b"one").unwrap();
        let err = writer.append("a.txt", CompressionMethod::Stored, 1, b"two").unwrap_err();
        assert!(matches!(err, PackError::ZipEntryAlreadyExists(name) if name == "a.txt"));
    }

    #[test]
    fn identical_input_produces_identical_bytes() {
        let build = || {
            let mut writer = ArchiveWriter::new(Vec::new());
            writer.append("classes.dex", CompressionMethod::Deflated, 4, b"dex bytes go here").unwrap();
            writer.finish().unwrap()
        };
        assert_eq!(build(), build());
    }
}
