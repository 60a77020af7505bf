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

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use deku::DekuContainerWrite;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use pack_common::*;

use crate::format::*;

/// Zip extra-field id used by Android's zip alignment convention. The
/// payload is the alignment value (u16 LE) followed by zero padding.
const ALIGNMENT_EXTRA_FIELD_ID: u16 = 0xa1e5;

struct PendingEntry {
    name: String,
    method: CompressionMethod,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    local_header_offset: u32
}

/// Builds a classic (non-Zip64) zip archive one entry at a time.
///
/// Every entry gets a fixed mtime, so two writers fed the same
/// sequence of (name, method, alignment, data) produce byte-identical
/// output no matter when they ran.
pub struct ArchiveWriter<W: Write> {
    inner: W,
    offset: u64,
    names: HashSet<String>,
    entries: Vec<PendingEntry>
}

impl ArchiveWriter<File> {
    /// Opens `path` for writing, refusing to overwrite an existing file.
    pub fn create_new(path: impl AsRef<Path>) -> Result<ArchiveWriter<File>> {
        let file = match OpenOptions::new().write(true).create_new(true).open(path.as_ref()) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(PackError::ZipArchiveAlreadyExists(path.as_ref().to_path_buf()));
            }
            Err(err) => return Err(err.into())
        };
        Ok(ArchiveWriter::new(file))
    }
}

impl<W: Write> ArchiveWriter<W> {
    pub fn new(inner: W) -> ArchiveWriter<W> {
        ArchiveWriter {
            inner,
            offset: 0,
            names: HashSet::new(),
            entries: Vec::new()
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.offset += bytes.len() as u64;
        Ok(())
    }

    /// Appends one entry. `alignment` is the byte boundary the start of
    /// the (possibly compressed) payload must land on; pass `1` for no
    /// alignment requirement. Payload bytes are never re-ordered or
    /// re-compressed by the caller after this returns, so identical
    /// inputs always produce identical archives.
    pub fn append(
        &mut self,
        name: &str,
        method: CompressionMethod,
        alignment: u32,
        data: &[u8]
    ) -> Result<()> {
        self.append_with_level(name, method, alignment, data, 6)
    }

    /// As [Self::append], but with an explicit deflate level (ignored
    /// for `Stored`). Entry-pack callers use level 9 for resources,
    /// level 6 for everything else (spec §4.B `pack`).
    pub fn append_with_level(
        &mut self,
        name: &str,
        method: CompressionMethod,
        alignment: u32,
        data: &[u8],
        level: u32
    ) -> Result<()> {
        if data.len() as u64 > u32::MAX as u64 {
            return Err(PackError::ZipRecordTooLarge {
                name: name.to_string(),
                size: data.len() as u64
            });
        }

        let crc32 = crc32fast::hash(data);
        let payload = match method {
            CompressionMethod::Stored => data.to_vec(),
            CompressionMethod::Deflated => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(level));
                encoder.write_all(data)?;
                encoder.finish()?
            }
        };

        self.append_raw(name, method, crc32, data.len() as u64, alignment, &payload)
    }

    /// Appends an entry whose payload is already in its final,
    /// on-disk form (already deflated, or deliberately stored), along
    /// with its already-known CRC-32. Never re-deflates or re-inflates
    /// `payload` — this is the "select-and-copy" primitive (spec §4.A)
    /// that lets a resource-compiler's output, or another pack's
    /// entries, move into a new archive bit-exact.
    pub fn append_raw(
        &mut self,
        name: &str,
        method: CompressionMethod,
        crc32: u32,
        uncompressed_size: u64,
        alignment: u32,
        payload: &[u8]
    ) -> Result<()> {
        if !self.names.insert(name.to_string()) {
            return Err(PackError::ZipEntryAlreadyExists(name.to_string()));
        }

        if payload.len() as u64 > u32::MAX as u64 || uncompressed_size > u32::MAX as u64 {
            return Err(PackError::ZipRecordTooLarge {
                name: name.to_string(),
                size: payload.len().max(uncompressed_size as usize) as u64
            });
        }

        let name_bytes = name.as_bytes();
        let local_header_offset = self.offset;

        let extra = align_extra_field(
            local_header_offset + LOCAL_FILE_HEADER_SIZE + name_bytes.len() as u64,
            alignment
        );

        let header = LocalFileHeader {
            signature: LOCAL_FILE_HEADER_SIG,
            version_needed: VERSION_NEEDED,
            flags: 0,
            compression: method.code(),
            mod_time: FIXED_DOS_TIME,
            mod_date: FIXED_DOS_DATE,
            crc32,
            compressed_size: payload.len() as u32,
            uncompressed_size: uncompressed_size as u32,
            name_len: name_bytes.len() as u16,
            extra_len: extra.len() as u16
        };

        self.write_bytes(&header.to_bytes()?)?;
        self.write_bytes(name_bytes)?;
        self.write_bytes(&extra)?;
        self.write_bytes(payload)?;

        self.entries.push(PendingEntry {
            name: name.to_string(),
            method,
            crc32,
            compressed_size: payload.len() as u32,
            uncompressed_size: uncompressed_size as u32,
            local_header_offset: local_header_offset as u32
        });

        Ok(())
    }

    /// Writes the central directory and end-of-central-directory
    /// record. Consumes no more entries after this is called.
    pub fn finish(mut self) -> Result<W> {
        let cd_start = self.offset;

        for entry in std::mem::take(&mut self.entries) {
            let name_bytes = entry.name.as_bytes();
            let header = CentralDirectoryHeader {
                signature: CENTRAL_DIR_HEADER_SIG,
                version_made_by: VERSION_MADE_BY,
                version_needed: VERSION_NEEDED,
                flags: 0,
                compression: entry.method.code(),
                mod_time: FIXED_DOS_TIME,
                mod_date: FIXED_DOS_DATE,
                crc32: entry.crc32,
                compressed_size: entry.compressed_size,
                uncompressed_size: entry.uncompressed_size,
                name_len: name_bytes.len() as u16,
                extra_len: 0,
                comment_len: 0,
                disk_number_start: 0,
                internal_attrs: 0,
                external_attrs: 0,
                local_header_offset: entry.local_header_offset
            };
            self.write_bytes(&header.to_bytes()?)?;
            self.write_bytes(name_bytes)?;
        }

        let cd_size = self.offset - cd_start;
        let entry_count = self.names.len() as u16;

        let eocd = EndOfCentralDirectory {
            signature: EOCD_SIG,
            disk_number: 0,
            cd_start_disk: 0,
            entries_this_disk: entry_count,
            entries_total: entry_count,
            cd_size: cd_size as u32,
            cd_offset: cd_start as u32,
            comment_len: 0
        };
        self.write_bytes(&eocd.to_bytes()?)?;

        Ok(self.inner)
    }
}

/// Builds the zip alignment extra field so that `payload_start` lands
/// on an `alignment` boundary. Returns an empty vec when `alignment`
/// is 0 or 1 (no requirement).
fn align_extra_field(payload_start: u64, alignment: u32) -> Vec<u8> {
    if alignment <= 1 {
        return Vec::new();
    }
    let alignment = alignment as u64;
    // The extra field itself (4 header bytes + 2 value bytes) shifts
    // the payload start, so it has to be accounted for before solving
    // for the padding that's needed.
    let unpadded_start = payload_start + 6;
    let padding = ((alignment - (unpadded_start % alignment)) % alignment) as usize;

    let mut extra = Vec::with_capacity(6 + padding);
    extra.extend_from_slice(&ALIGNMENT_EXTRA_FIELD_ID.to_le_bytes());
    extra.extend_from_slice(&((2 + padding) as u16).to_le_bytes());
    extra.extend_from_slice(&(alignment as u16).to_le_bytes());
    extra.extend(std::iter::repeat(0u8).take(padding));
    extra
}
