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

//! Reads arbitrary classic zip archives (including ones this crate
//! didn't write itself, like a resource compiler's output) far enough
//! to recover each entry's raw compressed bytes without touching them.
//! Finding the end of central directory is done the same way
//! `pack-sign`'s zip_parser does it: scan backward for the magic.

use std::fs;
use std::io::Read;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::DeflateDecoder;
use pack_common::*;

use crate::format::{CompressionMethod, CENTRAL_DIR_HEADER_SIG, EOCD_SIG};

#[derive(Debug, Clone)]
pub struct RawEntry {
    pub name: String,
    pub method: CompressionMethod,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    data_offset: u64
}

pub struct ArchiveReader {
    buf: Vec<u8>,
    entries: Vec<RawEntry>
}

impl ArchiveReader {
    pub fn open(path: impl AsRef<Path>) -> Result<ArchiveReader> {
        ArchiveReader::from_bytes(fs::read(path)?)
    }

    pub fn from_bytes(buf: Vec<u8>) -> Result<ArchiveReader> {
        let (cd_offset, entry_count) = find_central_directory(&buf)?;
        let entries = parse_central_directory(&buf, cd_offset, entry_count)?;
        Ok(ArchiveReader { buf, entries })
    }

    pub fn entries(&self) -> &[RawEntry] {
        &self.entries
    }

    /// The entry's payload bytes exactly as they sit in the archive:
    /// compressed if the entry uses `Deflated`, verbatim if `Stored`.
    pub fn raw_bytes(&self, entry: &RawEntry) -> &[u8] {
        let start = entry.data_offset as usize;
        let end = start + entry.compressed_size as usize;
        &self.buf[start..end]
    }

    pub fn decompressed_bytes(&self, entry: &RawEntry) -> Result<Vec<u8>> {
        match entry.method {
            CompressionMethod::Stored => Ok(self.raw_bytes(entry).to_vec()),
            CompressionMethod::Deflated => {
                let mut decoder = DeflateDecoder::new(self.raw_bytes(entry));
                let mut out = Vec::with_capacity(entry.uncompressed_size as usize);
                decoder.read_to_end(&mut out)?;
                Ok(out)
            }
        }
    }
}

/// Scans backward for the EOCD signature and returns
/// `(central_directory_offset, entry_count)`.
fn find_central_directory(buf: &[u8]) -> Result<(u64, u16)> {
    if buf.len() < 22 {
        return Err(PackError::ZipMalformed("archive shorter than an EOCD record".into()));
    }

    for i in (0..=(buf.len() - 4)).rev() {
        if buf[i..i + 4] == EOCD_SIG.to_le_bytes() {
            let mut cursor = &buf[(i + 10)..(i + 22)];
            let entries_total = cursor.read_u16::<LittleEndian>()?;
            let _cd_size = cursor.read_u32::<LittleEndian>()?;
            let cd_offset = cursor.read_u32::<LittleEndian>()?;
            return Ok((cd_offset as u64, entries_total));
        }
    }

    Err(PackError::ZipMalformed("end of central directory record not found".into()))
}

fn parse_central_directory(buf: &[u8], cd_offset: u64, entry_count: u16) -> Result<Vec<RawEntry>> {
    let mut entries = Vec::with_capacity(entry_count as usize);
    let mut pos = cd_offset as usize;

    for _ in 0..entry_count {
        if buf.len() < pos + 4 || buf[pos..pos + 4] != CENTRAL_DIR_HEADER_SIG.to_le_bytes() {
            return Err(PackError::ZipMalformed("central directory header signature mismatch".into()));
        }

        let mut cursor = &buf[(pos + 10)..(pos + 46)];
        let compression_code = cursor.read_u16::<LittleEndian>()?;
        let _mod_time = cursor.read_u16::<LittleEndian>()?;
        let _mod_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let compressed_size = cursor.read_u32::<LittleEndian>()?;
        let uncompressed_size = cursor.read_u32::<LittleEndian>()?;
        let name_len = cursor.read_u16::<LittleEndian>()?;
        let extra_len = cursor.read_u16::<LittleEndian>()?;
        let comment_len = cursor.read_u16::<LittleEndian>()?;
        let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
        let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
        let _external_attrs = cursor.read_u32::<LittleEndian>()?;
        let local_header_offset = cursor.read_u32::<LittleEndian>()?;

        let name_start = pos + 46;
        let name_end = name_start + name_len as usize;
        let name = String::from_utf8(buf[name_start..name_end].to_vec())
            .map_err(|_| PackError::ZipMalformed(format!("entry name at offset {pos} is not valid UTF-8")))?;

        let method = CompressionMethod::from_code(compression_code)
            .ok_or_else(|| PackError::ZipMalformed(format!("entry \"{name}\" uses unsupported compression method {compression_code}")))?;

        let data_offset = local_file_data_offset(buf, local_header_offset as u64)?;

        entries.push(RawEntry {
            name,
            method,
            crc32,
            compressed_size: compressed_size as u64,
            uncompressed_size: uncompressed_size as u64,
            data_offset
        });

        pos = name_end + extra_len as usize + comment_len as usize;
    }

    Ok(entries)
}

/// Local file headers repeat the name and carry their own extra
/// field (which may include alignment padding the central directory
/// doesn't know about), so the payload offset has to be computed from
/// the local header, not derived from the central directory entry.
fn local_file_data_offset(buf: &[u8], local_header_offset: u64) -> Result<u64> {
    let pos = local_header_offset as usize;
    if buf.len() < pos + 30 {
        return Err(PackError::ZipMalformed("local file header runs past end of archive".into()));
    }
    let mut cursor = &buf[(pos + 26)..(pos + 30)];
    let name_len = cursor.read_u16::<LittleEndian>()?;
    let extra_len = cursor.read_u16::<LittleEndian>()?;
    Ok(local_header_offset + 30 + name_len as u64 + extra_len as u64)
}
