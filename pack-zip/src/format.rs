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

//! Fixed-width record layouts for the classic (non-Zip64) zip format,
//! written with `deku` the way `pack-sign`'s signing block types are.
//! Variable-length fields (name, extra, data) are appended by the
//! caller after serialising the fixed part, following the same
//! pattern as `ApkSigningBlock`.

use deku::prelude::*;

pub const LOCAL_FILE_HEADER_SIG: u32 = 0x0403_4b50;
pub const CENTRAL_DIR_HEADER_SIG: u32 = 0x0201_4b50;
pub const EOCD_SIG: u32 = 0x0605_4b50;

/// Every entry is written with a fixed mtime (2010-01-01, 00:00:00 DOS
/// time) so that archives built from identical input bytes are
/// byte-identical regardless of when they were built.
pub const FIXED_DOS_TIME: u16 = 0x0000;
pub const FIXED_DOS_DATE: u16 = 0x3c21;

/// Zip version-needed-to-extract: 2.0, the lowest version that
/// understands `Deflated`.
pub const VERSION_NEEDED: u16 = 20;
pub const VERSION_MADE_BY: u16 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflated
}

impl CompressionMethod {
    pub fn code(self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflated => 8
        }
    }

    pub fn from_code(code: u16) -> Option<CompressionMethod> {
        match code {
            0 => Some(CompressionMethod::Stored),
            8 => Some(CompressionMethod::Deflated),
            _ => None
        }
    }
}

#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct LocalFileHeader {
    pub signature: u32,
    pub version_needed: u16,
    pub flags: u16,
    pub compression: u16,
    pub mod_time: u16,
    pub mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name_len: u16,
    pub extra_len: u16
}

#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct CentralDirectoryHeader {
    pub signature: u32,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub compression: u16,
    pub mod_time: u16,
    pub mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name_len: u16,
    pub extra_len: u16,
    pub comment_len: u16,
    pub disk_number_start: u16,
    pub internal_attrs: u16,
    pub external_attrs: u32,
    pub local_header_offset: u32
}

#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct EndOfCentralDirectory {
    pub signature: u32,
    pub disk_number: u16,
    pub cd_start_disk: u16,
    pub entries_this_disk: u16,
    pub entries_total: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16
}

/// Minimum size of a local file header, fixed portion only.
pub const LOCAL_FILE_HEADER_SIZE: u64 = 30;
/// Minimum size of a central directory header, fixed portion only.
pub const CENTRAL_DIR_HEADER_SIZE: u64 = 46;
/// Size of the end-of-central-directory record, fixed portion only.
pub const EOCD_SIZE: u64 = 22;
