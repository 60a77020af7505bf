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

use pack_model::ModuleEntry;

/// Extensions whose payload is already compressed, so deflating them
/// again never pays off (spec §4.D "well-known extensions that don't
/// benefit from compression").
const WELL_KNOWN_NO_COMPRESS_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "wav", "mp2", "mp3", "ogg", "aac", "mpg", "mpeg", "mid", "midi",
    "smf", "jet", "rtttl", "imy", "xmf", "mp4", "m4a", "m4v", "3gp", "3gpp", "webp", "webm", "tflite"
];

/// Sets `force_uncompressed` on every entry that qualifies, per spec
/// §4.D's "tentative status" determination: native libraries when
/// `extract_native_libs` is disabled, caller-specified path globs, and
/// well-known already-compressed extensions (unless
/// `disable_well_known_extensions` is set). Never clears an
/// already-set flag.
pub fn apply_force_uncompressed_policy(
    entries: &mut [ModuleEntry],
    extract_native_libs: bool,
    uncompressed_globs: &[String],
    disable_well_known_extensions: bool
) {
    for entry in entries {
        if entry.force_uncompressed {
            continue;
        }

        let is_native_lib = entry.path.starts_with("lib/") && entry.path.ends_with(".so");
        if is_native_lib && !extract_native_libs {
            entry.force_uncompressed = true;
            continue;
        }

        if uncompressed_globs.iter().any(|glob| glob_match(glob, &entry.path)) {
            entry.force_uncompressed = true;
            continue;
        }

        if !disable_well_known_extensions {
            if let Some(extension) = entry.path.rsplit('.').next() {
                if WELL_KNOWN_NO_COMPRESS_EXTENSIONS.contains(&extension) {
                    entry.force_uncompressed = true;
                }
            }
        }
    }
}

/// Minimal `*`-wildcard glob matcher (no `?`, no character classes):
/// enough for the simple uncompressed-path patterns callers pass in.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let mut pos = 0;
    if !parts[0].is_empty() {
        if !text[pos..].starts_with(parts[0]) {
            return false;
        }
        pos += parts[0].len();
    }

    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match text[pos..].find(part) {
            Some(idx) => pos += idx + part.len(),
            None => return false
        }
    }

    let last = parts[parts.len() - 1];
    if last.is_empty() {
        true
    } else {
        text[pos..].ends_with(last)
    }
}
