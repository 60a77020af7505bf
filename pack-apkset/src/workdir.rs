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

//! A single scoped temp directory owned by the coordinator for the
//! whole build (spec §5 "Resource lifecycle"). Deletion is retried a
//! handful of times with short back-off to tolerate filesystems whose
//! directory-entry removal is only eventually visible.

use std::path::{Path, PathBuf};
use std::{fs, thread, time::Duration};

use pack_common::Result;

const DELETE_ATTEMPTS: u32 = 5;

pub struct ScopedWorkdir {
    path: PathBuf
}

impl ScopedWorkdir {
    pub fn new() -> Result<ScopedWorkdir> {
        let dir = tempfile::Builder::new().prefix("pack-apkset-").tempdir()?;
        Ok(ScopedWorkdir { path: dir.into_path() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedWorkdir {
    fn drop(&mut self) {
        for attempt in 0..DELETE_ATTEMPTS {
            match fs::remove_dir_all(&self.path) {
                Ok(()) => return,
                Err(_) if attempt + 1 < DELETE_ATTEMPTS => thread::sleep(Duration::from_millis(20 * (attempt as u64 + 1))),
                Err(_) => return
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_exists_while_alive_and_is_removed_on_drop() {
        let path = {
            let workdir = ScopedWorkdir::new().unwrap();
            let path = workdir.path().to_path_buf();
            assert!(path.is_dir());
            path
        };
        assert!(!path.exists());
    }
}
