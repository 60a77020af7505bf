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

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use pack_common::{PackError, Result};

use crate::config::ResourceCompilerConfig;

const TIMEOUT: Duration = Duration::from_secs(5 * 60);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs the resource compiler on one split's proto-form zip, writing
/// the binary-form zip to `output`. Blocks the calling worker (spec
/// §5 "a worker blocks until the child exits").
pub fn run(
    config: &ResourceCompilerConfig,
    input: &Path,
    output: &Path,
    resource_config_path: Option<&Path>,
    split_name: &str
) -> Result<()> {
    let mut command = Command::new(&config.binary);
    command.arg("convert").arg("--output-format").arg("binary").arg("-o").arg(output).arg(input);
    if config.sparse_encoding {
        command.arg("--force-sparse-encoding");
    }
    if config.collapse_resource_names {
        command.arg("--collapse-resource-names");
    }
    if config.deduplicate_resource_entries {
        command.arg("--deduplicate-entries");
    }
    if let Some(path) = resource_config_path {
        command.arg("--resources-config-path").arg(path);
    }
    command.stdout(Stdio::piped()).stderr(Stdio::piped());

    tracing::debug!(split = split_name, ?command, "invoking resource compiler");

    let mut child = command.spawn()?;
    let stderr_handle = child.stderr.take().map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    });
    // Drain stdout so the child never blocks on a full pipe buffer.
    if let Some(mut pipe) = child.stdout.take() {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
        });
    }

    let start = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if start.elapsed() >= TIMEOUT {
            let _ = child.kill();
            let _ = child.wait();
            tracing::error!(split = split_name, "resource compiler timed out after 5 minutes");
            return Err(PackError::ResourceCompilerTimedOut { split: split_name.to_string() });
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let stderr = stderr_handle.and_then(|h| h.join().ok()).unwrap_or_default();

    if !status.success() {
        let stderr = String::from_utf8_lossy(&stderr).into_owned();
        tracing::error!(split = split_name, exit_code = ?status.code(), %stderr, "resource compiler exited non-zero");
        return Err(PackError::ResourceCompilerFailure { split: split_name.to_string(), exit_code: status.code(), stderr });
    }

    Ok(())
}
