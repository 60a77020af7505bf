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

//! # PACK API
//!
//! The public entrypoint other projects embed to turn an already-split
//! app bundle into a signed APK Set (spec §6.4's programmatic "build
//! APKs" entrypoint). Parsing a raw `.aab`/bundle archive into
//! [`Bundle`]'s `Vec<ModuleSplit>` is an upstream splitter's job (spec
//! §1 non-goals); this crate starts from splits already in hand.
//!
//! ```no_run
//! use pack_api::{build_apks, Bundle, ResourceCompiler};
//! use pack_apkset::ApkSetOutput;
//! use pack_model::config::{ApkBuildMode, BundleConfigBuilder, SigningConfigBuilder};
//! use pack_sign::crypto_keys::Keys;
//! use std::path::Path;
//!
//! # fn example(splits: Vec<pack_model::ModuleSplit>) -> pack_common::Result<()> {
//! let bundle = Bundle { splits, config: BundleConfigBuilder::new().build() };
//! let keys = Keys::generate_random_testing_keys().unwrap();
//! let signing_config = SigningConfigBuilder::new(keys).build();
//! let resource_compiler = ResourceCompiler { binary: "/usr/bin/resource-compiler".into() };
//!
//! build_apks(
//!     bundle,
//!     signing_config,
//!     None,
//!     None,
//!     ApkBuildMode::Default,
//!     0,
//!     resource_compiler,
//!     ApkSetOutput::Directory(Path::new("/tmp/out")),
//!     None
//! )?;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

use pack_apkset::{AssembleRequest, ApkSetOutput};
use pack_model::config::{ApkBuildMode, BundleConfig, SigningConfig};
use pack_model::{DeviceSpec, ModuleSplit};
use pack_proto::android::bundle::BuildApksResult;
use pack_rescompiler::ResourceCompilerConfig;

pub use pack_common::{PackError, Result};
pub use pack_sign::crypto_keys::Keys;

/// An already-split app bundle (spec §3 `ModuleSplit`, §6.1 `BundleConfig`).
pub struct Bundle {
    pub splits: Vec<ModuleSplit>,
    pub config: BundleConfig
}

/// Where the external resource-compiler binary lives (spec §6.2). The
/// compiler's own flags are derived from `Bundle.config` by `build_apks`;
/// only the binary path is this crate's concern.
pub struct ResourceCompiler {
    pub binary: PathBuf
}

/// Coarse progress notifications (spec §6.4's `apkSerializerListener?`).
/// `pack_apkset::assemble` doesn't expose per-split hooks itself (spec
/// §B favors `tracing` spans for that granularity), so this listener
/// only brackets the whole build rather than firing once per split.
pub enum BuildEvent {
    Started { split_count: usize },
    Completed { variant_count: usize, apk_count: usize }
}

/// Builds an APK Set from an already-split bundle.
///
/// `resource_compiler`, `output` and `worker_threads` aren't named in
/// spec §6.4's quoted six-argument signature, but an invocation that
/// never says where the resource compiler lives or where the result
/// should land can't actually run one; all three are appended rather
/// than smuggled into `bundle` or `signing_config`.
#[allow(clippy::too_many_arguments)]
pub fn build_apks(
    bundle: Bundle,
    signing_config: SigningConfig,
    apk_serializer_listener: Option<Box<dyn Fn(BuildEvent)>>,
    device_spec: Option<DeviceSpec>,
    apk_build_mode: ApkBuildMode,
    first_variant_number: i32,
    resource_compiler: ResourceCompiler,
    output: ApkSetOutput<'_>,
    worker_threads: Option<usize>
) -> Result<BuildApksResult> {
    let split_count = bundle.splits.len();
    tracing::info!(split_count, mode = ?apk_build_mode, "starting apk set build");
    if let Some(listener) = &apk_serializer_listener {
        listener(BuildEvent::Started { split_count });
    }

    let resource_compiler_config = ResourceCompilerConfig::new(resource_compiler.binary, &bundle.config.resource_optimizations);

    let request = AssembleRequest {
        splits: bundle.splits,
        bundle_config: &bundle.config,
        signing_config: &signing_config,
        resource_compiler: &resource_compiler_config,
        device_spec: device_spec.as_ref(),
        mode: apk_build_mode,
        first_variant_number,
        worker_threads
    };

    let toc = pack_apkset::assemble(request, None, output)?;

    let apk_count = count_apks(&toc);
    tracing::info!(variant_count = toc.variant.len(), apk_count, "finished apk set build");
    if let Some(listener) = apk_serializer_listener {
        listener(BuildEvent::Completed { variant_count: toc.variant.len(), apk_count });
    }

    Ok(toc)
}

fn count_apks(toc: &BuildApksResult) -> usize {
    toc.variant.iter().flat_map(|variant| variant.apk_set.iter()).map(|set| set.apk_description.len()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pack_model::config::{BundleConfigBuilder, SigningConfigBuilder};
    use pack_proto::android::bundle::{ApkDescription, ApkSet, Variant};
    use pack_sign::crypto_keys::Keys;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    #[test]
    fn count_apks_sums_across_variants_and_modules() {
        let toc = BuildApksResult {
            bundletool_version: "1.0.0".to_string(),
            variant: vec![
                Variant {
                    targeting: None,
                    apk_set: vec![ApkSet { module_metadata: None, apk_description: vec![ApkDescription::default(), ApkDescription::default()] }],
                    variant_number: 0
                },
                Variant { targeting: None, apk_set: vec![ApkSet { module_metadata: None, apk_description: vec![ApkDescription::default()] }], variant_number: 1 }
            ]
        };
        assert_eq!(count_apks(&toc), 3);
    }

    #[test]
    fn build_apks_with_no_splits_writes_an_empty_apk_set_and_notifies_listener() {
        let dir = tempdir().unwrap();
        let output_dir = dir.path().join("out");

        let bundle = Bundle { splits: vec![], config: BundleConfigBuilder::new().build() };
        let keys = Keys::generate_random_testing_keys().unwrap();
        let signing_config = SigningConfigBuilder::new(keys).build();
        let resource_compiler = ResourceCompiler { binary: "/bin/true".into() };

        let events: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(vec![]));
        let recorder = events.clone();
        let listener: Box<dyn Fn(BuildEvent)> = Box::new(move |event| {
            recorder.lock().unwrap().push(match event {
                BuildEvent::Started { .. } => "started",
                BuildEvent::Completed { .. } => "completed"
            });
        });

        let toc = build_apks(
            bundle,
            signing_config,
            Some(listener),
            None,
            ApkBuildMode::Default,
            0,
            resource_compiler,
            ApkSetOutput::Directory(&output_dir),
            None
        )
        .unwrap();

        assert!(toc.variant.is_empty());
        assert!(output_dir.join("toc.pb").exists());
        assert_eq!(*events.lock().unwrap(), vec!["started", "completed"]);
    }
}
