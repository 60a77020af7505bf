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

//! Command-line front-end over [`pack_api::build_apks`]. Reads an
//! already-split bundle from a directory ([`bundle_dir`]) and writes a
//! signed APK Set (spec §6.4).

mod bundle_dir;

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use pack_api::{build_apks, Bundle, BuildEvent, Keys, ResourceCompiler, Result};
use pack_apkset::{ApkSetOutput, TocSummary};
use pack_model::config::{ApkBuildMode, BundleConfigBuilder, SigningConfigBuilder};

#[derive(Parser)]
#[command(about = "Assembles a signed APK Set from an already-split app bundle")]
struct Cli {
    /// Directory holding one subdirectory per module, bundletool layout.
    bundle_dir: PathBuf,

    /// Where to write the result.
    output: PathBuf,

    /// Write `output` as a directory of APKs instead of a `.apks` archive.
    #[arg(long)]
    directory: bool,

    /// Path to the resource-compiler binary (spec §6.2).
    #[arg(long)]
    resource_compiler: PathBuf,

    /// PEM file with both a certificate and a private key. Falls back to
    /// a freshly generated testing key pair when omitted.
    #[arg(long)]
    signing_key: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "default")]
    mode: ModeArg,

    #[arg(long, default_value_t = 0)]
    first_variant_number: i32,

    /// Worker thread count for resource compilation and signing. Defaults
    /// to the number of available cores.
    #[arg(long)]
    jobs: Option<usize>,

    /// Print a human-readable summary of the resulting table of contents.
    #[arg(long)]
    print_toc: bool
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Default,
    Universal,
    System,
    SystemCompressed,
    Archive,
    Instant
}

impl From<ModeArg> for ApkBuildMode {
    fn from(mode: ModeArg) -> ApkBuildMode {
        match mode {
            ModeArg::Default => ApkBuildMode::Default,
            ModeArg::Universal => ApkBuildMode::Universal,
            ModeArg::System => ApkBuildMode::System,
            ModeArg::SystemCompressed => ApkBuildMode::SystemCompressed,
            ModeArg::Archive => ApkBuildMode::Archive,
            ModeArg::Instant => ApkBuildMode::Instant
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let keys = match &cli.signing_key {
        Some(path) => Keys::from_combined_pem_string(&std::fs::read_to_string(path)?)?,
        None => Keys::generate_random_testing_keys()?
    };

    let splits = bundle_dir::read_bundle_dir(&cli.bundle_dir)?;
    let bundle = Bundle { splits, config: BundleConfigBuilder::new().build() };
    let signing_config = SigningConfigBuilder::new(keys).build();
    let resource_compiler = ResourceCompiler { binary: cli.resource_compiler };

    let listener: Box<dyn Fn(BuildEvent)> = Box::new(|event| match event {
        BuildEvent::Started { split_count } => tracing::info!(split_count, "build started"),
        BuildEvent::Completed { variant_count, apk_count } => tracing::info!(variant_count, apk_count, "build completed")
    });

    let output = if cli.directory { ApkSetOutput::Directory(&cli.output) } else { ApkSetOutput::Archive(&cli.output) };

    let toc = build_apks(bundle, signing_config, Some(listener), None, cli.mode.into(), cli.first_variant_number, resource_compiler, output, cli.jobs)?;

    if cli.print_toc {
        print!("{}", TocSummary(&toc));
    }

    Ok(())
}
