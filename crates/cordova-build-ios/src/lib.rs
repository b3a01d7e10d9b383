//! # cordova-build-ios
//!
//! Command-line tool that builds the iOS platform of a Cordova project and
//! collects the app the build produced.
//!
//! ## Overview
//!
//! `cordova-build-ios` is the CLI front end of
//! [`cordova-build-ios-sdk`](cordova_build_ios_sdk). For every invocation it:
//!
//! - **Provisions** - adds `platforms/ios` if it is missing (or removes and
//!   re-adds it with `--re-add-platform`)
//! - **Builds** - runs `cordova build ios` with `--release` / `--device` and a
//!   generated `build.json` for code signing
//! - **Collects** - finds the `.ipa` (or `.app`, when packaging) produced by a
//!   device build and optionally packages it into `--output`
//!
//! ## Quick Start
//!
//! ```bash
//! # Debug simulator build, adding the platform if needed
//! cordova-build-ios build
//!
//! # Signed release build for devices, packaged to dist/app.ipa
//! cordova-build-ios build --release --device \
//!     --code-sign-identity "iPhone Distribution" \
//!     --provisioning-profile 00000000-0000-0000-0000-000000000000 \
//!     --output dist/app.ipa
//!
//! # Preview what would run
//! cordova-build-ios --dry-run build --device --re-add-platform
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `build` | Provision, build, and collect the iOS app |
//! | `locate` | Find the entry of a directory modified after a given time |
//! | `init` | Write a starter `cordova-build-ios.toml` |
//!
//! ## Configuration
//!
//! Options can be persisted in `cordova-build-ios.toml` (see [`config`]).
//! Signing values can also come from the environment or a `.env.local` file
//! in the project directory:
//!
//! ```bash
//! CORDOVA_IOS_CODE_SIGN_IDENTITY="iPhone Distribution"
//! CORDOVA_IOS_PROVISIONING_PROFILE="00000000-0000-0000-0000-000000000000"
//! ```
//!
//! ## CLI Flags
//!
//! Global flags available on all commands:
//!
//! - **`--dry-run`** - Print the provisioning steps and build flags without running anything
//! - **`--verbose` / `-v`** - Log every external command (`RUST_LOG` overrides)

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use cordova_build_ios_sdk::builders::{BuildPlan, IosBuilder, ZipPackager, find_project_root};
use cordova_build_ios_sdk::locator::{BuildWindow, ScanReport, scan};
use cordova_build_ios_sdk::{BuildConfiguration, BuildReport, CordovaCli, EntryKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::EnvFilter;

pub mod config;

use config::{CONFIG_FILE_NAME, ConfigResolver, FileConfig};

/// Builds the iOS platform of a Cordova project and collects the produced app.
#[derive(Parser, Debug)]
#[command(name = "cordova-build-ios", author, version, about = "Cordova iOS build runner", long_about = None)]
struct Cli {
    /// Print what would be done without actually doing it
    #[arg(long, global = true)]
    dry_run: bool,

    /// Print verbose output including all commands
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Provision the iOS platform, build it, and collect the device app.
    Build(BuildArgs),
    /// Find the first entry of a directory modified after a point in time.
    Locate {
        #[arg(help = "Directory to scan (direct children only)")]
        dir: PathBuf,
        #[arg(long, help = "RFC 3339 timestamp, e.g. 2024-05-01T12:00:00Z")]
        since: String,
        #[arg(long, value_enum, default_value_t = KindArg::File)]
        kind: KindArg,
        #[arg(long, help = "Exit with an error when nothing is found")]
        require: bool,
    },
    /// Write a starter cordova-build-ios.toml.
    Init {
        #[arg(long, default_value = CONFIG_FILE_NAME)]
        output: PathBuf,
    },
}

/// Environment variable holding the code signing identity.
const CODE_SIGN_IDENTITY_ENV: &str = "CORDOVA_IOS_CODE_SIGN_IDENTITY";

/// Environment variable holding the provisioning profile UUID.
const PROVISIONING_PROFILE_ENV: &str = "CORDOVA_IOS_PROVISIONING_PROFILE";

#[derive(Args, Debug, Default, Clone)]
struct BuildArgs {
    #[arg(long, default_value = ".", help = "Directory inside the Cordova project")]
    project_dir: PathBuf,
    #[arg(long, help = "Optional path to config file (default: discover cordova-build-ios.toml)")]
    config: Option<PathBuf>,
    #[arg(long, overrides_with = "no_release", help = "Build in release mode")]
    release: bool,
    #[arg(long, overrides_with = "release", help = "Debug build even if the config file sets release")]
    no_release: bool,
    #[arg(long, overrides_with = "no_device", help = "Build for devices and collect the produced app")]
    device: bool,
    #[arg(long, overrides_with = "device", help = "Simulator build even if the config file sets device")]
    no_device: bool,
    #[arg(long, overrides_with = "no_re_add_platform", help = "Remove and add the iOS platform before building")]
    re_add_platform: bool,
    #[arg(long, overrides_with = "re_add_platform", help = "Keep an existing platform even if the config file sets re_add_platform")]
    no_re_add_platform: bool,
    #[arg(long = "platform-version", help = "cordova-ios version to add, e.g. 6.2.0")]
    version: Option<String>,
    #[arg(long, env = CODE_SIGN_IDENTITY_ENV)]
    code_sign_identity: Option<String>,
    #[arg(long, env = PROVISIONING_PROFILE_ENV)]
    provisioning_profile: Option<String>,
    #[arg(long, help = "Package the device build into this .ipa")]
    output: Option<PathBuf>,
    #[arg(long, help = "Kill external commands running longer than this")]
    timeout_secs: Option<u64>,
    #[arg(long, help = "Write a JSON summary of the invocation")]
    summary: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum KindArg {
    /// Regular files (e.g. .ipa)
    File,
    /// Directories (e.g. .app bundles)
    Dir,
}

impl From<KindArg> for EntryKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::File => EntryKind::File,
            KindArg::Dir => EntryKind::Directory,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct BuildSummary {
    generated_at: String,
    project_root: PathBuf,
    profile: String,
    provisioning: Vec<String>,
    flags: Vec<String>,
    build_started_at: String,
    artifact: Option<ArtifactSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactSummary {
    base: PathBuf,
    path: PathBuf,
    modified: String,
    size_bytes: Option<u64>,
}

pub fn run() -> Result<()> {
    load_dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Command::Build(args) => cmd_build(args, cli.dry_run),
        Command::Locate {
            dir,
            since,
            kind,
            require,
        } => cmd_locate(&dir, &since, kind.into(), require),
        Command::Init { output } => cmd_init(&output, cli.dry_run),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "cordova_build_ios=debug,cordova_build_ios_sdk=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .try_init();
}

fn load_dotenv() {
    if let Ok(cwd) = std::env::current_dir() {
        let root = find_project_root(&cwd).unwrap_or(cwd);
        let _ = dotenvy::from_path(root.join(".env.local"));
    }
}

/// Fills signing options missing from the command line and the process
/// environment from `<project_root>/.env.local`.
fn apply_project_env(args: &mut BuildArgs, project_root: &Path) -> Result<()> {
    let path = project_root.join(".env.local");
    if !path.is_file() {
        return Ok(());
    }
    let entries =
        dotenvy::from_path_iter(&path).with_context(|| format!("reading {:?}", path))?;
    for entry in entries {
        let (key, value) = entry.with_context(|| format!("parsing {:?}", path))?;
        match key.as_str() {
            CODE_SIGN_IDENTITY_ENV => {
                args.code_sign_identity.get_or_insert(value);
            }
            PROVISIONING_PROFILE_ENV => {
                args.provisioning_profile.get_or_insert(value);
            }
            _ => {}
        }
    }
    Ok(())
}

/// Resolves a `--flag` / `--no-flag` pair against the config file value.
fn switch(on: bool, off: bool, file: bool) -> bool {
    on || (!off && file)
}

/// Merges CLI arguments over the config file into one immutable configuration.
fn resolve_configuration(args: &BuildArgs, resolver: &ConfigResolver) -> BuildConfiguration {
    let build = resolver.build();
    let signing = resolver.signing();
    BuildConfiguration {
        release: switch(args.release, args.no_release, build.release),
        device: switch(args.device, args.no_device, build.device),
        re_add_platform: switch(
            args.re_add_platform,
            args.no_re_add_platform,
            build.re_add_platform,
        ),
        code_sign_identity: args.code_sign_identity.clone().or(signing.code_sign_identity),
        provisioning_profile: args
            .provisioning_profile
            .clone()
            .or(signing.provisioning_profile),
        version: args.version.clone().or(build.version),
        output_archive_path: args.output.clone().or(build.output_archive),
    }
}

fn cmd_build(mut args: BuildArgs, dry_run: bool) -> Result<()> {
    let project_root = find_project_root(&args.project_dir)
        .with_context(|| format!("Failed to locate Cordova project from {:?}", args.project_dir))?;
    apply_project_env(&mut args, &project_root)?;
    let resolver = ConfigResolver::new(args.config.as_deref(), &project_root)?;
    if let Some(config_path) = &resolver.config_path {
        println!("Using config file: {:?}", config_path);
    }

    let config = resolve_configuration(&args, &resolver);
    tracing::debug!(?config, "resolved build configuration");
    let timeout = resolver.timeout(args.timeout_secs);
    let toolchain = resolver.toolchain();
    let (program, leading_args) = toolchain.cordova_command();
    let cordova = leading_args
        .into_iter()
        .fold(CordovaCli::new(program), |cli, arg| cli.leading_arg(arg))
        .timeout(timeout);
    let packager = ZipPackager::new(&toolchain.zip).timeout(timeout);
    let builder = IosBuilder::new(&project_root)
        .with_toolchain(cordova)
        .with_packager(packager);

    println!("Building iOS platform...");
    println!("  Project: {:?}", project_root);
    println!("  Profile: {}", config.profile().as_str());
    println!("  Target: {}", if config.device { "device" } else { "simulator" });
    if let Some(archive) = &config.output_archive_path {
        println!("  Output: {:?}", archive);
    }
    if let Some(timeout) = timeout {
        println!("  Timeout: {}s per command", timeout.as_secs());
    }

    if dry_run {
        println!("  Mode: dry-run (no changes will be made)");
        let plan = builder.plan(&config)?;
        print_plan(&plan);
        return Ok(());
    }

    let report = builder.build(&config)?;
    print_report(&report);

    if let Some(path) = &args.summary {
        let summary = build_summary(&report, &config)?;
        ensure_parent_dir(path)?;
        let contents = serde_json::to_string_pretty(&summary)?;
        fs::write(path, contents).with_context(|| format!("writing summary {:?}", path))?;
        println!("Summary written to {:?}", path);
    }

    Ok(())
}

fn print_plan(plan: &BuildPlan) {
    println!("\nProvisioning:");
    if plan.provisioning.is_noop() {
        println!("  (platform present, nothing to do)");
    }
    for step in plan.provisioning.steps() {
        println!("  cordova {}", step);
    }
    if plan.build_config.is_some() {
        println!("\nWould write {:?}", plan.project_root.join("build.json"));
    }
    println!("\nBuild:");
    println!("  cordova build ios {}", plan.flags.join(" "));
    if let Some((dir, kind)) = &plan.artifact_scan {
        println!("\nArtifact:");
        println!("  first new {} in {:?}", kind, dir);
    }
    if let Some(archive) = &plan.archive {
        println!("  packaged to {:?}", archive);
    }
}

fn print_report(report: &BuildReport) {
    for step in &report.provisioning {
        println!("✓ cordova {}", step);
    }
    println!("✓ cordova build ios {}", report.flags.join(" "));
    match &report.artifact {
        Some(artifact) => println!("✓ Artifact: {:?}", artifact.path),
        None => println!("No artifact collected (not a device build)"),
    }
}

fn build_summary(report: &BuildReport, config: &BuildConfiguration) -> Result<BuildSummary> {
    let artifact = match &report.artifact {
        Some(artifact) => Some(ArtifactSummary {
            base: artifact.base.clone(),
            path: artifact.path.clone(),
            modified: format_time(artifact.modified)?,
            size_bytes: fs::metadata(&artifact.path).ok().map(|m| m.len()),
        }),
        None => None,
    };
    Ok(BuildSummary {
        generated_at: format_time(SystemTime::now())?,
        project_root: report.project_root.clone(),
        profile: config.profile().as_str().to_string(),
        provisioning: report.provisioning.iter().map(ToString::to_string).collect(),
        flags: report.flags.clone(),
        build_started_at: format_time(report.build_started_at)?,
        artifact,
    })
}

fn cmd_locate(dir: &Path, since: &str, kind: EntryKind, require: bool) -> Result<()> {
    let window = BuildWindow::starting_at(parse_time(since)?);
    let report = scan(dir, &window, kind).with_context(|| format!("scanning {:?}", dir))?;
    print_scan(&report)?;
    if require && report.artifact.is_none() {
        bail!("no {} in {:?} modified after {}", kind, dir, since);
    }
    Ok(())
}

fn print_scan(report: &ScanReport) -> Result<()> {
    match &report.artifact {
        Some(artifact) => println!(
            "{} (modified {})",
            artifact.path.display(),
            format_time(artifact.modified)?
        ),
        None => println!("No matching entry found"),
    }
    for skipped in &report.skipped {
        println!("Skipped {:?}: {}", skipped.path, skipped.reason);
    }
    Ok(())
}

fn cmd_init(output: &Path, dry_run: bool) -> Result<()> {
    if dry_run {
        println!("Would write starter config to {:?}", output);
        return Ok(());
    }
    ensure_can_write(output)?;
    fs::write(output, FileConfig::generate_starter_toml())
        .with_context(|| format!("writing file {:?}", output))?;
    println!("Wrote starter config to {:?}", output);
    Ok(())
}

fn format_time(time: SystemTime) -> Result<String> {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .context("formatting timestamp")
}

fn parse_time(value: &str) -> Result<SystemTime> {
    let parsed = OffsetDateTime::parse(value, &Rfc3339)
        .with_context(|| format!("invalid RFC 3339 timestamp: {:?}", value))?;
    Ok(parsed.into())
}

fn ensure_can_write(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("refusing to overwrite existing file: {:?}", path);
    }
    ensure_parent_dir(path)
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating parent directory {:?}", parent))?;
    }
    Ok(())
}
