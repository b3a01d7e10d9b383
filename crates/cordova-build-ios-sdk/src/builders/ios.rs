//! iOS build automation
//!
//! [`IosBuilder`] runs one build invocation against a Cordova project:
//!
//! 1. Provision `platforms/ios` (see [`crate::provision`])
//! 2. Write `build.json` when signing options are given
//! 3. Open the [`BuildWindow`] and run the native build
//! 4. For device builds, locate the produced app in `platforms/ios/build/device`
//! 5. Optionally package the `.app` bundle into an `.ipa` with a [`Packager`]
//!
//! Each step blocks on the previous one and the first error ends the invocation.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::common::{device_output_dir, is_project_root, run_command};
use crate::locator::{BuildWindow, require_artifact};
use crate::provision::{PlatformState, ProvisionPlan, provision};
use crate::toolchain::{CordovaCli, Toolchain};
use crate::types::{
    BuildConfiguration, BuildError, BuildReport, EmittedArtifact, EntryKind, PLATFORM,
};

/// File name of the generated build configuration, relative to the project root.
pub const BUILD_CONFIG_FILE: &str = "build.json";

/// Signing settings for one build profile in `build.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningSettings {
    /// Code signing identity, e.g. `iPhone Distribution`.
    pub code_sign_identity: String,
    /// Provisioning profile UUID.
    pub provisioning_profile: String,
}

/// Signing settings for both build profiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSigning {
    /// Used by debug builds.
    pub debug: SigningSettings,
    /// Used by `--release` builds.
    pub release: SigningSettings,
}

/// The `build.json` document understood by the Cordova iOS platform.
///
/// ```json
/// { "ios": { "debug": { "codeSignIdentity": "...", "provisioningProfile": "..." },
///            "release": { "codeSignIdentity": "...", "provisioningProfile": "..." } } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfigFile {
    /// iOS platform section.
    pub ios: ProfileSigning,
}

impl BuildConfigFile {
    /// Uses the same identity and profile for debug and release builds.
    pub fn new(code_sign_identity: &str, provisioning_profile: &str) -> Self {
        let settings = SigningSettings {
            code_sign_identity: code_sign_identity.to_string(),
            provisioning_profile: provisioning_profile.to_string(),
        };
        Self {
            ios: ProfileSigning {
                debug: settings.clone(),
                release: settings,
            },
        }
    }

    /// Writes the document to `<project_root>/build.json` and returns its path.
    pub fn write(&self, project_root: &Path) -> Result<PathBuf, BuildError> {
        let path = project_root.join(BUILD_CONFIG_FILE);
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(&path, contents)?;
        Ok(path)
    }
}

/// Derives the native build options from `config`.
///
/// `--release` and `--device` map 1:1 from the configuration. Signing is
/// always passed through `build.json`, never as individual flags.
pub fn build_flags(config: &BuildConfiguration) -> Vec<String> {
    let mut flags = Vec::new();
    if config.release {
        flags.push("--release".to_string());
    }
    if config.device {
        flags.push("--device".to_string());
    }
    if config.signing().is_some() {
        flags.push(format!("--buildConfig={}", BUILD_CONFIG_FILE));
    }
    flags
}

/// Everything an invocation will do, computed without side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    /// Project root the invocation runs against.
    pub project_root: PathBuf,
    /// Provisioning decision.
    pub provisioning: ProvisionPlan,
    /// Options for the native build.
    pub flags: Vec<String>,
    /// `build.json` to write before the build, if signing is configured.
    pub build_config: Option<BuildConfigFile>,
    /// Directory and entry kind scanned after a device build.
    pub artifact_scan: Option<(PathBuf, EntryKind)>,
    /// Absolute path of the `.ipa` to package, if requested.
    pub archive: Option<PathBuf>,
}

/// Repackages a device build's `.app` bundle into an installable archive.
pub trait Packager {
    /// Packages `app_bundle` into `output`, replacing an existing file.
    fn package(&self, app_bundle: &Path, output: &Path) -> Result<(), BuildError>;
}

impl<P: Packager + ?Sized> Packager for &P {
    fn package(&self, app_bundle: &Path, output: &Path) -> Result<(), BuildError> {
        (**self).package(app_bundle, output)
    }
}

/// [`Packager`] that builds an `.ipa` as a zip of `Payload/<App>.app`.
///
/// The bundle is copied into a staging `Payload/` directory next to the
/// output and archived with the external `zip` tool.
#[derive(Debug, Clone)]
pub struct ZipPackager {
    program: PathBuf,
    leading_args: Vec<OsString>,
    timeout: Option<Duration>,
}

impl Default for ZipPackager {
    fn default() -> Self {
        Self::new("zip")
    }
}

impl ZipPackager {
    /// Creates a packager that runs `program` (usually `zip`).
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            timeout: None,
        }
    }

    /// Adds an argument placed before the archiving options.
    pub fn leading_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.leading_args.push(arg.into());
        self
    }

    /// Sets a timeout for the archiving command.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Packager for ZipPackager {
    fn package(&self, app_bundle: &Path, output: &Path) -> Result<(), BuildError> {
        let output = std::path::absolute(output)?;
        let export_dir = output
            .parent()
            .ok_or_else(|| BuildError::Package(format!("Invalid archive path {:?}", output)))?;
        let app_name = app_bundle
            .file_name()
            .ok_or_else(|| BuildError::Package(format!("Invalid app bundle path {:?}", app_bundle)))?;
        let archive_name = output
            .file_name()
            .ok_or_else(|| BuildError::Package(format!("Invalid archive path {:?}", output)))?
            .to_string_lossy()
            .into_owned();

        fs::create_dir_all(export_dir)
            .map_err(|e| BuildError::Package(format!("Failed to create {:?}: {}", export_dir, e)))?;

        let staging = export_dir.join(format!(".{}.staging", archive_name));
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|e| {
                BuildError::Package(format!("Failed to remove old staging dir: {}", e))
            })?;
        }

        let result = self.archive_staged(app_bundle, app_name, &staging, &output);
        let cleanup = fs::remove_dir_all(&staging);
        result?;
        cleanup
            .map_err(|e| BuildError::Package(format!("Failed to clean up staging dir: {}", e)))?;

        info!(archive = ?output, "packaged app bundle");
        Ok(())
    }
}

impl ZipPackager {
    /// Copies the bundle into `<staging>/Payload/` and zips it into `output`.
    fn archive_staged(
        &self,
        app_bundle: &Path,
        app_name: &OsStr,
        staging: &Path,
        output: &Path,
    ) -> Result<(), BuildError> {
        copy_dir_recursive(app_bundle, &staging.join("Payload").join(app_name))?;

        if output.exists() {
            fs::remove_file(output)
                .map_err(|e| BuildError::Package(format!("Failed to remove old archive: {}", e)))?;
        }

        // -y stores symlinks (framework `Versions/Current`) as links.
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .arg("-qry")
            .arg(output)
            .arg("Payload")
            .current_dir(staging);
        run_command(cmd, "zip IPA", self.timeout, BuildError::Package)?;
        Ok(())
    }
}

/// Recursively copies a directory, recreating symlinks instead of following them
fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<(), BuildError> {
    fs::create_dir_all(dest)
        .map_err(|e| BuildError::Package(format!("Failed to create directory {:?}: {}", dest, e)))?;

    for entry in fs::read_dir(src)
        .map_err(|e| BuildError::Package(format!("Failed to read directory {:?}: {}", src, e)))?
    {
        let entry =
            entry.map_err(|e| BuildError::Package(format!("Failed to read entry: {}", e)))?;
        let path = entry.path();
        let dest_path = dest.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|e| BuildError::Package(format!("Failed to stat {:?}: {}", path, e)))?;

        if file_type.is_symlink() {
            copy_symlink(&path, &dest_path)?;
        } else if file_type.is_dir() {
            copy_dir_recursive(&path, &dest_path)?;
        } else {
            fs::copy(&path, &dest_path).map_err(|e| {
                BuildError::Package(format!(
                    "Failed to copy {:?} to {:?}: {}",
                    path, dest_path, e
                ))
            })?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> Result<(), BuildError> {
    let target = fs::read_link(src)
        .map_err(|e| BuildError::Package(format!("Failed to read link {:?}: {}", src, e)))?;
    std::os::unix::fs::symlink(&target, dest)
        .map_err(|e| BuildError::Package(format!("Failed to link {:?}: {}", dest, e)))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dest: &Path) -> Result<(), BuildError> {
    if src.is_dir() {
        copy_dir_recursive(src, dest)
    } else {
        fs::copy(src, dest)
            .map(|_| ())
            .map_err(|e| BuildError::Package(format!("Failed to copy {:?}: {}", src, e)))
    }
}

/// iOS builder that runs the complete invocation
///
/// # Example
///
/// ```no_run
/// use cordova_build_ios_sdk::builders::IosBuilder;
/// use cordova_build_ios_sdk::BuildConfiguration;
///
/// let config = BuildConfiguration {
///     release: true,
///     device: true,
///     ..Default::default()
/// };
/// let report = IosBuilder::new("/path/to/cordova-app").build(&config)?;
/// if let Some(ipa) = report.artifact {
///     println!("built {:?}", ipa.path);
/// }
/// # Ok::<(), cordova_build_ios_sdk::BuildError>(())
/// ```
pub struct IosBuilder<T = CordovaCli, P = ZipPackager> {
    /// Root directory of the Cordova project
    project_root: PathBuf,
    toolchain: T,
    packager: P,
}

impl IosBuilder {
    /// Creates a builder using the `cordova` and `zip` tools from `PATH`
    ///
    /// # Arguments
    ///
    /// * `project_root` - Root of the Cordova project (see
    ///   [`super::common::find_project_root`])
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            toolchain: CordovaCli::default(),
            packager: ZipPackager::default(),
        }
    }
}

impl<T: Toolchain, P: Packager> IosBuilder<T, P> {
    /// Replaces the toolchain
    pub fn with_toolchain<U: Toolchain>(self, toolchain: U) -> IosBuilder<U, P> {
        IosBuilder {
            project_root: self.project_root,
            toolchain,
            packager: self.packager,
        }
    }

    /// Replaces the packager
    pub fn with_packager<Q: Packager>(self, packager: Q) -> IosBuilder<T, Q> {
        IosBuilder {
            project_root: self.project_root,
            toolchain: self.toolchain,
            packager,
        }
    }

    /// Returns the project root
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Computes what [`Self::build`] would do for `config` without running anything
    ///
    /// Fails with [`BuildError::ProjectRootNotFound`] unless the project root
    /// holds `www/` and a `config.xml`.
    pub fn plan(&self, config: &BuildConfiguration) -> Result<BuildPlan, BuildError> {
        if !is_project_root(&self.project_root) {
            return Err(BuildError::ProjectRootNotFound(self.project_root.clone()));
        }
        config.validate()?;

        let state = PlatformState::detect(&self.project_root);
        let provisioning = ProvisionPlan::decide(state, config);

        let build_config = config
            .signing()
            .map(|(identity, profile)| BuildConfigFile::new(identity, profile));
        if build_config.is_none()
            && (config.code_sign_identity.is_some() || config.provisioning_profile.is_some())
        {
            warn!("signing needs both a code sign identity and a provisioning profile; ignoring");
        }

        let artifact_scan = config
            .expected_artifact_kind()
            .map(|kind| (device_output_dir(&self.project_root), kind));
        let archive = config.output_archive_path.as_ref().map(|path| {
            if path.is_absolute() {
                path.clone()
            } else {
                self.project_root.join(path)
            }
        });

        Ok(BuildPlan {
            project_root: self.project_root.clone(),
            provisioning,
            flags: build_flags(config),
            build_config,
            artifact_scan,
            archive,
        })
    }

    /// Runs the invocation
    ///
    /// # Returns
    ///
    /// * `Ok(BuildReport)` - with an artifact for device builds, none otherwise
    /// * `Err(BuildError)` - from the first step that failed
    pub fn build(&self, config: &BuildConfiguration) -> Result<BuildReport, BuildError> {
        let plan = self.plan(config)?;

        provision(&self.toolchain, &self.project_root, &plan.provisioning)?;

        if let Some(build_config) = &plan.build_config {
            let path = build_config.write(&self.project_root)?;
            info!(path = ?path, "wrote build configuration");
        }

        let window = BuildWindow::open();
        self.toolchain
            .build(&self.project_root, &[PLATFORM], &plan.flags)?;

        let artifact = match &plan.artifact_scan {
            Some((dir, kind)) => {
                Some(self.collect_artifact(dir, *kind, &window, plan.archive.as_deref())?)
            }
            None => None,
        };

        Ok(BuildReport {
            project_root: self.project_root.clone(),
            provisioning: plan.provisioning.steps().to_vec(),
            flags: plan.flags,
            build_started_at: window.started_at(),
            artifact,
        })
    }

    fn collect_artifact(
        &self,
        dir: &Path,
        kind: EntryKind,
        window: &BuildWindow,
        archive: Option<&Path>,
    ) -> Result<EmittedArtifact, BuildError> {
        let located = require_artifact(dir, window, kind)?;

        let Some(archive) = archive else {
            return Ok(EmittedArtifact {
                base: dir.to_path_buf(),
                path: located.path,
                modified: located.modified,
            });
        };

        self.packager.package(&located.path, archive)?;

        let modified = fs::metadata(archive)
            .and_then(|m| m.modified())
            .map_err(|e| BuildError::Package(format!("archive {:?} not written: {}", archive, e)))?;
        if !window.contains(modified) {
            return Err(BuildError::Package(format!(
                "archive {:?} was not updated by this build",
                archive
            )));
        }

        Ok(EmittedArtifact {
            base: archive
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.project_root.clone()),
            path: archive.to_path_buf(),
            modified,
        })
    }
}
