//! Core types for cordova-build-ios-sdk.
//!
//! This module defines the fundamental types used throughout the SDK:
//!
//! - [`BuildError`] - Error type for every step of a build invocation
//! - [`BuildConfiguration`] / [`BuildProfile`] - Options for one invocation
//! - [`EntryKind`] - Expected kind of a build output entry
//! - [`LocatedArtifact`] / [`EmittedArtifact`] - Output of the artifact scan
//! - [`BuildReport`] - What an invocation did

use std::fmt;
use std::fs::{File, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::provision::ProvisionStep;

/// Stable identifier carried by every [`BuildError`].
pub const PLUGIN_NAME: &str = "cordova-build-ios";

/// Cordova platform name this crate builds.
pub const PLATFORM: &str = "ios";

/// Error types for cordova-build-ios-sdk operations.
///
/// Every message starts with [`PLUGIN_NAME`] so that errors surfaced through
/// a larger build pipeline can be traced back to this component. The
/// invocation is all-or-nothing: the first error aborts it and is returned
/// to the caller unchanged.
///
/// # Example
///
/// ```
/// use cordova_build_ios_sdk::BuildError;
///
/// let err = BuildError::Provision("platform rm failed".into());
/// assert_eq!(err.component(), "cordova-build-ios");
/// assert!(err.to_string().starts_with("cordova-build-ios: "));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// No Cordova project was found at or above the start directory.
    #[error(
        "cordova-build-ios: no Cordova project found at or above {}.\n\n\
         A project root contains both config.xml and a www/ directory. \
         Run from inside the project or pass --project-dir.",
        .0.display()
    )]
    ProjectRootNotFound(PathBuf),

    /// Removing or adding the iOS platform failed.
    ///
    /// The build step is never run after this error.
    #[error("cordova-build-ios: provisioning failed: {0}")]
    Provision(String),

    /// The native build returned a non-zero exit status or could not be started.
    #[error("cordova-build-ios: build failed: {0}")]
    Build(String),

    /// A device build was requested but its output directory does not exist.
    #[error(
        "cordova-build-ios: device build output directory not found: {}. \
         The build reported success but produced no device output",
        .0.display()
    )]
    MissingOutputDir(PathBuf),

    /// A device build was requested but no entry newer than the build start appeared.
    #[error(
        "cordova-build-ios: no {kind} modified after the build started was found in {}",
        dir.display()
    )]
    ArtifactNotFound {
        /// Directory that was scanned.
        dir: PathBuf,
        /// Kind of entry that was expected.
        kind: EntryKind,
    },

    /// The packaging tool failed or did not write the archive.
    #[error("cordova-build-ios: packaging failed: {0}")]
    Package(String),

    /// An external command ran longer than its configured timeout and was killed.
    #[error(
        "cordova-build-ios: {command} timed out after {}s and was terminated",
        timeout.as_secs()
    )]
    Timeout {
        /// Description of the command that timed out.
        command: String,
        /// Limit that was exceeded.
        timeout: Duration,
    },

    /// The options for the invocation are inconsistent.
    #[error("cordova-build-ios: configuration error: {0}")]
    Config(String),

    /// An I/O error occurred.
    #[error("cordova-build-ios: I/O error: {0}")]
    Io(#[from] io::Error),

    /// Writing `build.json` failed.
    #[error("cordova-build-ios: serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BuildError {
    /// Returns the stable component identifier, [`PLUGIN_NAME`].
    pub fn component(&self) -> &'static str {
        PLUGIN_NAME
    }
}

/// Build profile passed to the native build.
///
/// # Example
///
/// ```
/// use cordova_build_ios_sdk::BuildProfile;
///
/// assert_eq!(BuildProfile::Release.as_str(), "release");
/// assert_eq!(BuildProfile::Debug.as_str(), "debug");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildProfile {
    /// Debug build (the toolchain default).
    Debug,
    /// Release build, selected with `--release`.
    Release,
}

impl BuildProfile {
    /// Returns the string representation of the profile.
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildProfile::Debug => "debug",
            BuildProfile::Release => "release",
        }
    }
}

/// Options for one build invocation.
///
/// Constructed once from caller input and never mutated while the
/// invocation runs; [`crate::builders::IosBuilder::build`] only borrows it.
///
/// # Example
///
/// ```
/// use cordova_build_ios_sdk::{BuildConfiguration, BuildProfile, EntryKind};
///
/// let config = BuildConfiguration {
///     release: true,
///     device: true,
///     version: Some("6.2.0".into()),
///     ..Default::default()
/// };
///
/// assert_eq!(config.profile(), BuildProfile::Release);
/// assert_eq!(config.platform_spec(), "ios@6.2.0");
/// assert_eq!(config.expected_artifact_kind(), Some(EntryKind::File));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildConfiguration {
    /// Build with `--release`.
    pub release: bool,
    /// Build for a device (`--device`) and collect the produced app.
    pub device: bool,
    /// Remove and add the platform again even if it already exists.
    pub re_add_platform: bool,
    /// Signing identity written to `build.json`.
    pub code_sign_identity: Option<String>,
    /// Provisioning profile UUID written to `build.json`.
    pub provisioning_profile: Option<String>,
    /// Platform version, added as `ios@<version>`.
    pub version: Option<String>,
    /// Where to write the packaged `.ipa`.
    ///
    /// When set, the device build's `.app` bundle is packaged into this file.
    /// Relative paths are resolved against the project root.
    pub output_archive_path: Option<PathBuf>,
}

impl BuildConfiguration {
    /// Returns the build profile selected by [`Self::release`].
    pub fn profile(&self) -> BuildProfile {
        if self.release {
            BuildProfile::Release
        } else {
            BuildProfile::Debug
        }
    }

    /// Returns the platform spec passed to `platform add`.
    pub fn platform_spec(&self) -> String {
        match non_empty(self.version.as_deref()) {
            Some(version) => format!("{}@{}", PLATFORM, version),
            None => PLATFORM.to_string(),
        }
    }

    /// Returns the signing identity and provisioning profile when both are set.
    ///
    /// Empty strings count as unset.
    pub fn signing(&self) -> Option<(&str, &str)> {
        match (
            non_empty(self.code_sign_identity.as_deref()),
            non_empty(self.provisioning_profile.as_deref()),
        ) {
            (Some(identity), Some(profile)) => Some((identity, profile)),
            _ => None,
        }
    }

    /// Returns the kind of entry a device build is expected to leave behind.
    ///
    /// - `None` when no device build is requested (nothing is scanned)
    /// - [`EntryKind::Directory`] (the `.app` bundle) when packaging is requested
    /// - [`EntryKind::File`] (the toolchain's `.ipa`) otherwise
    pub fn expected_artifact_kind(&self) -> Option<EntryKind> {
        if !self.device {
            None
        } else if self.output_archive_path.is_some() {
            Some(EntryKind::Directory)
        } else {
            Some(EntryKind::File)
        }
    }

    /// Checks that the options are consistent.
    ///
    /// Packaging needs the device build output, so an archive path without
    /// `device` is rejected before any external command runs.
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.output_archive_path.is_some() && !self.device {
            return Err(BuildError::Config(
                "an output archive requires a device build; enable `device` or drop the archive path"
                    .to_string(),
            ));
        }
        if let Some(path) = &self.output_archive_path
            && path.as_os_str().is_empty()
        {
            return Err(BuildError::Config("output archive path is empty".to_string()));
        }
        Ok(())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Kind of filesystem entry the artifact scan accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A regular file, such as a packaged `.ipa`.
    File,
    /// A directory, such as a device build's `.app` bundle.
    Directory,
}

impl EntryKind {
    /// Returns `true` if `metadata` describes this kind of entry.
    ///
    /// `metadata` must come from `symlink_metadata`; symbolic links never match.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        let file_type = metadata.file_type();
        match self {
            EntryKind::File => file_type.is_file(),
            EntryKind::Directory => file_type.is_dir(),
        }
    }

    /// Returns the string representation of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Directory => "directory",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entry found by the artifact scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedArtifact {
    /// Path of the entry.
    pub path: PathBuf,
    /// Modification time of the entry; always after the build start.
    pub modified: SystemTime,
}

/// The artifact handed downstream once an invocation succeeds.
///
/// Contents are not read until [`EmittedArtifact::open`] is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedArtifact {
    /// Directory the artifact is relative to.
    pub base: PathBuf,
    /// Full path of the artifact file.
    pub path: PathBuf,
    /// Modification time of the artifact file.
    pub modified: SystemTime,
}

impl EmittedArtifact {
    /// Returns the artifact path relative to [`Self::base`].
    pub fn relative_path(&self) -> &Path {
        self.path.strip_prefix(&self.base).unwrap_or(&self.path)
    }

    /// Opens the artifact for reading.
    pub fn open(&self) -> io::Result<File> {
        File::open(&self.path)
    }
}

/// Result of a successful build invocation.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Cordova project root the invocation ran against.
    pub project_root: PathBuf,
    /// Provisioning steps that were executed, in order.
    pub provisioning: Vec<ProvisionStep>,
    /// Options passed to the native build.
    pub flags: Vec<String>,
    /// When the native build was started.
    pub build_started_at: SystemTime,
    /// The emitted artifact, if the invocation produced one.
    pub artifact: Option<EmittedArtifact>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_spec_uses_version_when_set() {
        let mut config = BuildConfiguration::default();
        assert_eq!(config.platform_spec(), "ios");

        config.version = Some("".into());
        assert_eq!(config.platform_spec(), "ios");

        config.version = Some("4.5.4".into());
        assert_eq!(config.platform_spec(), "ios@4.5.4");
    }

    #[test]
    fn signing_requires_both_values() {
        let mut config = BuildConfiguration {
            code_sign_identity: Some("iPhone Distribution".into()),
            ..Default::default()
        };
        assert_eq!(config.signing(), None);

        config.provisioning_profile = Some(String::new());
        assert_eq!(config.signing(), None);

        config.provisioning_profile = Some("a1b2c3".into());
        assert_eq!(config.signing(), Some(("iPhone Distribution", "a1b2c3")));
    }

    #[test]
    fn expected_kind_follows_device_and_archive() {
        let mut config = BuildConfiguration::default();
        assert_eq!(config.expected_artifact_kind(), None);

        config.device = true;
        assert_eq!(config.expected_artifact_kind(), Some(EntryKind::File));

        config.output_archive_path = Some(PathBuf::from("dist/app.ipa"));
        assert_eq!(config.expected_artifact_kind(), Some(EntryKind::Directory));
    }

    #[test]
    fn archive_without_device_is_rejected() {
        let config = BuildConfiguration {
            output_archive_path: Some(PathBuf::from("app.ipa")),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, BuildError::Config(_)));
        assert!(err.to_string().starts_with("cordova-build-ios: "));
    }

    #[test]
    fn emitted_artifact_relative_path() {
        let artifact = EmittedArtifact {
            base: PathBuf::from("/p/platforms/ios/build/device"),
            path: PathBuf::from("/p/platforms/ios/build/device/App.ipa"),
            modified: SystemTime::UNIX_EPOCH,
        };
        assert_eq!(artifact.relative_path(), Path::new("App.ipa"));
    }
}
