//! Locating the output of an out-of-process build.
//!
//! The toolchain does not report where it put the app it produced, so the
//! output directory is scanned for the entry modified after the build was
//! started. A [`BuildWindow`] records that instant; [`scan`] lists the
//! direct children of the directory in file-name order and picks the first
//! entry of the expected [`EntryKind`] inside the window.
//!
//! Two invocations building into the same output directory at the same time
//! can pick up each other's output. Callers must not run them concurrently.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::types::{BuildError, EntryKind, LocatedArtifact};

/// The instant a build was started.
///
/// Open the window immediately before issuing the build call and never move
/// it afterwards: anything modified strictly after [`Self::started_at`] is
/// treated as output of that build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildWindow {
    started_at: SystemTime,
}

impl BuildWindow {
    /// Opens a window starting now.
    pub fn open() -> Self {
        Self::starting_at(SystemTime::now())
    }

    /// Opens a window starting at `started_at`.
    pub fn starting_at(started_at: SystemTime) -> Self {
        Self { started_at }
    }

    /// Returns the start of the window.
    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Returns `true` if `modified` is strictly after the start of the window.
    pub fn contains(&self, modified: SystemTime) -> bool {
        modified > self.started_at
    }
}

/// An entry the scan could not inspect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    /// Path of the entry, or of the directory when the entry name was unreadable.
    pub path: PathBuf,
    /// Why the entry was skipped.
    pub reason: String,
}

/// Outcome of scanning one directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// First matching entry, if any.
    pub artifact: Option<LocatedArtifact>,
    /// Entries that could not be read. They never abort the scan.
    pub skipped: Vec<SkippedEntry>,
}

/// Scans the direct children of `dir` for the first `kind` entry inside `window`.
///
/// Entries are visited in file-name order, so the result does not depend on
/// the order the filesystem returns them in. Symbolic links are never
/// selected. Entries whose metadata cannot be read are recorded in
/// [`ScanReport::skipped`] and the scan continues.
///
/// # Errors
/// Returns the I/O error if `dir` itself cannot be listed.
pub fn scan(dir: &Path, window: &BuildWindow, kind: EntryKind) -> io::Result<ScanReport> {
    let mut report = ScanReport::default();
    let mut entries = Vec::new();

    for entry in fs::read_dir(dir)? {
        match entry {
            Ok(entry) => entries.push(entry.path()),
            Err(e) => report.skipped.push(SkippedEntry {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            }),
        }
    }
    entries.sort();

    for path in entries {
        let metadata = match fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) => {
                report.skipped.push(SkippedEntry {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if !kind.matches(&metadata) {
            continue;
        }
        let modified = match metadata.modified() {
            Ok(modified) => modified,
            Err(e) => {
                report.skipped.push(SkippedEntry {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if window.contains(modified) {
            report.artifact = Some(LocatedArtifact { path, modified });
            break;
        }
    }

    for skipped in &report.skipped {
        warn!(path = ?skipped.path, reason = %skipped.reason, "skipping unreadable entry");
    }
    Ok(report)
}

/// Looks for an artifact where its absence is acceptable.
///
/// A missing `dir` or an empty/stale directory yields `Ok(None)`.
pub fn find_artifact(
    dir: &Path,
    window: &BuildWindow,
    kind: EntryKind,
) -> Result<Option<LocatedArtifact>, BuildError> {
    match scan(dir, window, kind) {
        Ok(report) => {
            if let Some(artifact) = &report.artifact {
                info!(path = ?artifact.path, "located artifact");
            }
            Ok(report.artifact)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(dir = ?dir, "output directory does not exist");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Looks for an artifact the invocation must have produced.
///
/// # Errors
/// - [`BuildError::MissingOutputDir`] if `dir` does not exist
/// - [`BuildError::ArtifactNotFound`] if no `kind` entry inside `window` exists
pub fn require_artifact(
    dir: &Path,
    window: &BuildWindow,
    kind: EntryKind,
) -> Result<LocatedArtifact, BuildError> {
    if !dir.is_dir() {
        return Err(BuildError::MissingOutputDir(dir.to_path_buf()));
    }
    find_artifact(dir, window, kind)?.ok_or_else(|| BuildError::ArtifactNotFound {
        dir: dir.to_path_buf(),
        kind,
    })
}
