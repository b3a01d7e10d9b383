//! The external Cordova toolchain.
//!
//! [`Toolchain`] is the boundary between this crate and the tool that owns
//! platform scaffolding and native compilation. [`CordovaCli`] implements it
//! by running the `cordova` command-line tool inside the project root.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::info;

use crate::builders::common::run_command;
use crate::types::BuildError;

/// Operations delegated to the Cordova toolchain.
///
/// Every call receives the project root explicitly and blocks until the
/// toolchain finishes. Implementations return [`BuildError::Provision`] for
/// platform add/remove failures and [`BuildError::Build`] for build failures.
pub trait Toolchain {
    /// Removes `platform` from the project.
    fn remove_platform(&self, project_root: &Path, platform: &str) -> Result<(), BuildError>;

    /// Adds the platform described by `spec` (`ios` or `ios@<version>`).
    fn add_platform(&self, project_root: &Path, spec: &str) -> Result<(), BuildError>;

    /// Builds `platforms` with the given command-line `options`.
    fn build(
        &self,
        project_root: &Path,
        platforms: &[&str],
        options: &[String],
    ) -> Result<(), BuildError>;
}

impl<T: Toolchain + ?Sized> Toolchain for &T {
    fn remove_platform(&self, project_root: &Path, platform: &str) -> Result<(), BuildError> {
        (**self).remove_platform(project_root, platform)
    }

    fn add_platform(&self, project_root: &Path, spec: &str) -> Result<(), BuildError> {
        (**self).add_platform(project_root, spec)
    }

    fn build(
        &self,
        project_root: &Path,
        platforms: &[&str],
        options: &[String],
    ) -> Result<(), BuildError> {
        (**self).build(project_root, platforms, options)
    }
}

/// [`Toolchain`] backed by the `cordova` CLI.
///
/// # Example
///
/// ```
/// use cordova_build_ios_sdk::toolchain::CordovaCli;
/// use std::time::Duration;
///
/// let cordova = CordovaCli::new("cordova").timeout(Some(Duration::from_secs(1800)));
/// assert_eq!(cordova.program().to_str(), Some("cordova"));
/// ```
#[derive(Debug, Clone)]
pub struct CordovaCli {
    program: PathBuf,
    leading_args: Vec<OsString>,
    timeout: Option<Duration>,
}

impl Default for CordovaCli {
    fn default() -> Self {
        Self::new("cordova")
    }
}

impl CordovaCli {
    /// Creates a toolchain that runs `program` (usually `cordova`).
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            timeout: None,
        }
    }

    /// Adds an argument placed before every toolchain subcommand.
    ///
    /// Used for launchers, e.g. `CordovaCli::new("npx").leading_arg("cordova")`.
    pub fn leading_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.leading_args.push(arg.into());
        self
    }

    /// Sets a timeout applied to every toolchain command.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the program this toolchain runs.
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self, project_root: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.current_dir(project_root)
            .args(&self.leading_args)
            .arg("--no-telemetry");
        cmd
    }
}

impl Toolchain for CordovaCli {
    fn remove_platform(&self, project_root: &Path, platform: &str) -> Result<(), BuildError> {
        info!(platform, "removing platform");
        let mut cmd = self.command(project_root);
        cmd.args(["platform", "rm", platform]);
        run_command(cmd, "cordova platform rm", self.timeout, BuildError::Provision)?;
        Ok(())
    }

    fn add_platform(&self, project_root: &Path, spec: &str) -> Result<(), BuildError> {
        info!(spec, "adding platform");
        let mut cmd = self.command(project_root);
        cmd.args(["platform", "add", spec]);
        run_command(cmd, "cordova platform add", self.timeout, BuildError::Provision)?;
        Ok(())
    }

    fn build(
        &self,
        project_root: &Path,
        platforms: &[&str],
        options: &[String],
    ) -> Result<(), BuildError> {
        info!(?platforms, ?options, "building");
        let mut cmd = self.command(project_root);
        cmd.arg("build").args(platforms).args(options);
        run_command(cmd, "cordova build", self.timeout, BuildError::Build)?;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Writes a stand-in `cordova` script that logs its arguments and working directory.
    fn fake_cordova(dir: &Path, exit_code: i32) -> CordovaCli {
        let script = dir.join("cordova.sh");
        fs::write(
            &script,
            format!(
                "#!/bin/sh\necho \"$(pwd -P)|$*\" >> \"{}\"\necho 'toolchain said no' >&2\nexit {}\n",
                dir.join("calls.log").display(),
                exit_code
            ),
        )
        .unwrap();
        CordovaCli::new("sh").leading_arg(script)
    }

    #[test]
    fn runs_in_project_root_with_expected_arguments() {
        let tools = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let cordova = fake_cordova(tools.path(), 0);

        cordova.add_platform(project.path(), "ios@6.2.0").unwrap();
        cordova
            .build(
                project.path(),
                &["ios"],
                &["--release".to_string(), "--device".to_string()],
            )
            .unwrap();

        let log = fs::read_to_string(tools.path().join("calls.log")).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        let root = fs::canonicalize(project.path()).unwrap();
        assert_eq!(
            lines[0],
            format!("{}|--no-telemetry platform add ios@6.2.0", root.display())
        );
        assert_eq!(
            lines[1],
            format!("{}|--no-telemetry build ios --release --device", root.display())
        );
    }

    #[test]
    fn platform_failure_is_a_provisioning_error() {
        let tools = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let cordova = fake_cordova(tools.path(), 1);

        let err = cordova.remove_platform(project.path(), "ios").unwrap_err();
        match err {
            BuildError::Provision(message) => assert!(message.contains("toolchain said no")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn build_failure_is_a_build_error() {
        let tools = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let cordova = fake_cordova(tools.path(), 2);

        let err = cordova.build(project.path(), &["ios"], &[]).unwrap_err();
        assert!(matches!(err, BuildError::Build(_)));
    }
}
