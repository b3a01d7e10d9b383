//! Common utilities shared by the toolchain, the builder and the packager.
//!
//! ## Features
//!
//! - **Project root lookup** - Finds the enclosing Cordova project the same way
//!   the Cordova CLI does
//! - **Well-known paths** - Platform subtree and device output directory
//! - **Command execution** - Runs external tools with captured output, an
//!   optional timeout, and error messages that carry the tool's stderr
//!
//! Every path is passed explicitly; nothing here reads or changes the
//! process working directory.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::types::{BuildError, PLATFORM};

/// How often a command with a timeout is polled for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Number of output lines kept in error messages.
const ERROR_TAIL_LINES: usize = 20;

/// Finds the Cordova project root at or above `start`.
///
/// A project root is a directory containing a `www/` directory and a
/// `config.xml` file (either next to `www/` or, in older layouts, inside it).
///
/// # Returns
/// The canonical project root, or [`BuildError::ProjectRootNotFound`].
pub fn find_project_root(start: &Path) -> Result<PathBuf, BuildError> {
    let start = fs::canonicalize(start).unwrap_or_else(|_| start.to_path_buf());
    start
        .ancestors()
        .find(|candidate| is_project_root(candidate))
        .map(Path::to_path_buf)
        .ok_or_else(|| BuildError::ProjectRootNotFound(start.clone()))
}

pub(crate) fn is_project_root(candidate: &Path) -> bool {
    let www = candidate.join("www");
    www.is_dir() && (candidate.join("config.xml").is_file() || www.join("config.xml").is_file())
}

/// Returns the iOS platform subtree, `<root>/platforms/ios`.
pub fn platform_dir(project_root: &Path) -> PathBuf {
    project_root.join("platforms").join(PLATFORM)
}

/// Returns the directory a device build writes its output to,
/// `<root>/platforms/ios/build/device`.
pub fn device_output_dir(project_root: &Path) -> PathBuf {
    platform_dir(project_root).join("build").join("device")
}

/// Runs `cmd` to completion and returns its captured output.
///
/// # Arguments
/// * `cmd` - The command to run; stdin is closed, stdout and stderr are captured
/// * `description` - Human-readable name used in logs and errors
/// * `timeout` - Kill the command if it runs longer than this
/// * `wrap` - Builds the error for a spawn failure or non-zero exit, e.g.
///   [`BuildError::Provision`]
///
/// # Returns
/// The output of a successful run. A non-zero exit becomes `wrap(message)`
/// where the message includes the tail of stderr (or stdout when stderr is
/// empty). An expired timeout becomes [`BuildError::Timeout`].
pub fn run_command(
    mut cmd: Command,
    description: &str,
    timeout: Option<Duration>,
    wrap: fn(String) -> BuildError,
) -> Result<Output, BuildError> {
    debug!(command = ?cmd, "running {}", description);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    if timeout.is_some() {
        use std::os::unix::process::CommandExt;
        // Own group so a timeout also reaches the tools the command spawned.
        cmd.process_group(0);
    }

    let child = cmd
        .spawn()
        .map_err(|e| wrap(format!("Failed to run {}: {}", description, e)))?;

    let output = match timeout {
        None => child.wait_with_output(),
        Some(limit) => match wait_with_timeout(child, limit) {
            Ok(Some(output)) => Ok(output),
            Ok(None) => {
                return Err(BuildError::Timeout {
                    command: description.to_string(),
                    timeout: limit,
                });
            }
            Err(e) => Err(e),
        },
    }
    .map_err(|e| wrap(format!("Failed to wait for {}: {}", description, e)))?;

    if !output.status.success() {
        return Err(wrap(format!(
            "{} failed ({}): {}",
            description,
            output.status,
            failure_detail(&output)
        )));
    }

    debug!(status = %output.status, "{} finished", description);
    Ok(output)
}

/// Waits for `child`, killing it once `limit` has passed.
///
/// Returns `Ok(None)` on timeout, after the child's whole process group has
/// been killed. Output pipes are drained on helper threads so a chatty child
/// cannot block on a full pipe while being polled.
fn wait_with_timeout(mut child: Child, limit: Duration) -> io::Result<Option<Output>> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_reader = thread::spawn(move || drain(stdout));
    let stderr_reader = thread::spawn(move || drain(stderr));

    let deadline = Instant::now() + limit;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            kill_process_group(&mut child);
            let _ = child.wait();
            let _ = stdout_reader.join();
            let _ = stderr_reader.join();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    };

    Ok(Some(Output {
        status,
        stdout: stdout_reader.join().unwrap_or_default(),
        stderr: stderr_reader.join().unwrap_or_default(),
    }))
}

/// Kills `child` and, on Unix, every process in its group.
fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let pgid = Pid::from_raw(child.id() as i32);
        if let Err(e) = killpg(pgid, Signal::SIGKILL) {
            debug!(pgid = %pgid, error = %e, "failed to kill process group");
        }
    }
    let _ = child.kill();
}

fn drain<R: Read>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    buf
}

fn failure_detail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let text = if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout)
    } else {
        stderr
    };
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cordova_project(dir: &Path) {
        fs::create_dir_all(dir.join("www")).unwrap();
        fs::write(dir.join("config.xml"), "<widget/>").unwrap();
    }

    #[test]
    fn finds_project_root_from_nested_directory() {
        let temp = TempDir::new().unwrap();
        cordova_project(temp.path());
        let nested = temp.path().join("www").join("js");
        fs::create_dir_all(&nested).unwrap();

        let root = find_project_root(&nested).unwrap();
        assert_eq!(root, fs::canonicalize(temp.path()).unwrap());
    }

    #[test]
    fn accepts_legacy_config_inside_www() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("www")).unwrap();
        fs::write(temp.path().join("www").join("config.xml"), "<widget/>").unwrap();

        assert!(find_project_root(temp.path()).is_ok());
    }

    #[test]
    fn missing_project_root_is_an_error() {
        let temp = TempDir::new().unwrap();
        let err = find_project_root(temp.path()).unwrap_err();
        assert!(matches!(err, BuildError::ProjectRootNotFound(_)));
    }

    #[test]
    fn device_output_dir_layout() {
        let dir = device_output_dir(Path::new("/project"));
        assert_eq!(dir, PathBuf::from("/project/platforms/ios/build/device"));
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_reports_stderr() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo boom >&2; exit 3"]);
        let err = run_command(cmd, "failing tool", None, BuildError::Build).unwrap_err();
        match err {
            BuildError::Build(message) => {
                assert!(message.contains("failing tool failed"));
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn stdout_is_used_when_stderr_is_empty() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo 'Error: no platforms added'; exit 1"]);
        let err = run_command(cmd, "cordova build", None, BuildError::Build).unwrap_err();
        assert!(err.to_string().contains("no platforms added"));
    }

    #[cfg(unix)]
    #[test]
    fn successful_command_returns_output() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo ready"]);
        let output = run_command(
            cmd,
            "echo",
            Some(Duration::from_secs(10)),
            BuildError::Build,
        )
        .unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "ready");
    }

    #[cfg(unix)]
    #[test]
    fn slow_command_times_out() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let started = Instant::now();
        let err = run_command(
            cmd,
            "sleep",
            Some(Duration::from_millis(200)),
            BuildError::Build,
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_spawned_descendants() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("ticks.log");
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg("(while true; do echo tick >> \"$1\"; sleep 0.05; done) & wait")
            .arg("sh")
            .arg(&log);

        let started = Instant::now();
        let err = run_command(
            cmd,
            "ticker",
            Some(Duration::from_millis(300)),
            BuildError::Build,
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));

        thread::sleep(Duration::from_millis(200));
        let ticks = fs::read_to_string(&log).unwrap_or_default().lines().count();
        thread::sleep(Duration::from_millis(500));
        let later = fs::read_to_string(&log).unwrap_or_default().lines().count();
        assert_eq!(ticks, later, "background writer outlived the timeout");
    }

    #[test]
    fn missing_program_is_wrapped() {
        let cmd = Command::new("definitely-not-a-real-tool-4f1c");
        let err = run_command(cmd, "missing tool", None, BuildError::Package).unwrap_err();
        assert!(matches!(err, BuildError::Package(ref m) if m.contains("Failed to run missing tool")));
    }
}
