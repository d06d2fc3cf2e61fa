//! External process plumbing shared by the executors.

pub mod tools;

pub use tools::{ProbeOutcome, ToolResolver};

use crate::utils::errors::{BackupError, Result};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

/// Runs `cmd` to completion with captured output. The child is killed if
/// `timeout` elapses first.
pub async fn output_with_timeout(
    mut cmd: Command,
    program: &str,
    timeout: Duration,
) -> Result<Output> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| spawn_error(program, e))?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(BackupError::fs(format!("waiting for {program}"), e)),
        Err(_) => Err(BackupError::ProcessTimeout {
            program: program.to_string(),
            timeout,
        }),
    }
}

/// Turns a non-zero exit into `ProcessFailed` with the captured diagnostics.
pub fn check_success(program: &str, output: &Output) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    Err(BackupError::ProcessFailed {
        program: program.to_string(),
        status: output.status.to_string(),
        stderr: diagnostic(output),
    })
}

/// Stderr of a finished process, falling back to stdout when stderr is empty
pub fn diagnostic(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !stderr.is_empty() {
        return stderr;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() {
        "no diagnostic output".to_string()
    } else {
        stdout
    }
}

pub(crate) fn spawn_error(program: &str, e: std::io::Error) -> BackupError {
    BackupError::ProcessFailed {
        program: program.to_string(),
        status: "not started".to_string(),
        stderr: e.to_string(),
    }
}

#[cfg(all(test, unix))]
pub(crate) mod test_support {
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    /// Writes an executable `/bin/sh` script standing in for an external tool.
    pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 5"]);
        let err = output_with_timeout(cmd, "sleep", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::ProcessTimeout { .. }));
    }

    #[tokio::test]
    async fn test_failure_reports_stderr() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo 'access denied' >&2; exit 2"]);
        let output = output_with_timeout(cmd, "sh", Duration::from_secs(5)).await.unwrap();
        let err = check_success("sh", &output).unwrap_err();
        match err {
            BackupError::ProcessFailed { stderr, .. } => assert_eq!(stderr, "access denied"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
