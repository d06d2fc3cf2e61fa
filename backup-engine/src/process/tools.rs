//! External tool resolution.
//!
//! Hosts install the database client tools in different places and do not
//! always put them on `PATH`, so every candidate is probed with a cheap
//! `--version` call and the first one that exits successfully wins.

use crate::utils::errors::{BackupError, Result};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

const VERSION_FLAG: &str = "--version";

/// Result of probing a single candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Found(PathBuf),
    NotFound { candidate: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct ToolResolver {
    probe_timeout: Duration,
}

impl ToolResolver {
    pub fn new(probe_timeout: Duration) -> Self {
        Self { probe_timeout }
    }

    /// Probe one candidate location
    pub async fn probe(&self, candidate: &str) -> ProbeOutcome {
        let mut cmd = Command::new(candidate);
        cmd.arg(VERSION_FLAG)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let not_found = |reason: String| ProbeOutcome::NotFound {
            candidate: candidate.to_string(),
            reason,
        };

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return not_found(e.to_string()),
        };

        match tokio::time::timeout(self.probe_timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => ProbeOutcome::Found(PathBuf::from(candidate)),
            Ok(Ok(status)) => not_found(format!("probe exited with {status}")),
            Ok(Err(e)) => not_found(e.to_string()),
            Err(_) => not_found(format!("probe timed out after {:?}", self.probe_timeout)),
        }
    }

    /// Returns the first usable candidate, or `ToolNotFound` listing why
    /// each one was rejected.
    pub async fn resolve(&self, tool: &str, candidates: &[String]) -> Result<PathBuf> {
        let mut attempts = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            match self.probe(candidate).await {
                ProbeOutcome::Found(path) => {
                    info!(tool, path = %path.display(), "Resolved external tool");
                    return Ok(path);
                }
                ProbeOutcome::NotFound { candidate, reason } => {
                    debug!(tool, %candidate, %reason, "Tool candidate rejected");
                    attempts.push(format!("{candidate}: {reason}"));
                }
            }
        }

        if attempts.is_empty() {
            attempts.push("no candidates configured".to_string());
        }

        Err(BackupError::ToolNotFound {
            tool: tool.to_string(),
            attempts,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::process::test_support::write_script;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_first_working_candidate_wins() {
        let temp = TempDir::new().unwrap();
        let broken = write_script(temp.path(), "broken-dump", "exit 1");
        let good = write_script(temp.path(), "good-dump", "echo 'dump 8.0'");
        let also_good = write_script(temp.path(), "other-dump", "exit 0");

        let candidates = vec![
            temp.path().join("missing").to_string_lossy().to_string(),
            broken.to_string_lossy().to_string(),
            good.to_string_lossy().to_string(),
            also_good.to_string_lossy().to_string(),
        ];

        let resolver = ToolResolver::new(Duration::from_secs(5));
        let path = resolver.resolve("mysqldump", &candidates).await.unwrap();
        assert_eq!(path, good);
    }

    #[tokio::test]
    async fn test_all_candidates_fail() {
        let temp = TempDir::new().unwrap();
        let slow = write_script(temp.path(), "slow-dump", "sleep 5");
        let candidates = vec![
            "/nonexistent/bin/mysqldump".to_string(),
            slow.to_string_lossy().to_string(),
        ];

        let resolver = ToolResolver::new(Duration::from_millis(200));
        let err = resolver.resolve("mysqldump", &candidates).await.unwrap_err();
        match &err {
            BackupError::ToolNotFound { tool, attempts } => {
                assert_eq!(tool, "mysqldump");
                assert_eq!(attempts.len(), 2);
                assert!(attempts[1].contains("timed out"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("Tool resolution failed"));
    }

    #[tokio::test]
    async fn test_probe_reports_reason() {
        let resolver = ToolResolver::new(Duration::from_secs(1));
        let outcome = resolver.probe("/nonexistent/tool").await;
        assert!(matches!(outcome, ProbeOutcome::NotFound { .. }));
    }
}
