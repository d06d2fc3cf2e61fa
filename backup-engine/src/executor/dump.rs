//! Database dump through `mysqldump`.
//!
//! The tool's standard output is streamed straight into a uniquely named
//! `.sql` file; standard error is captured for diagnostics. A dump that
//! fails or times out is deleted, never kept as if it were complete.

use crate::config::DatabaseConfig;
use crate::executor::{discard_partial, Artifact};
use crate::fs::naming;
use crate::process::{check_success, spawn_error};
use crate::utils::errors::{BackupError, Result};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

const PROGRAM: &str = "mysqldump";

pub struct DatabaseDumpExecutor {
    tool: PathBuf,
    database: DatabaseConfig,
    dest_dir: PathBuf,
    timeout: Duration,
}

impl DatabaseDumpExecutor {
    pub fn new(tool: PathBuf, database: &DatabaseConfig, dest_dir: PathBuf) -> Self {
        Self {
            tool,
            timeout: database.dump_timeout(),
            database: database.clone(),
            dest_dir,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn args(&self) -> Vec<String> {
        let db = &self.database;
        vec![
            format!("--host={}", db.host),
            format!("--port={}", db.port),
            format!("--user={}", db.user),
            "--single-transaction".to_string(),
            "--routines".to_string(),
            "--triggers".to_string(),
            "--events".to_string(),
            db.name.clone(),
        ]
    }

    pub async fn execute(&self) -> Result<Artifact> {
        let stem = naming::dump_stem(&self.database.name, chrono::Local::now());
        let (path, file) = naming::create_unique(&self.dest_dir, &stem, ".sql")
            .map_err(|e| BackupError::fs(format!("creating dump file in {}", self.dest_dir.display()), e))?;

        info!(database = %self.database.name, path = %path.display(), "Starting database dump");

        let mut cmd = Command::new(&self.tool);
        cmd.args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::from(file))
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Keeps the password off the command line.
        if !self.database.password.is_empty() {
            cmd.env("MYSQL_PWD", &self.database.password);
        }

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                discard_partial(&path);
                return Err(spawn_error(PROGRAM, e));
            }
        };

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                discard_partial(&path);
                return Err(BackupError::fs("waiting for mysqldump", e));
            }
            Err(_) => {
                // Dropping the wait future kills the child.
                warn!(path = %path.display(), timeout_secs = self.timeout.as_secs(), "Database dump timed out");
                discard_partial(&path);
                return Err(BackupError::ProcessTimeout {
                    program: PROGRAM.to_string(),
                    timeout: self.timeout,
                });
            }
        };

        if let Err(e) = check_success(PROGRAM, &output) {
            warn!(path = %path.display(), "Database dump failed: {}", e);
            discard_partial(&path);
            return Err(e);
        }

        let artifact = Artifact::from_disk(path)?;
        info!(
            path = %artifact.path.display(),
            size_bytes = artifact.size_bytes,
            "Database dump completed"
        );
        Ok(artifact)
    }
}
