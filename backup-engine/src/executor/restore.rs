//! Database restore from a `.sql` dump through the `mysql` client.

use crate::config::DatabaseConfig;
use crate::process::{check_success, spawn_error};
use crate::utils::errors::{BackupError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::info;

const PROGRAM: &str = "mysql";

pub struct DatabaseRestoreExecutor {
    tool: PathBuf,
    database: DatabaseConfig,
    timeout: Duration,
}

impl DatabaseRestoreExecutor {
    pub fn new(tool: PathBuf, database: &DatabaseConfig) -> Self {
        Self {
            tool,
            timeout: database.restore_timeout(),
            database: database.clone(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Feeds `dump` to the client's standard input. This overwrites the
    /// objects contained in the dump.
    pub async fn restore(&self, dump: &Path) -> Result<()> {
        let file = std::fs::File::open(dump)
            .map_err(|e| BackupError::fs(format!("opening dump {}", dump.display()), e))?;

        info!(database = %self.database.name, dump = %dump.display(), "Starting database restore");

        let db = &self.database;
        let mut cmd = Command::new(&self.tool);
        cmd.arg(format!("--host={}", db.host))
            .arg(format!("--port={}", db.port))
            .arg(format!("--user={}", db.user))
            .arg(&db.name)
            .stdin(Stdio::from(file))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !db.password.is_empty() {
            cmd.env("MYSQL_PWD", &db.password);
        }

        let child = cmd.spawn().map_err(|e| spawn_error(PROGRAM, e))?;
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| BackupError::ProcessTimeout {
                program: PROGRAM.to_string(),
                timeout: self.timeout,
            })?
            .map_err(|e| BackupError::fs("waiting for mysql", e))?;

        check_success(PROGRAM, &output)?;
        info!(database = %db.name, "Database restore completed");
        Ok(())
    }
}
