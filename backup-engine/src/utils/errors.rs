//! Custom error types for the backup engine.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Tool resolution failed for {tool}: no usable executable among [{}]", attempts.join("; "))]
    ToolNotFound { tool: String, attempts: Vec<String> },

    #[error("{program} timed out after {}s", timeout.as_secs())]
    ProcessTimeout { program: String, timeout: Duration },

    #[error("{program} failed ({status}): {stderr}")]
    ProcessFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("File system error ({context}): {source}")]
    FileSystem {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Bundle composition error: {0}")]
    BundleComposition(String),

    #[error("Git push failed: {0}")]
    GitPush(String),

    #[error("Busy: another {0} operation is in flight")]
    Busy(String),

    #[error("Backup record not found: {0}")]
    NotFound(String),

    #[error("Backup record {id} is {status} and cannot be run; create a new record")]
    NotRunnable { id: String, status: String },

    #[error("Backup record {0} is still in flight")]
    InFlight(String),

    #[error("Record store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Record store pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl BackupError {
    /// Wraps an I/O error with a description of what was being done.
    pub fn fs(context: impl Into<String>, source: std::io::Error) -> Self {
        BackupError::FileSystem {
            context: context.into(),
            source,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, BackupError::Busy(_))
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
