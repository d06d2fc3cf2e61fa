//! Backup step executors.
//!
//! Each executor owns one kind of external work and reports a typed result:
//! - Database dump and restore through the MySQL client tools
//! - Source archive of the project tree
//! - Bundle of already-produced artifacts
//! - Git synchronization of the project root

pub mod archive;
pub mod bundle;
pub mod dump;
pub mod git;
pub mod restore;

pub use archive::{ArchiveSummary, CodeArchiveBuilder};
pub use bundle::BundleComposer;
pub use dump::DatabaseDumpExecutor;
pub use git::{GitSyncClient, GitSyncReport, PushOutcome};
pub use restore::DatabaseRestoreExecutor;

use crate::utils::errors::{BackupError, Result};
use std::path::{Path, PathBuf};

/// A file produced by a backup step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl Artifact {
    /// Reads the size of a finished file from disk.
    pub fn from_disk(path: PathBuf) -> Result<Self> {
        let metadata = std::fs::metadata(&path)
            .map_err(|e| BackupError::fs(format!("reading size of {}", path.display()), e))?;
        Ok(Self {
            path,
            size_bytes: metadata.len(),
        })
    }

    /// True when the file still exists with the recorded size.
    pub fn is_intact(&self) -> bool {
        std::fs::metadata(&self.path)
            .map(|m| m.is_file() && m.len() == self.size_bytes)
            .unwrap_or(false)
    }
}

/// Best-effort removal of an abandoned partial output
pub(crate) fn discard_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed partial artifact"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "Failed to remove partial artifact: {}", e),
    }
}
