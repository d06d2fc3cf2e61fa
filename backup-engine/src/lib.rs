//! Backup Engine Library
//!
//! Produces database dumps, source-tree archives and git-synchronized
//! snapshots, and keeps an auditable record of every attempt.

pub mod config;
pub mod db;
pub mod executor;
pub mod fs;
pub mod models;
pub mod orchestrator;
pub mod process;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use models::backup_record::{BackupKind, BackupRecord, BackupStatus};
pub use orchestrator::BackupOrchestrator;
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;
