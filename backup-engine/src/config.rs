//! Configuration management for the backup engine.
//!
//! Loads configuration from a TOML file. Every field has a default, so an
//! empty file is a valid configuration. `BACKUP_DB_PASSWORD` overrides the
//! database password.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub root: RootConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Application directory; the project root is searched from here
    #[serde(default = "default_app_dir")]
    pub app_dir: PathBuf,

    /// Root of the `db/`, `code/` and `full/` output trees
    #[serde(default = "default_backup_root")]
    pub backup_root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,

    #[serde(default = "default_db_port")]
    pub port: u16,

    #[serde(default = "default_db_user")]
    pub user: String,

    #[serde(default, skip_serializing)]
    pub password: String,

    #[serde(default = "default_db_name")]
    pub name: String,

    /// Candidate locations of the dump tool, probed in order
    #[serde(default = "default_dump_candidates")]
    pub dump_candidates: Vec<String>,

    /// Candidate locations of the restore client, probed in order
    #[serde(default = "default_restore_candidates")]
    pub restore_candidates: Vec<String>,

    #[serde(default = "default_dump_timeout_secs")]
    pub dump_timeout_secs: u64,

    #[serde(default = "default_restore_timeout_secs")]
    pub restore_timeout_secs: u64,

    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Basenames pruned from the source archive
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    /// Gzip level (0-9)
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    #[serde(default = "default_git_program")]
    pub program: String,

    #[serde(default = "default_git_remote")]
    pub remote: String,

    #[serde(default = "default_git_branch")]
    pub branch: String,

    /// Commit identity used when the host has none configured
    #[serde(default)]
    pub author_name: Option<String>,

    #[serde(default)]
    pub author_email: Option<String>,

    #[serde(default = "default_git_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootConfig {
    /// How many ancestors (including the start directory) are inspected
    #[serde(default = "default_root_max_depth")]
    pub max_depth: usize,

    /// Version-control entries; a repository root anywhere within the bound
    /// wins over any manifest
    #[serde(default = "default_root_vcs_markers")]
    pub vcs_markers: Vec<String>,

    /// Manifest files used when no repository root is found
    #[serde(default = "default_root_markers")]
    pub markers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_app_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn default_backup_root() -> PathBuf {
    default_app_dir().join("backups")
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    3306
}

fn default_db_user() -> String {
    "root".to_string()
}

fn default_db_name() -> String {
    "vacaciones".to_string()
}

fn default_dump_candidates() -> Vec<String> {
    vec![
        "mysqldump".to_string(),
        "/usr/bin/mysqldump".to_string(),
        "/usr/local/mysql/bin/mysqldump".to_string(),
        "/opt/homebrew/bin/mysqldump".to_string(),
        r"C:\Program Files\MySQL\MySQL Server 8.0\bin\mysqldump.exe".to_string(),
        r"C:\xampp\mysql\bin\mysqldump.exe".to_string(),
    ]
}

fn default_restore_candidates() -> Vec<String> {
    vec![
        "mysql".to_string(),
        "/usr/bin/mysql".to_string(),
        "/usr/local/mysql/bin/mysql".to_string(),
        "/opt/homebrew/bin/mysql".to_string(),
        r"C:\Program Files\MySQL\MySQL Server 8.0\bin\mysql.exe".to_string(),
        r"C:\xampp\mysql\bin\mysql.exe".to_string(),
    ]
}

fn default_dump_timeout_secs() -> u64 {
    300
}

fn default_restore_timeout_secs() -> u64 {
    600
}

fn default_probe_timeout_secs() -> u64 {
    5
}

fn default_exclude() -> Vec<String> {
    [
        ".git",
        "node_modules",
        "__pycache__",
        "venv",
        ".venv",
        "target",
        "backups",
        ".DS_Store",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_compression_level() -> u32 {
    9
}

fn default_git_program() -> String {
    "git".to_string()
}

fn default_git_remote() -> String {
    "origin".to_string()
}

fn default_git_branch() -> String {
    "main".to_string()
}

fn default_git_timeout_secs() -> u64 {
    120
}

fn default_root_max_depth() -> usize {
    5
}

fn default_root_vcs_markers() -> Vec<String> {
    vec![".git".to_string()]
}

fn default_root_markers() -> Vec<String> {
    ["manage.py", "Cargo.toml", "package.json", "pyproject.toml"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            app_dir: default_app_dir(),
            backup_root: default_backup_root(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            user: default_db_user(),
            password: String::new(),
            name: default_db_name(),
            dump_candidates: default_dump_candidates(),
            restore_candidates: default_restore_candidates(),
            dump_timeout_secs: default_dump_timeout_secs(),
            restore_timeout_secs: default_restore_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            exclude: default_exclude(),
            compression_level: default_compression_level(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            program: default_git_program(),
            remote: default_git_remote(),
            branch: default_git_branch(),
            author_name: None,
            author_email: None,
            timeout_secs: default_git_timeout_secs(),
        }
    }
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            max_depth: default_root_max_depth(),
            vcs_markers: default_root_vcs_markers(),
            markers: default_root_markers(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl DatabaseConfig {
    pub fn dump_timeout(&self) -> Duration {
        Duration::from_secs(self.dump_timeout_secs)
    }

    pub fn restore_timeout(&self) -> Duration {
        Duration::from_secs(self.restore_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl GitConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PathsConfig {
    pub fn db_dir(&self) -> PathBuf {
        self.backup_root.join("db")
    }

    pub fn code_dir(&self) -> PathBuf {
        self.backup_root.join("code")
    }

    pub fn full_dir(&self) -> PathBuf {
        self.backup_root.join("full")
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env();
        Ok(config)
    }

    /// Parse configuration from TOML text (no environment overrides)
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Default configuration with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(password) = std::env::var("BACKUP_DB_PASSWORD") {
            self.database.password = password;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.database.port, 3306);
        assert_eq!(config.database.dump_timeout_secs, 300);
        assert_eq!(config.root.max_depth, 5);
        assert_eq!(config.root.vcs_markers, vec![".git"]);
        assert!(!config.root.markers.iter().any(|m| m == ".git"));
        assert_eq!(config.git.branch, "main");
        assert!(config.archive.exclude.iter().any(|e| e == ".git"));
        assert_eq!(config.archive.compression_level, 9);
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml(
            r#"
            [paths]
            app_dir = "/srv/app/project"
            backup_root = "/srv/backups"

            [database]
            name = "hr"
            dump_candidates = ["/opt/mysql/bin/mysqldump"]

            [git]
            remote = "backup"
            author_name = "Backup Bot"
            "#,
        )
        .unwrap();

        assert_eq!(config.paths.db_dir(), PathBuf::from("/srv/backups/db"));
        assert_eq!(config.database.name, "hr");
        assert_eq!(config.database.host, "localhost");
        assert_eq!(config.database.dump_candidates, vec!["/opt/mysql/bin/mysqldump"]);
        assert_eq!(config.git.remote, "backup");
        assert_eq!(config.git.branch, "main");
        assert_eq!(config.git.author_name.as_deref(), Some("Backup Bot"));
    }

    #[test]
    fn test_password_is_not_serialized() {
        let mut config = Config::default();
        config.database.password = "secret".into();
        let text = toml::to_string(&config).unwrap();
        assert!(!text.contains("secret"));
    }
}
