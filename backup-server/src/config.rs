use backup_engine::Config;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// TOML file with the engine configuration; defaults apply when unset
    pub config_path: Option<PathBuf>,
    /// SQLite file of the record store; defaults to `<backup_root>/backups.db`
    pub records_db: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            config_path: std::env::var("BACKUP_CONFIG").ok().map(PathBuf::from),
            records_db: std::env::var("RECORDS_DB").ok().map(PathBuf::from),
            log_level: std::env::var("LOG_LEVEL").ok(),
        }
    }

    /// Loads the engine configuration this process runs with.
    pub fn engine_config(&self) -> anyhow::Result<Config> {
        match &self.config_path {
            Some(path) => Config::from_file(path)
                .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", path.display(), e)),
            None => Ok(Config::from_env()),
        }
    }

    pub fn records_db_path(&self, engine: &Config) -> PathBuf {
        self.records_db
            .clone()
            .unwrap_or_else(|| engine.paths.backup_root.join("backups.db"))
    }

    pub fn effective_log_level(&self, engine: &Config) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| engine.log.level.clone())
    }
}
