mod config;
mod error;
mod routes;
mod state;

use crate::config::AppConfig;
use crate::state::AppState;
use anyhow::Context;
use backup_engine::db::{create_pool, migrate};
use backup_engine::utils::logger;
use backup_engine::{BackupKind, BackupOrchestrator};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the engine configuration file (overrides BACKUP_CONFIG)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API (default)
    Serve {
        /// Port to listen on (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one backup in the foreground and print its record
    Backup {
        /// db, code, full or github
        #[arg(value_parser = parse_kind)]
        kind: BackupKind,
    },
    /// Print the most recent backup records
    List {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Restore the database from a .sql dump
    Restore {
        file: PathBuf,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

fn parse_kind(s: &str) -> Result<BackupKind, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut app_config = AppConfig::from_env();
    if let Some(path) = args.config {
        app_config.config_path = Some(path);
    }
    if let Some(level) = args.log_level {
        app_config.log_level = Some(level);
    }

    let engine_config = app_config.engine_config()?;
    logger::init(&app_config.effective_log_level(&engine_config))?;

    let records_db = app_config.records_db_path(&engine_config);
    let pool = create_pool(&records_db)
        .with_context(|| format!("Failed to open record store {}", records_db.display()))?;
    migrate::migrate(&pool)?;

    let command = args.command.unwrap_or(Command::Serve { port: None });
    if matches!(command, Command::Serve { .. }) {
        // Records left in flight by a previous server process can never finish.
        migrate::recover_interrupted(&pool)?;
    }

    let orchestrator = BackupOrchestrator::new(engine_config, pool);

    match command {
        Command::Serve { port } => {
            if let Some(port) = port {
                app_config.port = port;
            }
            serve(orchestrator, app_config).await
        }
        Command::Backup { kind } => {
            let record = orchestrator.backup(kind, None).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            if record.status == backup_engine::BackupStatus::Failed {
                anyhow::bail!("Backup {} failed: {}", record.id, record.error_detail);
            }
            Ok(())
        }
        Command::List { limit } => {
            let records = orchestrator.list(limit).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
            Ok(())
        }
        Command::Restore { file, force } => {
            if !file.is_file() {
                anyhow::bail!("Dump file not found: {}", file.display());
            }
            if !force && !confirm(&file)? {
                println!("Restore cancelled");
                return Ok(());
            }
            orchestrator.restore_from(&file).await?;
            println!("Database restored from {}", file.display());
            Ok(())
        }
    }
}

async fn serve(orchestrator: BackupOrchestrator, config: AppConfig) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(
        "Starting backup-server v{} on port {}",
        env!("CARGO_PKG_VERSION"),
        config.port
    );

    let state = Arc::new(AppState::new(orchestrator));
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Asks the operator to type `yes` before a destructive restore.
fn confirm(file: &std::path::Path) -> anyhow::Result<bool> {
    print!(
        "This overwrites the current database with {}. Type 'yes' to continue: ",
        file.display()
    );
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to listen for ctrl+c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_subcommands() {
        let args = Args::try_parse_from(["backup-server", "backup", "github"]).unwrap();
        assert!(matches!(
            args.command,
            Some(Command::Backup { kind: BackupKind::GitHub })
        ));

        let args = Args::try_parse_from(["backup-server", "--log-level", "debug", "list", "--limit", "5"])
            .unwrap();
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(matches!(args.command, Some(Command::List { limit: 5 })));

        let args = Args::try_parse_from(["backup-server"]).unwrap();
        assert!(args.command.is_none());
    }

    #[test]
    fn test_cli_rejects_unknown_kind() {
        assert!(Args::try_parse_from(["backup-server", "backup", "weekly"]).is_err());
    }

    #[test]
    fn test_restore_flags() {
        let args = Args::try_parse_from(["backup-server", "restore", "dump.sql", "--force"]).unwrap();
        match args.command {
            Some(Command::Restore { file, force }) => {
                assert_eq!(file, PathBuf::from("dump.sql"));
                assert!(force);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
