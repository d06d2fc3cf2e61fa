use crate::db::connection::DbPool;
use crate::utils::errors::Result;

pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS backups (
  id TEXT PRIMARY KEY,
  kind TEXT NOT NULL CHECK(kind IN ('db','code','full','github')),
  created_at TEXT NOT NULL,
  initiator_id TEXT,
  artifact_path TEXT NOT NULL DEFAULT '',
  size_bytes INTEGER NOT NULL DEFAULT 0 CHECK(size_bytes >= 0),
  status TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending','processing','completed','failed')),
  error_detail TEXT NOT NULL DEFAULT '',
  commit_hash TEXT NOT NULL DEFAULT '',
  advisory TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_backups_created_at ON backups(created_at DESC);
"#;

pub fn migrate(pool: &DbPool) -> Result<()> {
    tracing::info!("[DB] Starting record store migration...");

    let conn = pool.get()?;
    conn.execute_batch(SCHEMA)?;

    tracing::info!("[DB] Migration completed successfully");
    Ok(())
}

/// Fails records left `pending`/`processing` by a process that stopped
/// mid-operation. Only call this when no other process uses the store.
pub fn recover_interrupted(pool: &DbPool) -> Result<usize> {
    let conn = pool.get()?;
    let abandoned = conn.execute(
        "UPDATE backups
         SET status = 'failed', error_detail = 'Interrupted: the process stopped before the operation finished',
             artifact_path = '', size_bytes = 0
         WHERE status IN ('pending', 'processing')",
        [],
    )?;
    if abandoned > 0 {
        tracing::warn!(abandoned, "[DB] Marked interrupted backup records as failed");
    }
    Ok(abandoned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::create_pool;
    use crate::models::backup_record::{self, BackupKind, BackupStatus};
    use tempfile::TempDir;

    #[test]
    fn test_migrate_is_idempotent_and_recovery_fails_abandoned_records() {
        let temp = TempDir::new().unwrap();
        let pool = create_pool(&temp.path().join("records.db")).unwrap();
        migrate(&pool).unwrap();

        let id = {
            let conn = pool.get().unwrap();
            let record = backup_record::create(&conn, BackupKind::Db, None).unwrap();
            backup_record::transition_to_processing(&conn, &record.id).unwrap();
            record.id
        };

        migrate(&pool).unwrap();
        assert_eq!(recover_interrupted(&pool).unwrap(), 1);

        let conn = pool.get().unwrap();
        let record = backup_record::find_by_id(&conn, &id).unwrap().unwrap();
        assert_eq!(record.status, BackupStatus::Failed);
        assert!(record.error_detail.starts_with("Interrupted"));
    }
}
