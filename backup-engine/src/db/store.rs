//! Async access to backup records.
//!
//! SQLite calls are blocking, so each one runs on the blocking pool with a
//! connection checked out from the r2d2 pool.

use crate::db::connection::DbPool;
use crate::models::backup_record::{self, BackupKind, BackupRecord, Completion};
use crate::utils::errors::{BackupError, Result};
use rusqlite::Connection;

#[derive(Clone)]
pub struct RecordStore {
    db: DbPool,
}

impl RecordStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> Result<T> {
            let conn = db.get()?;
            Ok(f(&*conn)?)
        })
        .await?
    }

    pub async fn create(&self, kind: BackupKind, initiator: Option<String>) -> Result<BackupRecord> {
        self.with_conn(move |conn| backup_record::create(conn, kind, initiator.as_deref()))
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<BackupRecord>> {
        let id = id.to_string();
        self.with_conn(move |conn| backup_record::find_by_id(conn, &id)).await
    }

    /// Like `get`, but a missing record is an error
    pub async fn require(&self, id: &str) -> Result<BackupRecord> {
        self.get(id)
            .await?
            .ok_or_else(|| BackupError::NotFound(id.to_string()))
    }

    pub async fn list(&self, limit: i64) -> Result<Vec<BackupRecord>> {
        self.with_conn(move |conn| backup_record::find_recent(conn, limit.max(0)))
            .await
    }

    pub async fn mark_processing(&self, id: &str) -> Result<()> {
        let owned = id.to_string();
        let moved = self
            .with_conn(move |conn| backup_record::transition_to_processing(conn, &owned))
            .await?;
        if moved {
            Ok(())
        } else {
            Err(self.not_runnable(id).await)
        }
    }

    pub async fn complete(&self, id: &str, done: Completion) -> Result<()> {
        let owned = id.to_string();
        let moved = self
            .with_conn(move |conn| backup_record::complete(conn, &owned, &done))
            .await?;
        if moved {
            Ok(())
        } else {
            Err(self.not_runnable(id).await)
        }
    }

    pub async fn fail(&self, id: &str, error_detail: &str, commit_hash: &str) -> Result<()> {
        let owned = id.to_string();
        let detail = error_detail.to_string();
        let hash = commit_hash.to_string();
        let moved = self
            .with_conn(move |conn| backup_record::fail(conn, &owned, &detail, &hash))
            .await?;
        if moved {
            Ok(())
        } else {
            Err(self.not_runnable(id).await)
        }
    }

    /// Fails the record only while it is still `pending`. Returns whether it
    /// did.
    pub async fn fail_pending(&self, id: &str, error_detail: &str) -> Result<bool> {
        let id = id.to_string();
        let detail = error_detail.to_string();
        self.with_conn(move |conn| backup_record::fail_pending(conn, &id, &detail))
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.with_conn(move |conn| backup_record::delete(conn, &id)).await
    }

    pub async fn clear_initiator(&self, initiator_id: &str) -> Result<usize> {
        let initiator_id = initiator_id.to_string();
        self.with_conn(move |conn| backup_record::clear_initiator(conn, &initiator_id))
            .await
    }

    async fn not_runnable(&self, id: &str) -> BackupError {
        match self.get(id).await {
            Ok(Some(record)) => BackupError::NotRunnable {
                id: id.to_string(),
                status: record.status.to_string(),
            },
            Ok(None) => BackupError::NotFound(id.to_string()),
            Err(e) => e,
        }
    }
}
