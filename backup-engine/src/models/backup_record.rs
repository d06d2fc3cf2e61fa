use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ── BackupKind ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    Db,
    Code,
    Full,
    #[serde(rename = "github")]
    GitHub,
}

impl BackupKind {
    pub const ALL: [BackupKind; 4] = [
        BackupKind::Db,
        BackupKind::Code,
        BackupKind::Full,
        BackupKind::GitHub,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackupKind::Db => "db",
            BackupKind::Code => "code",
            BackupKind::Full => "full",
            BackupKind::GitHub => "github",
        }
    }

    /// Whether a completed record of this kind carries an artifact
    pub fn produces_artifact(&self) -> bool {
        !matches!(self, BackupKind::GitHub)
    }

    /// Whether the operation touches the git working tree
    pub fn touches_git(&self) -> bool {
        !matches!(self, BackupKind::Db)
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "db" => Ok(BackupKind::Db),
            "code" => Ok(BackupKind::Code),
            "full" => Ok(BackupKind::Full),
            "github" => Ok(BackupKind::GitHub),
            other => Err(format!("unknown backup kind: {other}")),
        }
    }
}

// ── BackupStatus ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl BackupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStatus::Pending => "pending",
            BackupStatus::Processing => "processing",
            BackupStatus::Completed => "completed",
            BackupStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BackupStatus::Completed | BackupStatus::Failed)
    }
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BackupStatus::Pending),
            "processing" => Ok(BackupStatus::Processing),
            "completed" => Ok(BackupStatus::Completed),
            "failed" => Ok(BackupStatus::Failed),
            other => Err(format!("unknown backup status: {other}")),
        }
    }
}

macro_rules! sql_text_enum {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

sql_text_enum!(BackupKind);
sql_text_enum!(BackupStatus);

// ── BackupRecord ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: String,
    pub kind: BackupKind,
    pub created_at: String,
    pub initiator_id: Option<String>,
    pub artifact_path: String,
    pub size_bytes: i64,
    pub status: BackupStatus,
    pub error_detail: String,
    pub commit_hash: String,
    /// Tolerated failure of a best-effort sub-step (e.g. git push)
    pub advisory: String,
}

impl BackupRecord {
    pub fn has_artifact(&self) -> bool {
        !self.artifact_path.is_empty()
    }

    pub fn size_mb(&self) -> f64 {
        (self.size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
    }
}

/// Values written when an operation completes
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub artifact_path: String,
    pub size_bytes: i64,
    pub commit_hash: String,
    pub advisory: String,
}

fn row_to_record(row: &Row) -> rusqlite::Result<BackupRecord> {
    Ok(BackupRecord {
        id: row.get("id")?,
        kind: row.get("kind")?,
        created_at: row.get("created_at")?,
        initiator_id: row.get("initiator_id")?,
        artifact_path: row.get("artifact_path")?,
        size_bytes: row.get("size_bytes")?,
        status: row.get("status")?,
        error_detail: row.get("error_detail")?,
        commit_hash: row.get("commit_hash")?,
        advisory: row.get("advisory")?,
    })
}

pub fn find_by_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<BackupRecord>> {
    conn.query_row("SELECT * FROM backups WHERE id = ?", params![id], row_to_record)
        .optional()
}

/// Most recent first
pub fn find_recent(conn: &Connection, limit: i64) -> rusqlite::Result<Vec<BackupRecord>> {
    let mut stmt =
        conn.prepare("SELECT * FROM backups ORDER BY created_at DESC, rowid DESC LIMIT ?")?;
    let rows = stmt.query_map(params![limit], row_to_record)?;
    rows.collect()
}

pub fn create(
    conn: &Connection,
    kind: BackupKind,
    initiator_id: Option<&str>,
) -> rusqlite::Result<BackupRecord> {
    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true);
    conn.execute(
        "INSERT INTO backups (id, kind, created_at, initiator_id, status) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, kind, now, initiator_id, BackupStatus::Pending],
    )?;
    find_by_id(conn, &id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

/// `pending → processing`. Returns false when the record is missing or not pending.
pub fn transition_to_processing(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    let changes = conn.execute(
        "UPDATE backups SET status = ?1 WHERE id = ?2 AND status = ?3",
        params![BackupStatus::Processing, id, BackupStatus::Pending],
    )?;
    Ok(changes > 0)
}

/// `processing → completed`. Returns false when the record is not processing.
pub fn complete(conn: &Connection, id: &str, done: &Completion) -> rusqlite::Result<bool> {
    let changes = conn.execute(
        "UPDATE backups
         SET status = ?1, artifact_path = ?2, size_bytes = ?3, commit_hash = ?4, advisory = ?5, error_detail = ''
         WHERE id = ?6 AND status = ?7",
        params![
            BackupStatus::Completed,
            done.artifact_path,
            done.size_bytes,
            done.commit_hash,
            done.advisory,
            id,
            BackupStatus::Processing,
        ],
    )?;
    Ok(changes > 0)
}

/// `pending|processing → failed`. A failed record never reports an artifact.
pub fn fail(
    conn: &Connection,
    id: &str,
    error_detail: &str,
    commit_hash: &str,
) -> rusqlite::Result<bool> {
    let changes = conn.execute(
        "UPDATE backups
         SET status = ?1, error_detail = ?2, commit_hash = ?3, artifact_path = '', size_bytes = 0
         WHERE id = ?4 AND status IN (?5, ?6)",
        params![
            BackupStatus::Failed,
            error_detail,
            commit_hash,
            id,
            BackupStatus::Pending,
            BackupStatus::Processing,
        ],
    )?;
    Ok(changes > 0)
}

/// `pending → failed`. Leaves a record that another caller already moved
/// to `processing` untouched.
pub fn fail_pending(conn: &Connection, id: &str, error_detail: &str) -> rusqlite::Result<bool> {
    let changes = conn.execute(
        "UPDATE backups SET status = ?1, error_detail = ?2 WHERE id = ?3 AND status = ?4",
        params![BackupStatus::Failed, error_detail, id, BackupStatus::Pending],
    )?;
    Ok(changes > 0)
}

pub fn delete(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    let changes = conn.execute("DELETE FROM backups WHERE id = ?", params![id])?;
    Ok(changes > 0)
}

/// Detaches records from a deleted actor; the records themselves survive.
pub fn clear_initiator(conn: &Connection, initiator_id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE backups SET initiator_id = NULL WHERE initiator_id = ?",
        params![initiator_id],
    )
}
