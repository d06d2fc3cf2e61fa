//! Backup orchestration.
//!
//! Owns the record lifecycle: a record is created `pending`, moves to
//! `processing` before any external process starts, and ends `completed` or
//! `failed`. Every step failure is turned into a failed record with the
//! step's diagnostic; only lookup, exclusivity and store problems reach the
//! caller as errors.

pub mod locks;
pub mod outcome;

pub use locks::{ExclusivityLocks, LockGuard, LockScope, RecordClaim};
pub use outcome::StepOutcome;

use crate::config::Config;
use crate::db::{DbPool, RecordStore};
use crate::executor::{
    Artifact, BundleComposer, CodeArchiveBuilder, DatabaseDumpExecutor, DatabaseRestoreExecutor,
    GitSyncClient, GitSyncReport, PushOutcome,
};
use crate::fs::ProjectRootLocator;
use crate::models::backup_record::{BackupKind, BackupRecord, BackupStatus, Completion};
use crate::process::ToolResolver;
use crate::utils::errors::{BackupError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

const DUMP_TOOL: &str = "mysqldump";
const RESTORE_TOOL: &str = "mysql";

/// An artifact opened for download
#[derive(Debug)]
pub struct ArtifactDownload {
    pub record: BackupRecord,
    pub file_name: String,
    pub size_bytes: u64,
    pub file: tokio::fs::File,
}

/// Terminal failure of an operation, as persisted on its record
#[derive(Debug)]
struct Failure {
    detail: String,
    commit_hash: String,
}

impl From<BackupError> for Failure {
    fn from(error: BackupError) -> Self {
        Self {
            detail: error.to_string(),
            commit_hash: String::new(),
        }
    }
}

impl Failure {
    /// Names sub-step artifacts left on disk by an aborted `full` backup.
    fn with_orphans(error: BackupError, orphans: &[&Artifact]) -> Self {
        let paths: Vec<String> = orphans.iter().map(|a| a.path.display().to_string()).collect();
        warn!(orphans = ?paths, "Keeping sub-step artifacts of failed full backup");
        Self {
            detail: format!(
                "{error}; partial artifacts kept for manual recovery: {}",
                paths.join(", ")
            ),
            commit_hash: String::new(),
        }
    }
}

#[derive(Clone)]
pub struct BackupOrchestrator {
    config: Arc<Config>,
    project_root: PathBuf,
    store: RecordStore,
    locks: ExclusivityLocks,
}

impl BackupOrchestrator {
    pub fn new(config: Config, db: DbPool) -> Self {
        let project_root = ProjectRootLocator::new(&config.root).locate(&config.paths.app_dir);
        info!(
            app_dir = %config.paths.app_dir.display(),
            project_root = %project_root.display(),
            backup_root = %config.paths.backup_root.display(),
            "Backup orchestrator ready"
        );

        Self {
            config: Arc::new(config),
            project_root,
            store: RecordStore::new(db),
            locks: ExclusivityLocks::new(),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    // ── Record lifecycle ──

    pub async fn create(&self, kind: BackupKind, initiator: Option<String>) -> Result<BackupRecord> {
        let record = self.store.create(kind, initiator).await?;
        info!(id = %record.id, kind = %kind, "Backup record created");
        Ok(record)
    }

    /// Runs a `pending` record to completion and returns it in its terminal
    /// state. A busy scope fails the record and returns `Busy`; a record
    /// another caller is already running reports `InFlight` and is left alone.
    pub async fn run(&self, id: &str) -> Result<BackupRecord> {
        let record = self.store.require(id).await?;
        if record.status != BackupStatus::Pending {
            return Err(BackupError::NotRunnable {
                id: id.to_string(),
                status: record.status.to_string(),
            });
        }

        let _claim = self.locks.claim(id)?;
        let _guard = match self.locks.try_acquire(record.kind) {
            Ok(guard) => guard,
            Err(e) => {
                warn!(id, kind = %record.kind, "Rejecting backup: {}", e);
                if !self.store.fail_pending(id, &e.to_string()).await? {
                    debug!(id, "Record no longer pending, left as is");
                }
                return Err(e);
            }
        };

        if let Err(e) = self.store.mark_processing(id).await {
            self.abandon(id, &e).await;
            return Err(e);
        }
        self.finish(record.kind, id).await?;
        self.store.require(id).await
    }

    /// Creates and runs a record in the foreground.
    pub async fn backup(&self, kind: BackupKind, initiator: Option<String>) -> Result<BackupRecord> {
        let record = self.create(kind, initiator).await?;
        self.run(&record.id).await
    }

    /// Starts an operation on a background task and returns its record in
    /// `processing`. A busy scope is rejected before any record exists.
    pub async fn start(&self, kind: BackupKind, initiator: Option<String>) -> Result<BackupRecord> {
        let guard = self.locks.try_acquire(kind)?;

        let record = self.create(kind, initiator).await?;
        let claim = self.locks.claim(&record.id)?;
        if let Err(e) = self.store.mark_processing(&record.id).await {
            self.abandon(&record.id, &e).await;
            return Err(e);
        }

        let orchestrator = self.clone();
        let id = record.id.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let _claim = claim;
            if let Err(e) = orchestrator.finish(kind, &id).await {
                error!(id = %id, kind = %kind, "Failed to finalize backup record: {}", e);
            }
        });

        self.store.require(&record.id).await
    }

    /// Performs the operation for a `processing` record and persists the
    /// terminal state.
    async fn finish(&self, kind: BackupKind, id: &str) -> Result<()> {
        let started = Instant::now();
        info!(id, kind = %kind, "Backup started");

        let persisted = match self.perform(kind).await {
            Ok(done) => {
                if !done.advisory.is_empty() {
                    warn!(id, kind = %kind, "Backup completed with advisory: {}", done.advisory);
                }
                info!(
                    id,
                    kind = %kind,
                    artifact = %done.artifact_path,
                    size_bytes = done.size_bytes,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Backup completed"
                );
                self.store.complete(id, done).await
            }
            Err(failure) => {
                error!(
                    id,
                    kind = %kind,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Backup failed: {}",
                    failure.detail
                );
                self.store.fail(id, &failure.detail, &failure.commit_hash).await
            }
        };

        if let Err(e) = &persisted {
            self.abandon(id, e).await;
        }
        persisted
    }

    /// Last attempt to fail a record whose transition could not be stored,
    /// so it does not stay in flight.
    async fn abandon(&self, id: &str, cause: &BackupError) {
        // The record already left the expected state on its own.
        if matches!(cause, BackupError::NotRunnable { .. } | BackupError::NotFound(_)) {
            return;
        }
        let detail = format!("Interrupted: could not record outcome: {cause}");
        match self.store.fail(id, &detail, "").await {
            Ok(()) => warn!(id, "Record failed after store error: {}", cause),
            Err(e) => error!(id, "Record left in flight: {}", e),
        }
    }

    async fn perform(&self, kind: BackupKind) -> std::result::Result<Completion, Failure> {
        match kind {
            BackupKind::Db => {
                let dump = self.dump_database().await?;
                Ok(artifact_completion(&dump)?)
            }
            BackupKind::Code => {
                let (archive, git) = self.archive_code().await?;
                let mut done = artifact_completion(&archive)?;
                apply_git(&mut done, git);
                Ok(done)
            }
            BackupKind::Full => {
                let dump = self.dump_database().await?;
                let (archive, git) = self
                    .archive_code()
                    .await
                    .map_err(|e| Failure::with_orphans(e, &[&dump]))?;

                let inputs = [dump.path.clone(), archive.path.clone()];
                let bundle = BundleComposer::new()
                    .compose(&inputs, &self.config.paths.full_dir())
                    .await
                    .map_err(|e| Failure::with_orphans(e, &[&dump, &archive]))?;

                let mut done = artifact_completion(&bundle)?;
                apply_git(&mut done, git);
                Ok(done)
            }
            // Synchronization is the whole operation here, so git failures are fatal.
            BackupKind::GitHub => match self.sync_git().await {
                StepOutcome::Ok(report) => Ok(Completion {
                    commit_hash: report.commit_hash,
                    ..Completion::default()
                }),
                StepOutcome::Advisory(report, advisory) => Ok(Completion {
                    commit_hash: report.map(|r| r.commit_hash).unwrap_or_default(),
                    advisory,
                    ..Completion::default()
                }),
                StepOutcome::Fatal(error, report) => Err(Failure {
                    detail: error.to_string(),
                    commit_hash: report.map(|r| r.commit_hash).unwrap_or_default(),
                }),
            },
        }
    }

    // ── Steps ──

    fn resolver(&self) -> ToolResolver {
        ToolResolver::new(self.config.database.probe_timeout())
    }

    async fn dump_database(&self) -> Result<Artifact> {
        let db = &self.config.database;
        let tool = self.resolver().resolve(DUMP_TOOL, &db.dump_candidates).await?;
        DatabaseDumpExecutor::new(tool, db, self.config.paths.db_dir())
            .execute()
            .await
    }

    /// Archives the project tree, then syncs git on a best-effort basis.
    async fn archive_code(&self) -> Result<(Artifact, StepOutcome<GitSyncReport>)> {
        let summary = CodeArchiveBuilder::new(&self.config.archive)
            .skip_dir(&self.config.paths.backup_root)
            .build(&self.project_root, &self.config.paths.code_dir())
            .await?;
        debug!(
            path = %summary.artifact.path.display(),
            file_count = summary.file_count,
            "Project tree archived"
        );
        let git = self.sync_git().await.tolerate();
        Ok((summary.artifact, git))
    }

    async fn sync_git(&self) -> StepOutcome<GitSyncReport> {
        let client = GitSyncClient::new(&self.config.git, &self.project_root)
            .exclude_path(&self.config.paths.backup_root);
        match client.sync().await {
            Ok(report) => match &report.push {
                PushOutcome::Failed(message) => {
                    StepOutcome::Fatal(BackupError::GitPush(message.clone()), Some(report))
                }
                PushOutcome::Pushed | PushOutcome::UpToDate => StepOutcome::Ok(report),
            },
            Err(e) => StepOutcome::Fatal(e, None),
        }
    }

    // ── Queries ──

    pub async fn get(&self, id: &str) -> Result<BackupRecord> {
        self.store.require(id).await
    }

    /// Most recent first
    pub async fn list(&self, limit: i64) -> Result<Vec<BackupRecord>> {
        self.store.list(limit).await
    }

    /// Opens the artifact of a completed record. A record whose file is gone
    /// reports `NotFound`.
    pub async fn fetch_artifact(&self, id: &str) -> Result<ArtifactDownload> {
        let record = self.store.require(id).await?;
        let downloadable = record.status == BackupStatus::Completed
            && record.kind.produces_artifact()
            && record.has_artifact();
        if !downloadable {
            return Err(BackupError::NotFound(id.to_string()));
        }

        let path = PathBuf::from(&record.artifact_path);
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(id, path = %path.display(), "Artifact missing on disk");
                return Err(BackupError::NotFound(id.to_string()));
            }
            Err(e) => return Err(BackupError::fs(format!("opening {}", path.display()), e)),
        };
        let metadata = file
            .metadata()
            .await
            .map_err(|e| BackupError::fs(format!("reading size of {}", path.display()), e))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Ok(ArtifactDownload {
            record,
            file_name,
            size_bytes: metadata.len(),
            file,
        })
    }

    /// Removes the artifact file (if still present), then the record.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let record = self.store.require(id).await?;
        if !record.status.is_terminal() {
            return Err(BackupError::InFlight(id.to_string()));
        }

        if record.has_artifact() {
            match tokio::fs::remove_file(&record.artifact_path).await {
                Ok(()) => info!(id, path = %record.artifact_path, "Artifact removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    info!(id, path = %record.artifact_path, "Artifact already gone")
                }
                Err(e) => {
                    return Err(BackupError::fs(format!("removing {}", record.artifact_path), e))
                }
            }
        }

        if self.store.delete(id).await? {
            info!(id, "Backup record deleted");
            Ok(())
        } else {
            Err(BackupError::NotFound(id.to_string()))
        }
    }

    /// Detaches records from a deleted actor.
    pub async fn clear_initiator(&self, initiator_id: &str) -> Result<usize> {
        self.store.clear_initiator(initiator_id).await
    }

    // ── Restore ──

    /// Loads a `.sql` dump into the configured database. Holds the `db`
    /// scope so a dump never runs concurrently.
    pub async fn restore_from(&self, dump: &Path) -> Result<()> {
        let _guard = self.locks.try_acquire(BackupKind::Db)?;
        let db = &self.config.database;
        let tool = self.resolver().resolve(RESTORE_TOOL, &db.restore_candidates).await?;
        DatabaseRestoreExecutor::new(tool, db).restore(dump).await
    }

    /// Restores the dump of a completed `db` record.
    pub async fn restore_record(&self, id: &str) -> Result<()> {
        let record = self.store.require(id).await?;
        let restorable = record.kind == BackupKind::Db
            && record.status == BackupStatus::Completed
            && Path::new(&record.artifact_path).is_file();
        if !restorable {
            return Err(BackupError::NotFound(format!("{id} (no restorable database dump)")));
        }
        self.restore_from(Path::new(&record.artifact_path)).await
    }
}

/// Completion for a finished artifact, re-checked against the disk.
fn artifact_completion(artifact: &Artifact) -> Result<Completion> {
    if !artifact.is_intact() {
        return Err(BackupError::fs(
            format!("confirming {}", artifact.path.display()),
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "artifact missing or changed size after it was written",
            ),
        ));
    }
    Ok(Completion {
        artifact_path: artifact.path.display().to_string(),
        size_bytes: artifact.size_bytes as i64,
        ..Completion::default()
    })
}

fn apply_git(done: &mut Completion, git: StepOutcome<GitSyncReport>) {
    let git = git.tolerate();
    if let Some(report) = git.value() {
        done.commit_hash = report.commit_hash.clone();
    }
    if let Some(advisory) = git.advisory() {
        done.advisory = advisory.to_string();
    }
}
