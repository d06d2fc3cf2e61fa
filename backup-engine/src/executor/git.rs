//! Git synchronization of the project root.
//!
//! Sequence: status, then stage and commit only when the tree is dirty, then
//! push (always, since a clean tree can still hold unpushed commits), then
//! resolve `HEAD`. A failed push never undoes the local commit; it is
//! reported next to the commit as its own outcome. Excluded paths (the
//! backup output tree) are left out of both status and staging.

use crate::config::GitConfig;
use crate::process::{check_success, diagnostic, output_with_timeout};
use crate::utils::errors::Result;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The remote accepted new commits
    Pushed,
    /// The remote already had everything
    UpToDate,
    /// The push failed; the diagnostic is git's stderr
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSyncReport {
    /// Whether this run created a commit
    pub committed: bool,
    /// `HEAD` after the run
    pub commit_hash: String,
    pub push: PushOutcome,
}

impl GitSyncReport {
    /// Nothing to commit and nothing to push
    pub fn is_noop(&self) -> bool {
        !self.committed && self.push == PushOutcome::UpToDate
    }

    pub fn short_hash(&self) -> &str {
        let end = self.commit_hash.len().min(7);
        &self.commit_hash[..end]
    }

    pub fn summary(&self) -> String {
        let local = if self.committed {
            format!("committed {}", self.short_hash())
        } else {
            format!("no local changes (HEAD {})", self.short_hash())
        };
        let remote = match &self.push {
            PushOutcome::Pushed => "pushed".to_string(),
            PushOutcome::UpToDate => "remote already up to date".to_string(),
            PushOutcome::Failed(msg) => format!("push failed: {msg}"),
        };
        format!("{local}; {remote}")
    }
}

#[derive(Debug, Clone)]
pub struct GitSyncClient {
    program: String,
    root: PathBuf,
    remote: String,
    branch: String,
    author_name: Option<String>,
    author_email: Option<String>,
    timeout: Duration,
    exclude: Vec<String>,
}

impl GitSyncClient {
    pub fn new(config: &GitConfig, root: &Path) -> Self {
        Self {
            program: config.program.clone(),
            root: root.to_path_buf(),
            remote: config.remote.clone(),
            branch: config.branch.clone(),
            author_name: config.author_name.clone(),
            author_email: config.author_email.clone(),
            timeout: config.timeout(),
            exclude: Vec::new(),
        }
    }

    /// Keeps `path` out of status and staging. Paths outside the root are
    /// ignored.
    pub fn exclude_path(mut self, path: &Path) -> Self {
        let root = std::fs::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone());
        let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        match path.strip_prefix(&root) {
            Ok(relative) if !relative.as_os_str().is_empty() => {
                self.exclude.push(format!(":(exclude){}", relative.display()));
            }
            _ => {}
        }
        self
    }

    /// `args` followed by the pathspec: the whole tree minus excluded paths
    fn with_pathspec<'a>(&'a self, args: &[&'a str]) -> Vec<&'a str> {
        let mut full = args.to_vec();
        full.extend(["--", "."]);
        full.extend(self.exclude.iter().map(String::as_str));
        full
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.current_dir(&self.root)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C");
        if let Some(name) = &self.author_name {
            cmd.arg("-c").arg(format!("user.name={name}"));
        }
        if let Some(email) = &self.author_email {
            cmd.arg("-c").arg(format!("user.email={email}"));
        }
        cmd.args(args);
        cmd
    }

    async fn run(&self, args: &[&str]) -> Result<Output> {
        let label = format!("git {}", args.first().copied().unwrap_or_default());
        output_with_timeout(self.command(args), &label, self.timeout).await
    }

    async fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let label = format!("git {}", args.first().copied().unwrap_or_default());
        let output = self.run(args).await?;
        check_success(&label, &output)?;
        Ok(output)
    }

    /// Porcelain status; empty when the working tree is clean
    pub async fn status(&self) -> Result<String> {
        let output = self.run_checked(&self.with_pathspec(&["status", "--porcelain"])).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub async fn stage_all(&self) -> Result<()> {
        self.run_checked(&self.with_pathspec(&["add", "-A"])).await.map(|_| ())
    }

    pub async fn commit(&self, message: &str) -> Result<()> {
        self.run_checked(&["commit", "-m", message]).await.map(|_| ())
    }

    pub async fn head(&self) -> Result<String> {
        let output = self.run_checked(&["rev-parse", "HEAD"]).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Pushes the configured branch. Never errors: every failure, including
    /// a timeout, becomes `PushOutcome::Failed`.
    pub async fn push(&self) -> PushOutcome {
        match self.run(&["push", &self.remote, &self.branch]).await {
            Ok(output) => classify_push(output.status.success(), &diagnostic(&output)),
            Err(e) => PushOutcome::Failed(e.to_string()),
        }
    }

    /// Runs the full status/commit/push/rev-parse sequence.
    pub async fn sync(&self) -> Result<GitSyncReport> {
        info!(root = %self.root.display(), "Checking working tree");
        let status = self.status().await?;

        let committed = if status.is_empty() {
            info!("Working tree clean, skipping commit");
            false
        } else {
            let changed = status.lines().count();
            info!(changed, "Working tree dirty, committing");
            self.stage_all().await?;
            self.commit(&commit_message(chrono::Local::now())).await?;
            true
        };

        info!(remote = %self.remote, branch = %self.branch, "Pushing");
        let push = self.push().await;
        if let PushOutcome::Failed(msg) = &push {
            warn!(remote = %self.remote, branch = %self.branch, "Push failed: {}", msg);
        }

        let commit_hash = self.head().await?;
        let report = GitSyncReport {
            committed,
            commit_hash,
            push,
        };
        if report.is_noop() {
            info!(head = %report.short_hash(), "Repository already in sync");
        } else {
            info!(summary = %report.summary(), "Git sync finished");
        }
        Ok(report)
    }
}

pub fn commit_message(now: chrono::DateTime<chrono::Local>) -> String {
    format!("Automatic backup - {}", now.format("%Y-%m-%d %H:%M"))
}

/// A push whose diagnostic says the remote is already current is a no-op
/// success, whatever the exit code.
pub fn classify_push(success: bool, diagnostic: &str) -> PushOutcome {
    let text = diagnostic.to_lowercase();
    let up_to_date = (text.contains("up-to-date") || text.contains("up to date"))
        && !text.contains("rejected");

    if up_to_date {
        PushOutcome::UpToDate
    } else if success {
        PushOutcome::Pushed
    } else {
        PushOutcome::Failed(diagnostic.to_string())
    }
}
