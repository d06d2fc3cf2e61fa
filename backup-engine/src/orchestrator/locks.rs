//! In-process exclusivity locks.
//!
//! At most one operation per kind is in flight, and at most one operation
//! touching the git working tree system-wide. A request for a busy scope is
//! rejected immediately instead of queueing. A record can also be claimed by
//! only one runner at a time.

use crate::models::backup_record::BackupKind;
use crate::utils::errors::{BackupError, Result};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockScope {
    Kind(BackupKind),
    Git,
}

impl LockScope {
    /// Every scope an operation of `kind` must hold.
    pub fn for_kind(kind: BackupKind) -> Vec<LockScope> {
        let mut scopes = vec![LockScope::Kind(kind)];
        // A full backup writes into the db/ and code/ trees as well.
        if kind == BackupKind::Full {
            scopes.extend([LockScope::Kind(BackupKind::Db), LockScope::Kind(BackupKind::Code)]);
        }
        if kind.touches_git() {
            scopes.push(LockScope::Git);
        }
        scopes
    }

    fn label(&self) -> &'static str {
        match self {
            LockScope::Kind(kind) => kind.as_str(),
            LockScope::Git => "git",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExclusivityLocks {
    held: Arc<Mutex<HashSet<LockScope>>>,
    claimed: Arc<Mutex<HashSet<String>>>,
}

impl ExclusivityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> MutexGuard<'_, HashSet<LockScope>> {
        // The set stays consistent even if a holder panicked.
        lock_set(&self.held)
    }

    /// Acquires every scope for `kind`, or none of them.
    pub fn try_acquire(&self, kind: BackupKind) -> Result<LockGuard> {
        let scopes = LockScope::for_kind(kind);
        let mut held = self.held();

        if let Some(busy) = scopes.iter().find(|s| held.contains(s)) {
            debug!(kind = %kind, scope = busy.label(), "Exclusivity lock busy");
            return Err(BackupError::Busy(busy.label().to_string()));
        }

        held.extend(scopes.iter().copied());
        debug!(kind = %kind, "Exclusivity locks acquired");
        Ok(LockGuard {
            held: Arc::clone(&self.held),
            scopes,
        })
    }

    /// Claims record `id` for the caller. A record already claimed by
    /// another runner reports `InFlight`.
    pub fn claim(&self, id: &str) -> Result<RecordClaim> {
        let mut claimed = lock_set(&self.claimed);
        if !claimed.insert(id.to_string()) {
            debug!(id, "Record already claimed");
            return Err(BackupError::InFlight(id.to_string()));
        }
        Ok(RecordClaim {
            claimed: Arc::clone(&self.claimed),
            id: id.to_string(),
        })
    }
}

fn lock_set<T>(set: &Mutex<HashSet<T>>) -> MutexGuard<'_, HashSet<T>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Releases its record when dropped.
#[derive(Debug)]
pub struct RecordClaim {
    claimed: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl Drop for RecordClaim {
    fn drop(&mut self) {
        lock_set(&self.claimed).remove(&self.id);
    }
}

/// Releases its scopes when dropped.
#[derive(Debug)]
pub struct LockGuard {
    held: Arc<Mutex<HashSet<LockScope>>>,
    scopes: Vec<LockScope>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let mut held = lock_set(&self.held);
        for scope in &self.scopes {
            held.remove(scope);
        }
    }
}
