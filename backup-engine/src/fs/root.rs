//! Project root discovery.
//!
//! Walks upward from the application directory looking for a repository
//! marker such as `.git`, then for a manifest such as `manage.py`. The
//! located root scopes both the source archive and every git invocation.

use crate::config::RootConfig;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ProjectRootLocator {
    max_depth: usize,
    vcs_markers: Vec<String>,
    markers: Vec<String>,
}

impl ProjectRootLocator {
    pub fn new(config: &RootConfig) -> Self {
        Self {
            max_depth: config.max_depth.max(1),
            vcs_markers: config.vcs_markers.clone(),
            markers: config.markers.clone(),
        }
    }

    /// Returns the nearest ancestor (starting with `app_dir` itself) holding
    /// a version-control marker. Without one inside the depth bound, the
    /// nearest ancestor holding a manifest marker is used, and failing that
    /// the last directory inspected.
    pub fn locate(&self, app_dir: &Path) -> PathBuf {
        let start = absolute(app_dir);
        let inspected: Vec<&Path> = start.ancestors().take(self.max_depth).collect();

        for markers in [&self.vcs_markers, &self.markers] {
            for (level, dir) in inspected.iter().enumerate() {
                if let Some(marker) = marker_in(markers, dir) {
                    debug!(root = %dir.display(), marker, level, "Project root located");
                    return dir.to_path_buf();
                }
            }
        }

        let last = inspected.last().copied().unwrap_or(start.as_path()).to_path_buf();
        debug!(root = %last.display(), "No root marker found, using last inspected directory");
        last
    }
}

fn marker_in<'a>(markers: &'a [String], dir: &Path) -> Option<&'a str> {
    markers
        .iter()
        .find(|m| dir.join(m.as_str()).exists())
        .map(String::as_str)
}

fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    })
}
