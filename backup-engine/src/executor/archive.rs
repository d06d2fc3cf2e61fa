//! Source archive of the project tree.
//!
//! Produces a gzip-compressed tar (`code_<timestamp>.tar.gz`) whose entries
//! are stored relative to the project root, so it restores into any
//! directory. Excluded basenames are pruned during the walk and the archive
//! never contains itself, even when the output directory lies inside the
//! tree. An unreadable entry fails the whole archive.

use crate::config::ArchiveConfig;
use crate::executor::{discard_partial, Artifact};
use crate::fs::naming;
use crate::fs::walker::{walk_directory_with_callback, WalkOptions};
use crate::utils::errors::{BackupError, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    pub artifact: Artifact,
    pub file_count: usize,
}

#[derive(Debug, Clone)]
pub struct CodeArchiveBuilder {
    exclude: HashSet<String>,
    compression_level: u32,
    skip_dirs: Vec<PathBuf>,
}

impl CodeArchiveBuilder {
    pub fn new(config: &ArchiveConfig) -> Self {
        Self {
            exclude: config.exclude.iter().cloned().collect(),
            compression_level: config.compression_level.min(9),
            skip_dirs: Vec::new(),
        }
    }

    /// Leaves `dir` and its contents out of the archive, wherever it sits
    /// in the tree and whatever its name.
    pub fn skip_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.skip_dirs.push(dir.into());
        self
    }

    /// Builds the archive on the blocking pool.
    pub async fn build(&self, root: &Path, dest_dir: &Path) -> Result<ArchiveSummary> {
        let builder = self.clone();
        let root = root.to_path_buf();
        let dest_dir = dest_dir.to_path_buf();
        tokio::task::spawn_blocking(move || builder.build_blocking(&root, &dest_dir)).await?
    }

    pub fn build_blocking(&self, root: &Path, dest_dir: &Path) -> Result<ArchiveSummary> {
        let stem = naming::code_stem(chrono::Local::now());
        let (path, file) = naming::create_unique(dest_dir, &stem, ".tar.gz")
            .map_err(|e| BackupError::fs(format!("creating archive in {}", dest_dir.display()), e))?;

        info!(root = %root.display(), path = %path.display(), "Starting source archive");

        match self.write_archive(root, &path, file) {
            Ok(file_count) => {
                let artifact = Artifact::from_disk(path)?;
                info!(
                    path = %artifact.path.display(),
                    size_bytes = artifact.size_bytes,
                    file_count,
                    "Source archive completed"
                );
                Ok(ArchiveSummary { artifact, file_count })
            }
            Err(e) => {
                warn!(root = %root.display(), "Source archive failed: {}", e);
                discard_partial(&path);
                Err(BackupError::fs(format!("archiving {}", root.display()), e))
            }
        }
    }

    fn write_archive(&self, root: &Path, output: &Path, file: File) -> std::io::Result<usize> {
        let encoder = GzEncoder::new(BufWriter::new(file), Compression::new(self.compression_level));
        let mut tar = tar::Builder::new(encoder);
        tar.follow_symlinks(false);

        let mut skip_paths = self.skip_dirs.clone();
        skip_paths.push(output.to_path_buf());
        let options = WalkOptions {
            follow_links: false,
            exclude_names: self.exclude.clone(),
            skip_paths,
        };

        let mut file_count = 0usize;
        walk_directory_with_callback(root, &options, |entry| {
            tar.append_path_with_name(&entry.path, &entry.relative_path)?;
            file_count += 1;
            Ok(())
        })?;

        let encoder = tar.into_inner()?;
        let mut writer = encoder.finish()?;
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        Ok(file_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::fs;
    use tempfile::TempDir;

    fn entries(archive: &Path) -> Vec<String> {
        let mut tar = tar::Archive::new(GzDecoder::new(File::open(archive).unwrap()));
        let mut names: Vec<String> = tar
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    fn builder(exclude: &[&str]) -> CodeArchiveBuilder {
        CodeArchiveBuilder::new(&ArchiveConfig {
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
            compression_level: 9,
        })
    }

    #[test]
    fn test_ten_files_two_excluded() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("project");
        fs::create_dir_all(root.join("app/templates")).unwrap();
        fs::create_dir_all(root.join("node_modules/lib")).unwrap();

        for i in 0..4 {
            fs::write(root.join(format!("file{i}.py")), format!("print({i})")).unwrap();
        }
        for i in 0..2 {
            fs::write(root.join(format!("app/view{i}.py")), b"def v(): pass").unwrap();
        }
        for i in 0..2 {
            fs::write(root.join(format!("app/templates/t{i}.html")), b"<p></p>").unwrap();
        }
        fs::write(root.join("node_modules/a.js"), b"x").unwrap();
        fs::write(root.join("node_modules/lib/b.js"), b"y").unwrap();

        let dest = temp.path().join("out");
        let summary = builder(&["node_modules"]).build_blocking(&root, &dest).unwrap();

        assert_eq!(summary.file_count, 8);
        let names = entries(&summary.artifact.path);
        assert_eq!(names.len(), 8);
        assert!(names.contains(&"app/templates/t0.html".to_string()));
        assert!(names.iter().all(|n| !n.starts_with('/') && !n.contains("node_modules")));
        assert!(summary.artifact.is_intact());
    }

    #[test]
    fn test_archive_inside_tree_excludes_itself() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("manage.py"), b"#!/usr/bin/env python").unwrap();
        fs::create_dir_all(root.join(".git/objects")).unwrap();
        fs::write(root.join(".git/HEAD"), b"ref: refs/heads/main").unwrap();

        // output directory inside the traversed tree, not in the exclusion set
        let dest = root.join("out/code");
        let summary = builder(&[".git"]).build_blocking(root, &dest).unwrap();

        let names = entries(&summary.artifact.path);
        assert_eq!(names, vec!["manage.py".to_string()]);
    }

    #[test]
    fn test_earlier_artifacts_in_excluded_dir_are_skipped() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("settings.py"), b"DEBUG = False").unwrap();
        fs::create_dir_all(root.join("backups/db")).unwrap();
        fs::write(root.join("backups/db/backup_hr_1.sql"), b"old dump").unwrap();

        let summary = builder(&["backups"])
            .build_blocking(root, &root.join("backups/code"))
            .unwrap();
        assert_eq!(entries(&summary.artifact.path), vec!["settings.py".to_string()]);
    }

    #[test]
    fn test_skip_dir_leaves_out_renamed_backup_tree() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("manage.py"), b"").unwrap();
        fs::create_dir_all(root.join("var/archive/db")).unwrap();
        fs::write(root.join("var/archive/db/backup_hr_1.sql"), b"old dump").unwrap();
        fs::write(root.join("var/notes.txt"), b"keep").unwrap();

        let summary = builder(&[])
            .skip_dir(root.join("var/archive"))
            .build_blocking(root, &root.join("var/archive/code"))
            .unwrap();
        assert_eq!(
            entries(&summary.artifact.path),
            vec!["manage.py".to_string(), "var/notes.txt".to_string()]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_name_is_stored_byte_for_byte() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp = TempDir::new().unwrap();
        let root = temp.path().join("project");
        fs::create_dir_all(root.join("media")).unwrap();
        let name = OsStr::from_bytes(b"n\xf3mina_\xf1.pdf");
        // some file systems refuse non-UTF-8 names; nothing to check there
        if fs::write(root.join("media").join(name), b"%PDF").is_err() {
            return;
        }

        let summary = builder(&[]).build_blocking(&root, &temp.path().join("out")).unwrap();

        let mut tar = tar::Archive::new(GzDecoder::new(File::open(&summary.artifact.path).unwrap()));
        let stored: Vec<Vec<u8>> = tar
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path_bytes().into_owned())
            .collect();
        assert_eq!(stored, vec![b"media/n\xf3mina_\xf1.pdf".to_vec()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_entry_fails_whole_archive() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let root = temp.path().join("project");
        let locked = root.join("locked");
        fs::create_dir_all(&locked).unwrap();
        fs::write(locked.join("secret.txt"), b"x").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // root ignores permission bits; nothing to assert in that case
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let dest = temp.path().join("out");
        let err = builder(&[]).build_blocking(&root, &dest).unwrap_err();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(matches!(err, BackupError::FileSystem { .. }));
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 0);
    }
}
