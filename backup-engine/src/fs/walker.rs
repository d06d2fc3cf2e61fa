//! Directory traversal with name- and path-based pruning.
//!
//! Excluded names and skipped directories are pruned before descent, so
//! large dependency trees or the backup output tree are never listed. Any
//! unreadable entry aborts the walk.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Follow symbolic links
    pub follow_links: bool,

    /// Basenames excluded from the walk (directories are pruned entirely)
    pub exclude_names: HashSet<String>,

    /// Paths never yielded, together with everything beneath them
    /// (e.g. the archive being written or the backup output tree)
    pub skip_paths: Vec<PathBuf>,
}

/// A file discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the file
    pub path: PathBuf,

    /// Relative path from the root
    pub relative_path: PathBuf,
}

/// Walk a directory tree depth-first with a callback for each file.
///
/// The walk stops at the first error, whether it comes from the file system
/// or from the callback.
pub fn walk_directory_with_callback<F>(
    root: &Path,
    options: &WalkOptions,
    mut callback: F,
) -> std::io::Result<()>
where
    F: FnMut(&FileInfo) -> std::io::Result<()>,
{
    // Resolved once; entries are mapped onto the canonical root instead of
    // being canonicalized one by one.
    let canonical_root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    let skip: Vec<PathBuf> = options
        .skip_paths
        .iter()
        .map(|p| std::fs::canonicalize(p).unwrap_or_else(|_| p.clone()))
        .collect();

    let walker = WalkDir::new(root)
        .follow_links(options.follow_links)
        .sort_by_file_name()
        .into_iter()
        // The root itself is never pruned.
        .filter_entry(|entry| {
            entry.depth() == 0
                || !(is_excluded(entry, &options.exclude_names)
                    || is_skipped(entry.path(), root, &canonical_root, &skip))
        });

    for entry in walker {
        let entry = entry?;

        if entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        callback(&FileInfo {
            path,
            relative_path,
        })?;
    }

    Ok(())
}

fn is_excluded(entry: &DirEntry, names: &HashSet<String>) -> bool {
    names.contains(entry.file_name().to_string_lossy().as_ref())
}

fn is_skipped(path: &Path, root: &Path, canonical_root: &Path, skip: &[PathBuf]) -> bool {
    if skip.is_empty() {
        return false;
    }
    let resolved = match path.strip_prefix(root) {
        Ok(relative) => canonical_root.join(relative),
        Err(_) => path.to_path_buf(),
    };
    skip.iter().any(|s| resolved.starts_with(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn collect(root: &Path, options: &WalkOptions) -> std::io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        walk_directory_with_callback(root, options, |file| {
            files.push(file.relative_path.clone());
            Ok(())
        })?;
        Ok(files)
    }

    fn excluding(names: &[&str]) -> WalkOptions {
        WalkOptions {
            exclude_names: names.iter().map(|n| n.to_string()).collect(),
            ..WalkOptions::default()
        }
    }

    #[test]
    fn test_walk_empty_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let files = collect(temp_dir.path(), &WalkOptions::default())?;
        assert_eq!(files.len(), 0);
        Ok(())
    }

    #[test]
    fn test_walk_with_subdirectories() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("subdir"))?;
        fs::write(temp_dir.path().join("file1.txt"), b"content1")?;
        fs::write(temp_dir.path().join("subdir/file2.txt"), b"content2")?;

        let files = collect(temp_dir.path(), &WalkOptions::default())?;
        assert_eq!(
            files,
            vec![PathBuf::from("file1.txt"), PathBuf::from("subdir/file2.txt")]
        );

        Ok(())
    }

    #[test]
    fn test_excluded_directory_is_pruned() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir_all(temp_dir.path().join("node_modules/pkg"))?;
        fs::write(temp_dir.path().join("node_modules/pkg/index.js"), b"x")?;
        fs::create_dir_all(temp_dir.path().join("src/node_modules"))?;
        fs::write(temp_dir.path().join("src/node_modules/deep.js"), b"x")?;
        fs::write(temp_dir.path().join("src/main.py"), b"print()")?;
        fs::write(temp_dir.path().join(".DS_Store"), b"junk")?;

        let files = collect(temp_dir.path(), &excluding(&["node_modules", ".DS_Store"]))?;
        assert_eq!(files, vec![PathBuf::from("src/main.py")]);

        Ok(())
    }

    #[test]
    fn test_exclusion_matches_whole_basename_only() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::write(temp_dir.path().join("my.git.notes"), b"keep")?;
        fs::write(temp_dir.path().join("backups.md"), b"keep")?;

        let files = collect(temp_dir.path(), &excluding(&[".git", "backups"]))?;
        assert_eq!(files.len(), 2);

        Ok(())
    }

    #[test]
    fn test_skip_path() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let output = temp_dir.path().join("out.tar.gz");

        fs::write(&output, b"partial")?;
        fs::write(temp_dir.path().join("a.txt"), b"a")?;

        let options = WalkOptions {
            skip_paths: vec![output],
            ..WalkOptions::default()
        };
        let files = collect(temp_dir.path(), &options)?;
        assert_eq!(files, vec![PathBuf::from("a.txt")]);

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_skipped_directory_is_never_descended() -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new()?;
        let skipped = temp_dir.path().join("var/archive");
        let locked = skipped.join("locked");
        fs::create_dir_all(&locked)?;
        fs::write(locked.join("dump.sql"), b"x")?;
        fs::write(temp_dir.path().join("var/notes.txt"), b"keep")?;
        // descending here would fail the walk
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000))?;

        let options = WalkOptions {
            skip_paths: vec![skipped],
            ..WalkOptions::default()
        };
        let result = collect(temp_dir.path(), &options);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755))?;

        assert_eq!(result?, vec![PathBuf::from("var/notes.txt")]);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_names_are_kept_verbatim() -> std::io::Result<()> {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp_dir = TempDir::new()?;
        let name = OsStr::from_bytes(b"vacaciones_\xf1.txt");
        // some file systems refuse non-UTF-8 names; nothing to check there
        if fs::write(temp_dir.path().join(name), b"x").is_err() {
            return Ok(());
        }

        let files = collect(temp_dir.path(), &WalkOptions::default())?;
        assert_eq!(files, vec![PathBuf::from(name)]);
        Ok(())
    }

    #[test]
    fn test_callback_error_stops_walk() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.txt"), b"a").unwrap();
        fs::write(temp_dir.path().join("b.txt"), b"b").unwrap();

        let mut seen = 0;
        let result = walk_directory_with_callback(temp_dir.path(), &WalkOptions::default(), |_| {
            seen += 1;
            Err(std::io::Error::new(std::io::ErrorKind::Other, "stop"))
        });
        assert!(result.is_err());
        assert_eq!(seen, 1);
    }
}
