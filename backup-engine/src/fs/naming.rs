//! Artifact file naming.
//!
//! Names embed a local timestamp. A file is reserved with create-new
//! semantics, so an existing artifact is never overwritten; on collision a
//! numeric suffix is appended.

use chrono::{DateTime, Local};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const MAX_SUFFIX: u32 = 1000;

pub fn file_timestamp(now: DateTime<Local>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

/// `backup_<dbname>_<timestamp>.sql`
pub fn dump_stem(db_name: &str, now: DateTime<Local>) -> String {
    let safe: String = db_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("backup_{}_{}", safe, file_timestamp(now))
}

pub fn code_stem(now: DateTime<Local>) -> String {
    format!("code_{}", file_timestamp(now))
}

pub fn bundle_stem(now: DateTime<Local>) -> String {
    format!("full_{}", file_timestamp(now))
}

/// Creates `dir` if needed and opens a fresh file named `<stem><ext>`, or
/// `<stem>_<n><ext>` when that name is taken.
pub fn create_unique(dir: &Path, stem: &str, ext: &str) -> std::io::Result<(PathBuf, File)> {
    std::fs::create_dir_all(dir)?;

    for n in 0..MAX_SUFFIX {
        let name = if n == 0 {
            format!("{stem}{ext}")
        } else {
            format!("{stem}_{n}{ext}")
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free artifact name for {stem}{ext} in {}", dir.display()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_dump_stem_embeds_name_and_timestamp() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(dump_stem("hr", now), "backup_hr_20240309_070501");
        assert_eq!(dump_stem("hr/prod db", now), "backup_hr_prod_db_20240309_070501");
    }

    #[test]
    fn test_create_unique_never_reuses_a_name() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("db");

        let (first, _) = create_unique(&dir, "backup_hr_1", ".sql").unwrap();
        std::fs::write(&first, b"complete dump").unwrap();
        let (second, _) = create_unique(&dir, "backup_hr_1", ".sql").unwrap();

        assert_eq!(first.file_name().unwrap(), "backup_hr_1.sql");
        assert_eq!(second.file_name().unwrap(), "backup_hr_1_1.sql");
        assert_eq!(std::fs::read(&first).unwrap(), b"complete dump");
    }
}
