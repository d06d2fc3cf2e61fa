//! Combines finished artifacts into one uncompressed tar.
//!
//! The inputs are usually compressed already, so the bundle only stores them,
//! each under its own file name.

use crate::executor::{discard_partial, Artifact};
use crate::fs::naming;
use crate::utils::errors::{BackupError, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct BundleComposer;

impl BundleComposer {
    pub fn new() -> Self {
        Self
    }

    pub async fn compose(&self, inputs: &[PathBuf], dest_dir: &Path) -> Result<Artifact> {
        let composer = self.clone();
        let inputs = inputs.to_vec();
        let dest_dir = dest_dir.to_path_buf();
        tokio::task::spawn_blocking(move || composer.compose_blocking(&inputs, &dest_dir)).await?
    }

    pub fn compose_blocking(&self, inputs: &[PathBuf], dest_dir: &Path) -> Result<Artifact> {
        if inputs.is_empty() {
            return Err(BackupError::BundleComposition("no inputs to bundle".to_string()));
        }
        for input in inputs {
            if !input.is_file() {
                return Err(BackupError::BundleComposition(format!(
                    "input artifact missing: {}",
                    input.display()
                )));
            }
        }

        let stem = naming::bundle_stem(chrono::Local::now());
        let (path, file) = naming::create_unique(dest_dir, &stem, ".tar")
            .map_err(|e| BackupError::fs(format!("creating bundle in {}", dest_dir.display()), e))?;

        if let Err(e) = write_bundle(inputs, file) {
            discard_partial(&path);
            return Err(BackupError::fs(format!("writing bundle {}", path.display()), e));
        }

        let artifact = Artifact::from_disk(path)?;
        info!(
            path = %artifact.path.display(),
            size_bytes = artifact.size_bytes,
            inputs = inputs.len(),
            "Bundle composed"
        );
        Ok(artifact)
    }
}

fn write_bundle(inputs: &[PathBuf], file: File) -> std::io::Result<()> {
    let mut tar = tar::Builder::new(BufWriter::new(file));

    for input in inputs {
        let name = input.file_name().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} has no file name", input.display()),
            )
        })?;
        tar.append_path_with_name(input, name)?;
    }

    let mut writer = tar.into_inner()?;
    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_bundle_stores_inputs_by_base_name() {
        let temp = TempDir::new().unwrap();
        let dump = temp.path().join("db/backup_hr_20240101_000000.sql");
        let code = temp.path().join("code/code_20240101_000000.tar.gz");
        fs::create_dir_all(dump.parent().unwrap()).unwrap();
        fs::create_dir_all(code.parent().unwrap()).unwrap();
        fs::write(&dump, b"CREATE TABLE t (id INT);").unwrap();
        fs::write(&code, vec![0x1f, 0x8b, 0x08, 0x00]).unwrap();

        let artifact = BundleComposer::new()
            .compose_blocking(&[dump.clone(), code.clone()], &temp.path().join("full"))
            .unwrap();
        assert!(artifact.path.file_name().unwrap().to_string_lossy().starts_with("full_"));
        assert!(artifact.is_intact());

        let mut archive = tar::Archive::new(File::open(&artifact.path).unwrap());
        let mut found = Vec::new();
        for entry in archive.entries().unwrap() {
            let entry = entry.unwrap();
            found.push((entry.path().unwrap().to_string_lossy().to_string(), entry.size()));
        }
        assert_eq!(
            found,
            vec![
                ("backup_hr_20240101_000000.sql".to_string(), 24),
                ("code_20240101_000000.tar.gz".to_string(), 4),
            ]
        );
    }

    #[test]
    fn test_missing_input_is_composition_error() {
        let temp = TempDir::new().unwrap();
        let present = temp.path().join("a.sql");
        fs::write(&present, b"x").unwrap();
        let dest = temp.path().join("full");

        let err = BundleComposer::new()
            .compose_blocking(&[present, temp.path().join("gone.tar.gz")], &dest)
            .unwrap_err();

        assert!(matches!(err, BackupError::BundleComposition(_)));
        assert!(!dest.exists());
    }
}
