//! Filesystem helpers for the artifact store: staged directory
//! replacement, JSON loading, and content checksums.
//!
//! A reader never observes a half-written artifact directory: new contents
//! are built in a hidden sibling and renamed over the target in one step.

use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};

/// Load and deserialize a JSON file.
///
/// Returns `Ok(None)` if the file doesn't exist; a malformed document is an
/// `InvalidData` error.
pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    let value =
        serde_json::from_str(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(value))
}

/// Hex-encoded SHA-256 of a byte slice.
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// A directory populated in a staging location and swapped into place on commit.
///
/// The staging directory is a hidden sibling of the target, so the final
/// renames never cross filesystems. Dropping an uncommitted `StagedDir`
/// removes the staging directory and leaves the target untouched.
#[derive(Debug)]
pub struct StagedDir {
    staging: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedDir {
    /// Create an empty staging directory for `target`.
    pub fn create(target: &Path) -> io::Result<Self> {
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("target has no directory name: {}", target.display()),
                )
            })?;
        let parent = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;
        let staging = parent.join(format!(".{name}.staging-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir(&staging)?;
        Ok(Self {
            staging,
            target: target.to_path_buf(),
            committed: false,
        })
    }

    /// Directory to write the new contents into.
    pub fn path(&self) -> &Path {
        &self.staging
    }

    /// Final location once committed.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Swap the staged contents into the target location.
    ///
    /// An existing target is moved aside first and removed after the swap;
    /// if the swap itself fails, the previous target is restored.
    pub fn commit(mut self) -> io::Result<()> {
        let previous = if self.target.exists() {
            let name = self
                .target
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let aside = self
                .staging
                .with_file_name(format!(".{name}.previous-{}", uuid::Uuid::new_v4()));
            std::fs::rename(&self.target, &aside)?;
            Some(aside)
        } else {
            None
        };

        if let Err(e) = std::fs::rename(&self.staging, &self.target) {
            if let Some(aside) = &previous {
                if let Err(restore) = std::fs::rename(aside, &self.target) {
                    tracing::error!(
                        error = %restore,
                        previous = %aside.display(),
                        "Failed to restore previous artifact directory"
                    );
                }
            }
            return Err(e);
        }
        self.committed = true;

        if let Some(aside) = previous {
            if let Err(e) = std::fs::remove_dir_all(&aside) {
                tracing::warn!(error = %e, path = %aside.display(), "Failed to remove previous artifact directory");
            }
        }
        Ok(())
    }
}

impl Drop for StagedDir {
    fn drop(&mut self) {
        if !self.committed && self.staging.exists() {
            let _ = std::fs::remove_dir_all(&self.staging);
        }
    }
}
