//! Crash-safe file replacement.
//!
//! Every durable write goes: write full contents to a temp file in the
//! same directory → `fsync` → rename over the target → `fsync` the
//! directory. A crash at any point leaves either the old file or the new
//! one, never a truncated mix.
//!
//! The two halves are exposed separately (`stage` / `StagedFile::commit`)
//! so callers can verify the staged bytes before they replace anything.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::{CredVaultError, Result};

/// A fully written and synced temp file waiting to replace `target`.
///
/// Dropping it without calling `commit` removes the temp file and leaves
/// the target untouched.
#[derive(Debug)]
pub struct StagedFile {
    tmp_path: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedFile {
    /// Path of the staged temp file.
    pub fn path(&self) -> &Path {
        &self.tmp_path
    }

    /// Atomically move the staged file over the target.
    pub fn commit(mut self) -> Result<()> {
        fs::rename(&self.tmp_path, &self.target)
            .map_err(|e| CredVaultError::from_io(e, &self.target))?;
        self.committed = true;
        sync_parent(&self.target);
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

/// Temp file path used for `target`: hidden, same directory.
pub fn temp_path_for(target: &Path) -> PathBuf {
    let parent = target.parent().unwrap_or(Path::new("."));
    parent.join(format!(
        ".{}.tmp",
        target.file_name().unwrap_or_default().to_string_lossy()
    ))
}

/// Write `bytes` to a synced temp file next to `target`.
pub fn stage(target: &Path, bytes: &[u8]) -> Result<StagedFile> {
    let tmp_path = temp_path_for(target);

    let mut file = create_private(&tmp_path).map_err(|e| CredVaultError::from_io(e, &tmp_path))?;
    let staged = StagedFile {
        tmp_path,
        target: target.to_path_buf(),
        committed: false,
    };

    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .map_err(|e| CredVaultError::from_io(e, staged.path()))?;

    Ok(staged)
}

/// Stage and commit in one step.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    stage(target, bytes)?.commit()
}

/// Create (truncating) a file readable only by its owner.
fn create_private(path: &Path) -> std::io::Result<File> {
    let mut opts = OpenOptions::new();
    opts.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }

    opts.open(path)
}

/// Best-effort fsync of the directory holding `path` so the rename
/// itself is durable.
fn sync_parent(path: &Path) {
    #[cfg(unix)]
    if let Some(parent) = path.parent() {
        let dir = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        if let Ok(handle) = File::open(dir) {
            let _ = handle.sync_all();
        }
    }

    #[cfg(not(unix))]
    let _ = path;
}
