//! Advisory single-writer lock for a vault file.
//!
//! An exclusive non-blocking `flock` is taken on `<vault>.lock` for as
//! long as a session, recovery or restore is working on the vault. The
//! lock is released when the handle is dropped (the descriptor closes).
//! Two independent opens conflict even inside one process, so a second
//! session on the same vault fails fast instead of interleaving writes.
//!
//! On non-Unix targets the lock file is created but not locked.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::{CredVaultError, Result};

/// Held lock on a vault; dropping it releases the lock.
#[derive(Debug)]
pub struct VaultLock {
    _file: File,
}

impl VaultLock {
    /// Path of the lock file guarding `vault_path`.
    pub fn lock_path(vault_path: &Path) -> PathBuf {
        let mut name = vault_path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        vault_path.with_file_name(name)
    }

    /// Take the exclusive lock or fail with `ConcurrentAccessConflict`.
    pub fn acquire(vault_path: &Path) -> Result<Self> {
        let path = Self::lock_path(vault_path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| CredVaultError::from_io(e, &path))?;

        try_lock_exclusive(&file).map_err(|e| {
            if e.kind() == std::io::ErrorKind::WouldBlock {
                CredVaultError::ConcurrentAccessConflict(vault_path.to_path_buf())
            } else {
                CredVaultError::from_io(e, &path)
            }
        })?;

        debug!(lock = %path.display(), "acquired vault lock");
        Ok(Self { _file: file })
    }
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor belongs to `file`, which outlives this call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lock_path_is_next_to_vault() {
        let p = VaultLock::lock_path(Path::new("/tmp/x/credentials.vault"));
        assert_eq!(p, PathBuf::from("/tmp/x/credentials.vault.lock"));
    }

    #[cfg(unix)]
    #[test]
    fn second_acquire_conflicts_until_release() {
        let dir = TempDir::new().unwrap();
        let vault = dir.path().join("v.vault");

        let first = VaultLock::acquire(&vault).unwrap();
        assert!(matches!(
            VaultLock::acquire(&vault),
            Err(CredVaultError::ConcurrentAccessConflict(_))
        ));

        drop(first);
        assert!(VaultLock::acquire(&vault).is_ok());
    }
}
