//! Backup manager: copies of the vault file next to it, discovery
//! newest-first, a password-free integrity check, and atomic restore.
//!
//! Naming, for a vault at `dir/credentials.vault`:
//! - `dir/credentials.vault.20261019T101112123Z.manual.backup`
//! - `dir/credentials.vault.20261019T101112123Z.automatic.backup`
//! - `dir/credentials.vault.backup` (the rolling automatic slot)
//!
//! Timestamped backups are never overwritten. Only the rolling slot is
//! replaced, and only by another automatic backup.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, Auditor, Outcome};
use crate::errors::{CredVaultError, Result};
use crate::vault::atomic;
use crate::vault::format::{self, Integrity};
use crate::vault::lock::VaultLock;

/// Timestamp layout embedded in backup file names (UTC, milliseconds).
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%3fZ";

/// Extension shared by every backup file.
const BACKUP_SUFFIX: &str = "backup";

/// Who asked for a backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    Automatic,
    Manual,
}

impl BackupKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Automatic => "automatic",
            Self::Manual => "manual",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "automatic" => Some(Self::Automatic),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How automatic pre-write backups are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoBackupPolicy {
    /// One `<vault>.backup` file, replaced on every write.
    #[default]
    Rolling,
    /// A new timestamped automatic backup on every write.
    Timestamped,
}

/// A backup found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRef {
    pub path: PathBuf,
    pub kind: BackupKind,
    pub modified: DateTime<Utc>,
    pub size: u64,
    /// `true` for the rolling `<vault>.backup` slot.
    pub rolling: bool,
    #[serde(skip)]
    name_time: Option<DateTime<Utc>>,
}

impl BackupRef {
    fn from_path(path: PathBuf, kind: BackupKind, rolling: bool, name_time: Option<DateTime<Utc>>) -> Result<Self> {
        let meta = fs::metadata(&path).map_err(|e| CredVaultError::from_io(e, &path))?;
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        Ok(Self {
            path,
            kind,
            modified: modified.into(),
            size: meta.len(),
            rolling,
            name_time,
        })
    }

    /// File name for display.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Flags for `BackupManager::restore`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreOptions {
    /// Skip the confirmation callback.
    pub force: bool,
    /// Report the selection and stop.
    pub dry_run: bool,
}

/// What a restore did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Nothing was written; this backup would have been used.
    DryRun(BackupRef),
    /// The user declined.
    Cancelled(BackupRef),
    /// The vault now holds the contents of `from`. The replaced vault was
    /// saved as `snapshot` when there was one.
    Restored {
        from: BackupRef,
        snapshot: Option<BackupRef>,
    },
}

/// Creates, finds, checks and restores backups for one vault file.
#[derive(Debug, Clone)]
pub struct BackupManager {
    vault_path: PathBuf,
}

impl BackupManager {
    pub fn new(vault_path: &Path) -> Self {
        Self {
            vault_path: vault_path.to_path_buf(),
        }
    }

    pub fn vault_path(&self) -> &Path {
        &self.vault_path
    }

    /// `<vault>.backup`
    pub fn rolling_path(&self) -> PathBuf {
        let mut name = self.vault_name();
        name.push('.');
        name.push_str(BACKUP_SUFFIX);
        self.vault_path.with_file_name(name)
    }

    fn timestamped_path(&self, kind: BackupKind, at: DateTime<Utc>) -> PathBuf {
        self.vault_path.with_file_name(format!(
            "{}.{}.{}.{BACKUP_SUFFIX}",
            self.vault_name(),
            at.format(TIMESTAMP_FORMAT),
            kind
        ))
    }

    fn vault_name(&self) -> String {
        self.vault_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn vault_dir(&self) -> &Path {
        match self.vault_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }

    /// Copy the current vault file to a new timestamped backup.
    pub fn create(&self, kind: BackupKind) -> Result<BackupRef> {
        let bytes = format::read_file(&self.vault_path)?;

        let mut at = Utc::now();
        let mut path = self.timestamped_path(kind, at);
        while path.exists() {
            at += Duration::milliseconds(1);
            path = self.timestamped_path(kind, at);
        }

        atomic::write_atomic(&path, &bytes)?;
        info!(backup = %path.display(), %kind, "backup created");

        let name_time = parse_name_time(&at.format(TIMESTAMP_FORMAT).to_string());
        BackupRef::from_path(path, kind, false, name_time)
    }

    /// Pre-write backup according to `policy`. `None` when there is no
    /// vault file yet.
    pub fn create_automatic(&self, policy: AutoBackupPolicy) -> Result<Option<BackupRef>> {
        if !self.vault_path.exists() {
            return Ok(None);
        }
        match policy {
            AutoBackupPolicy::Timestamped => self.create(BackupKind::Automatic).map(Some),
            AutoBackupPolicy::Rolling => {
                let bytes = format::read_file(&self.vault_path)?;
                let path = self.rolling_path();
                atomic::write_atomic(&path, &bytes)?;
                debug!(backup = %path.display(), "rolling backup updated");
                BackupRef::from_path(path, BackupKind::Automatic, true, None).map(Some)
            }
        }
    }

    /// Every backup of this vault, newest first by modification time.
    pub fn discover(&self) -> Result<Vec<BackupRef>> {
        let dir = self.vault_dir();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CredVaultError::from_io(e, dir)),
        };

        let vault_name = self.vault_name();
        let rolling_name = format!("{vault_name}.{BACKUP_SUFFIX}");
        let prefix = format!("{vault_name}.");
        let suffix = format!(".{BACKUP_SUFFIX}");

        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CredVaultError::from_io(e, dir))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();

            if !path.is_file() {
                continue;
            }

            if name == rolling_name {
                backups.extend(skip_vanished(BackupRef::from_path(
                    path,
                    BackupKind::Automatic,
                    true,
                    None,
                ))?);
                continue;
            }

            let Some(middle) = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(&suffix))
            else {
                continue;
            };
            let Some((stamp, kind)) = middle.rsplit_once('.') else {
                continue;
            };
            let (Some(kind), Some(name_time)) = (BackupKind::parse(kind), parse_name_time(stamp))
            else {
                continue;
            };
            backups.extend(skip_vanished(BackupRef::from_path(
                path,
                kind,
                false,
                Some(name_time),
            ))?);
        }

        backups.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.name_time.cmp(&a.name_time))
                .then_with(|| b.path.cmp(&a.path))
        });
        Ok(backups)
    }

    /// Password-free structural check of a backup file.
    pub fn verify(&self, backup: &BackupRef) -> Integrity {
        format::check_file(&backup.path)
    }

    /// Replace the vault with its newest backup.
    ///
    /// A corrupted newest backup is reported with the valid alternatives;
    /// there is no silent fallback to an older one. `confirm` is asked
    /// unless `options.force` is set. The vault is only ever replaced by
    /// rename, so any failure leaves it as it was.
    pub fn restore<F>(&self, options: RestoreOptions, auditor: &mut Auditor, confirm: F) -> Result<RestoreOutcome>
    where
        F: FnOnce(&BackupRef) -> Result<bool>,
    {
        let backups = self.discover()?;
        let Some(newest) = backups.first().cloned() else {
            auditor.record(AuditEvent::Restore, Outcome::Failure, Some("no backups"));
            return Err(CredVaultError::NoBackupsAvailable);
        };

        if let Integrity::Corrupted(reason) = self.verify(&newest) {
            let alternatives: Vec<PathBuf> = backups[1..]
                .iter()
                .filter(|b| self.verify(b) == Integrity::Valid)
                .map(|b| b.path.clone())
                .collect();
            warn!(backup = %newest.path.display(), %reason, "newest backup is corrupted");
            auditor.record(
                AuditEvent::Restore,
                Outcome::Failure,
                Some(&newest.path.display().to_string()),
            );
            return Err(CredVaultError::BackupCorrupted {
                path: newest.path,
                reason,
                alternatives,
            });
        }

        if options.dry_run {
            return Ok(RestoreOutcome::DryRun(newest));
        }

        if !options.force && !confirm(&newest)? {
            auditor.record(
                AuditEvent::Restore,
                Outcome::Cancelled,
                Some(&newest.path.display().to_string()),
            );
            return Ok(RestoreOutcome::Cancelled(newest));
        }

        let context = newest.path.display().to_string();
        match self.replace_vault(&newest) {
            Ok(snapshot) => {
                auditor.record(AuditEvent::Restore, Outcome::Success, Some(&context));
                info!(backup = %context, "vault restored");
                Ok(RestoreOutcome::Restored {
                    from: newest,
                    snapshot,
                })
            }
            Err(e) => {
                auditor.record(AuditEvent::Restore, Outcome::Failure, Some(&context));
                Err(e)
            }
        }
    }

    /// `<vault>.<timestamp>.corrupted`, a name `discover` never returns.
    fn corrupted_path(&self, at: DateTime<Utc>) -> PathBuf {
        self.vault_path.with_file_name(format!(
            "{}.{}.corrupted",
            self.vault_name(),
            at.format(TIMESTAMP_FORMAT)
        ))
    }

    /// Copy an unreadable vault aside so a restore does not lose it.
    fn keep_corrupted(&self) -> Result<PathBuf> {
        let bytes =
            fs::read(&self.vault_path).map_err(|e| CredVaultError::from_io(e, &self.vault_path))?;
        let mut at = Utc::now();
        let mut path = self.corrupted_path(at);
        while path.exists() {
            at += Duration::milliseconds(1);
            path = self.corrupted_path(at);
        }
        atomic::write_atomic(&path, &bytes)?;
        Ok(path)
    }

    fn replace_vault(&self, backup: &BackupRef) -> Result<Option<BackupRef>> {
        let _lock = VaultLock::acquire(&self.vault_path)?;

        let bytes = fs::read(&backup.path).map_err(|e| CredVaultError::from_io(e, &backup.path))?;
        let staged = atomic::stage(&self.vault_path, &bytes)?;
        if let Integrity::Corrupted(reason) = format::check_file(staged.path()) {
            return Err(CredVaultError::IntegrityFailure(format!(
                "staged restore did not verify: {reason}"
            )));
        }

        // A corrupted vault is kept aside, never as a backup: it would
        // become the newest one and block every later restore.
        let snapshot = if !self.vault_path.exists() {
            None
        } else if let Integrity::Corrupted(reason) = format::check_file(&self.vault_path) {
            let kept = self.keep_corrupted()?;
            warn!(
                vault = %self.vault_path.display(),
                kept = %kept.display(),
                %reason,
                "current vault is corrupted, kept outside the backup set"
            );
            None
        } else {
            Some(self.create(BackupKind::Automatic)?)
        };

        staged.commit()?;

        if let Integrity::Corrupted(reason) = format::check_file(&self.vault_path) {
            return Err(CredVaultError::IntegrityFailure(format!(
                "restored vault did not verify: {reason}"
            )));
        }
        Ok(snapshot)
    }
}

/// Drop backups that disappeared between listing and `stat`.
fn skip_vanished(found: Result<BackupRef>) -> Result<Option<BackupRef>> {
    match found {
        Ok(backup) => Ok(Some(backup)),
        Err(CredVaultError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn parse_name_time(stamp: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
