//! Integration tests for backup discovery and restore.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use credvault::audit::{AuditLog, Auditor};
use credvault::backup::{BackupKind, BackupManager, RestoreOptions, RestoreOutcome};
use credvault::crypto::Argon2Params;
use credvault::errors::CredVaultError;
use credvault::vault::{atomic, format, Integrity, SessionOptions, VaultSession};
use tempfile::TempDir;

fn options() -> SessionOptions {
    SessionOptions {
        argon2: Argon2Params {
            memory_kib: 8_192,
            iterations: 1,
            parallelism: 1,
        },
        ..SessionOptions::default()
    }
}

/// A real vault holding one credential `service`.
fn make_vault(dir: &TempDir, service: &str) -> PathBuf {
    let path = dir.path().join("credentials.vault");
    let (mut session, _) =
        VaultSession::initialize(&path, "Sw0rdfish!", false, None, &options()).unwrap();
    let mut fields = BTreeMap::new();
    fields.insert("password".to_string(), "hunter2".to_string());
    session.add_credential(service, fields).unwrap();
    path
}

/// Remove the rolling slot written by `make_vault` so tests start clean.
fn clear_backups(manager: &BackupManager) {
    for backup in manager.discover().unwrap() {
        fs::remove_file(backup.path).unwrap();
    }
}

fn set_mtime(path: &Path, secs_after_epoch: u64) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs_after_epoch))
        .unwrap();
}

const T1: u64 = 1_700_000_000;
const T2: u64 = T1 + 60;
const T3: u64 = T2 + 60;

#[test]
fn discover_orders_by_modification_time() {
    let dir = TempDir::new().unwrap();
    let vault = make_vault(&dir, "github");
    let manager = BackupManager::new(&vault);
    clear_backups(&manager);

    // Created in one order, modified in another.
    let a = manager.create(BackupKind::Manual).unwrap();
    let b = manager.create(BackupKind::Automatic).unwrap();
    let c = manager.create(BackupKind::Manual).unwrap();
    set_mtime(&a.path, T3);
    set_mtime(&b.path, T1);
    set_mtime(&c.path, T2);

    let found: Vec<PathBuf> = manager
        .discover()
        .unwrap()
        .into_iter()
        .map(|b| b.path)
        .collect();
    assert_eq!(found, vec![a.path, c.path, b.path]);
}

#[test]
fn discover_includes_rolling_slot() {
    let dir = TempDir::new().unwrap();
    let vault = make_vault(&dir, "github");
    let manager = BackupManager::new(&vault);

    let backups = manager.discover().unwrap();
    assert_eq!(backups.len(), 1);
    assert!(backups[0].rolling);
    assert_eq!(backups[0].kind, BackupKind::Automatic);
    assert_eq!(backups[0].path, manager.rolling_path());
    assert_eq!(manager.verify(&backups[0]), Integrity::Valid);
}

#[test]
fn corrupted_newest_backup_is_reported_not_skipped() {
    let dir = TempDir::new().unwrap();
    let vault = make_vault(&dir, "github");
    let manager = BackupManager::new(&vault);
    clear_backups(&manager);

    let older = manager.create(BackupKind::Manual).unwrap();
    let newer = manager.create(BackupKind::Manual).unwrap();
    fs::write(&newer.path, b"definitely not a vault").unwrap();
    set_mtime(&older.path, T1);
    set_mtime(&newer.path, T2);

    let vault_before = fs::read(&vault).unwrap();
    let mut auditor = Auditor::for_vault(&vault);
    let err = manager
        .restore(RestoreOptions { force: true, dry_run: false }, &mut auditor, |_| Ok(true))
        .unwrap_err();

    match err {
        CredVaultError::BackupCorrupted {
            path, alternatives, ..
        } => {
            assert_eq!(path, newer.path);
            assert_eq!(alternatives, vec![older.path.clone()]);
        }
        other => panic!("expected BackupCorrupted, got {other:?}"),
    }
    assert_eq!(fs::read(&vault).unwrap(), vault_before);
    assert!(older.path.exists());
}

#[test]
fn restore_without_any_backup() {
    let dir = TempDir::new().unwrap();
    let vault = make_vault(&dir, "github");
    let manager = BackupManager::new(&vault);
    clear_backups(&manager);

    let mut auditor = Auditor::for_vault(&vault);
    let err = manager
        .restore(RestoreOptions::default(), &mut auditor, |_| Ok(true))
        .unwrap_err();
    assert!(matches!(err, CredVaultError::NoBackupsAvailable));
}

#[test]
fn dry_run_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let vault = make_vault(&dir, "github");
    let manager = BackupManager::new(&vault);
    let before_files = fs::read_dir(dir.path()).unwrap().count();
    let before = fs::read(&vault).unwrap();

    let mut auditor = Auditor::for_vault(&vault);
    let outcome = manager
        .restore(
            RestoreOptions { force: false, dry_run: true },
            &mut auditor,
            |_| panic!("dry run must not ask"),
        )
        .unwrap();

    match outcome {
        RestoreOutcome::DryRun(backup) => assert!(backup.rolling),
        other => panic!("expected DryRun, got {other:?}"),
    }
    assert_eq!(fs::read(&vault).unwrap(), before);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), before_files);
}

#[test]
fn declined_confirmation_cancels() {
    let dir = TempDir::new().unwrap();
    let vault = make_vault(&dir, "github");
    let manager = BackupManager::new(&vault);
    let before = fs::read(&vault).unwrap();

    let mut auditor = Auditor::for_vault(&vault);
    let outcome = manager
        .restore(RestoreOptions::default(), &mut auditor, |_| Ok(false))
        .unwrap();

    assert!(matches!(outcome, RestoreOutcome::Cancelled(_)));
    assert_eq!(fs::read(&vault).unwrap(), before);

    let log = AuditLog::open(dir.path()).unwrap();
    let latest = &log.query(1, None).unwrap()[0];
    assert_eq!(latest.event, "restore");
    assert_eq!(latest.outcome, "cancelled");
}

#[test]
fn restore_replaces_vault_and_snapshots_current() {
    let dir = TempDir::new().unwrap();
    let vault = dir.path().join("credentials.vault");
    let manager = BackupManager::new(&vault);

    // State A: only "github".
    {
        let (mut session, _) =
            VaultSession::initialize(&vault, "Sw0rdfish!", false, None, &options()).unwrap();
        let mut fields = BTreeMap::new();
        fields.insert("password".to_string(), "hunter2".to_string());
        session.add_credential("github", fields).unwrap();
    }
    clear_backups(&manager);
    let saved = manager.create(BackupKind::Manual).unwrap();
    set_mtime(&saved.path, T1);

    // State B: "github" removed. The rolling slot is older than the manual one.
    {
        let mut session = VaultSession::unlock(&vault, "Sw0rdfish!", &options()).unwrap();
        session.remove_credential("github").unwrap();
    }
    set_mtime(&manager.rolling_path(), T1 - 60);
    let state_b = fs::read(&vault).unwrap();

    let mut auditor = Auditor::for_vault(&vault);
    let outcome = manager
        .restore(RestoreOptions::default(), &mut auditor, |b| {
            assert_eq!(b.path, saved.path);
            Ok(true)
        })
        .unwrap();

    let RestoreOutcome::Restored { from, snapshot } = outcome else {
        panic!("expected Restored");
    };
    assert_eq!(from.path, saved.path);
    let snapshot = snapshot.expect("snapshot of replaced vault");
    assert_eq!(snapshot.kind, BackupKind::Automatic);
    assert_eq!(fs::read(&snapshot.path).unwrap(), state_b);

    let session = VaultSession::unlock(&vault, "Sw0rdfish!", &options()).unwrap();
    assert!(session.credential("github").is_ok());
}

#[test]
fn restoring_a_corrupted_vault_keeps_later_restores_working() {
    let dir = TempDir::new().unwrap();
    let vault = make_vault(&dir, "github");
    let manager = BackupManager::new(&vault);
    let manual = manager.create(BackupKind::Manual).unwrap();

    let mut bytes = fs::read(&vault).unwrap();
    bytes[10] ^= 0xFF;
    fs::write(&vault, &bytes).unwrap();

    let mut auditor = Auditor::for_vault(&vault);
    let force = RestoreOptions { force: true, dry_run: false };
    let outcome = manager.restore(force, &mut auditor, |_| Ok(true)).unwrap();
    let RestoreOutcome::Restored { snapshot, .. } = outcome else {
        panic!("expected Restored");
    };
    assert!(snapshot.is_none(), "corrupted vault must not become a backup");

    // The unreadable bytes are kept aside under a name restore ignores.
    let kept: Vec<PathBuf> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.to_string_lossy().ends_with(".corrupted"))
        .collect();
    assert_eq!(kept.len(), 1);
    assert_eq!(fs::read(&kept[0]).unwrap(), bytes);

    let backups = manager.discover().unwrap();
    assert!(backups.iter().all(|b| manager.verify(b) == Integrity::Valid));
    assert!(backups.iter().any(|b| b.path == manual.path));

    // A second restore still finds a valid newest backup.
    let outcome = manager
        .restore(RestoreOptions { force: false, dry_run: true }, &mut auditor, |_| Ok(true))
        .unwrap();
    assert!(matches!(outcome, RestoreOutcome::DryRun(_)));
    manager.restore(force, &mut auditor, |_| Ok(true)).unwrap();
    assert!(VaultSession::unlock(&vault, "Sw0rdfish!", &options()).is_ok());
}

#[test]
fn crash_before_rename_leaves_vault_intact() {
    let dir = TempDir::new().unwrap();
    let vault = make_vault(&dir, "github");
    let before = fs::read(&vault).unwrap();

    // Simulate a crash after staging: the staged file is never committed
    // and its cleanup never runs.
    let staged = atomic::stage(&vault, b"half-written replacement").unwrap();
    let tmp = staged.path().to_path_buf();
    std::mem::forget(staged);

    assert!(tmp.exists());
    assert_eq!(fs::read(&vault).unwrap(), before);
    assert_eq!(format::check_file(&vault), Integrity::Valid);

    // The next open and write work normally over the leftover temp file.
    let mut session = VaultSession::unlock(&vault, "Sw0rdfish!", &options()).unwrap();
    session.set_field("github", "username", "octo").unwrap();
    drop(session);

    let session = VaultSession::unlock(&vault, "Sw0rdfish!", &options()).unwrap();
    assert_eq!(
        session.credential("github").unwrap().field("username"),
        Some("octo")
    );
    // Leftover temp files are never mistaken for backups.
    assert!(BackupManager::new(&vault)
        .discover()
        .unwrap()
        .iter()
        .all(|b| b.path != tmp));
}

#[cfg(unix)]
#[test]
fn restore_refuses_while_vault_is_open() {
    let dir = TempDir::new().unwrap();
    let vault = make_vault(&dir, "github");
    let manager = BackupManager::new(&vault);

    let _session = VaultSession::unlock(&vault, "Sw0rdfish!", &options()).unwrap();
    let mut auditor = Auditor::for_vault(&vault);
    let err = manager
        .restore(RestoreOptions { force: true, dry_run: false }, &mut auditor, |_| Ok(true))
        .unwrap_err();
    assert!(matches!(err, CredVaultError::ConcurrentAccessConflict(_)));
}
