//! The unlocked vault: the one object every caller goes through.
//!
//! A `VaultSession` owns the decrypted contents, the data key and the
//! vault lock. There is no global "current vault"; callers hold the
//! session and pass it around by reference.
//!
//! Every change is persisted immediately: automatic backup, then seal
//! under a fresh nonce, then atomic replace. If any step fails the
//! in-memory contents are rolled back to match the file on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::atomic;
use super::credential::{validate_name, Credential, CredentialSummary, VaultContents};
use super::format::{
    self, KdfDescriptor, KeySlot, RecoveryMetadata, VaultHeader, CURRENT_VERSION,
    DEFAULT_CHALLENGE_WORDS, PASSWORD_SLOT_AAD, RECOVERY_SLOT_AAD, TOTAL_RECOVERY_WORDS,
};
use super::lock::VaultLock;
use crate::audit::{AuditEvent, Auditor, Outcome};
use crate::backup::{AutoBackupPolicy, BackupKind, BackupManager, BackupRef};
use crate::crypto::keys::{PASSWORD_WRAP_INFO, RECOVERY_WRAP_INFO};
use crate::crypto::{derive_key, generate_salt, unwrap_key, wrap_key, Argon2Params, SecretKey};
use crate::errors::{CredVaultError, Result};
use crate::recovery::RecoverySecret;
use crate::usage;

/// Tunables a session is opened with. Built from `Settings` by the CLI.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// KDF cost for new password slots.
    pub argon2: Argon2Params,
    pub auto_backup: AutoBackupPolicy,
    /// Words asked per recovery challenge (stored in new vaults).
    pub challenge_words: u8,
    pub max_recovery_attempts: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            argon2: Argon2Params::default(),
            auto_backup: AutoBackupPolicy::default(),
            challenge_words: DEFAULT_CHALLENGE_WORDS,
            max_recovery_attempts: 3,
        }
    }
}

impl SessionOptions {
    fn validate(&self) -> Result<()> {
        self.argon2.validate()?;
        if self.challenge_words == 0 || self.challenge_words > TOTAL_RECOVERY_WORDS {
            return Err(CredVaultError::ConfigError(format!(
                "recovery challenge words must be between 1 and {TOTAL_RECOVERY_WORDS}, got {}",
                self.challenge_words
            )));
        }
        if self.max_recovery_attempts == 0 {
            return Err(CredVaultError::ConfigError(
                "recovery attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// An unlocked vault.
pub struct VaultSession {
    path: PathBuf,
    header: VaultHeader,
    contents: VaultContents,
    data_key: SecretKey,
    backups: BackupManager,
    auditor: Auditor,
    options: SessionOptions,
    _lock: VaultLock,
}

impl VaultSession {
    /// Create a new vault at `path`.
    ///
    /// With `enable_recovery` the returned `RecoverySecret` holds the
    /// 24-word mnemonic. This is the only time it exists: it is not
    /// written anywhere and cannot be shown again.
    pub fn initialize(
        path: &Path,
        password: &str,
        enable_recovery: bool,
        passphrase: Option<&str>,
        options: &SessionOptions,
    ) -> Result<(Self, Option<RecoverySecret>)> {
        options.validate()?;
        if path.exists() {
            return Err(CredVaultError::VaultAlreadyExists(path.to_path_buf()));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CredVaultError::from_io(e, parent))?;
        }

        let lock = VaultLock::acquire(path)?;
        if path.exists() {
            return Err(CredVaultError::VaultAlreadyExists(path.to_path_buf()));
        }

        let salt = generate_salt();
        let data_key = SecretKey::random();
        let password_slot = password_slot(password, &salt, options.argon2, &data_key)?;

        let passphrase = passphrase.filter(|p| !p.is_empty());
        let (recovery, secret) = if enable_recovery {
            let secret = RecoverySecret::generate()?;
            let recovery_key = secret.derive_key(passphrase, &salt, &options.argon2)?;
            let kek = recovery_key.derive_subkey(RECOVERY_WRAP_INFO)?;
            let (nonce, wrapped_key) = wrap_key(&kek, RECOVERY_SLOT_AAD, &data_key)?;
            let metadata = RecoveryMetadata {
                recovery_enabled: true,
                passphrase_required: passphrase.is_some(),
                recovery_key_fingerprint: Some(recovery_key.fingerprint()?),
                challenge_word_count: options.challenge_words,
                total_word_count: TOTAL_RECOVERY_WORDS,
                slot: Some(KeySlot {
                    kdf: KdfDescriptor::argon2id(options.argon2),
                    salt: salt.to_vec(),
                    nonce: nonce.to_vec(),
                    wrapped_key,
                }),
            };
            (metadata, Some(secret))
        } else {
            let mut metadata = RecoveryMetadata::disabled();
            metadata.challenge_word_count = options.challenge_words;
            (metadata, None)
        };

        let mut session = Self {
            path: path.to_path_buf(),
            header: VaultHeader {
                version: CURRENT_VERSION,
                created_at: Utc::now(),
                password_slot,
                recovery,
                nonce: Vec::new(),
            },
            contents: VaultContents::default(),
            data_key,
            backups: BackupManager::new(path),
            auditor: Auditor::for_vault(path),
            options: options.clone(),
            _lock: lock,
        };

        if let Err(e) = session.write() {
            session.audit(AuditEvent::Initialize, Outcome::Failure, None);
            return Err(e);
        }
        session.audit(
            AuditEvent::Initialize,
            Outcome::Success,
            Some(if enable_recovery {
                "recovery enabled"
            } else {
                "recovery disabled"
            }),
        );
        info!(vault = %path.display(), recovery = enable_recovery, "vault initialized");

        Ok((session, secret))
    }

    /// Open an existing vault with the master password.
    pub fn unlock(path: &Path, password: &str, options: &SessionOptions) -> Result<Self> {
        if !path.exists() {
            return Err(CredVaultError::VaultNotFound(path.to_path_buf()));
        }
        let lock = VaultLock::acquire(path)?;
        let mut auditor = Auditor::for_vault(path);

        let data = format::read_file(path)?;
        match open_with_password(&data, password) {
            Ok((header, contents, data_key)) => {
                auditor.record(AuditEvent::Unlock, Outcome::Success, None);
                debug!(vault = %path.display(), credentials = contents.credentials.len(), "vault unlocked");
                Ok(Self {
                    path: path.to_path_buf(),
                    header,
                    contents,
                    data_key,
                    backups: BackupManager::new(path),
                    auditor,
                    options: options.clone(),
                    _lock: lock,
                })
            }
            Err(e) => {
                auditor.record(AuditEvent::Unlock, Outcome::Failure, None);
                warn!(vault = %path.display(), "unlock failed");
                Err(e)
            }
        }
    }

    /// Session on a vault whose data key came out of a verified recovery.
    /// The password slot is replaced by one for `new_password`.
    pub(crate) fn from_recovery(
        path: &Path,
        data: &[u8],
        data_key: SecretKey,
        new_password: &str,
        options: &SessionOptions,
        lock: VaultLock,
    ) -> Result<Self> {
        let (header, contents) = open_with_key(data, &data_key)?;
        let mut session = Self {
            path: path.to_path_buf(),
            header,
            contents,
            data_key,
            backups: BackupManager::new(path),
            auditor: Auditor::for_vault(path),
            options: options.clone(),
            _lock: lock,
        };
        session.rewrap_password(new_password)?;
        Ok(session)
    }

    /// Replace the master password. The recovery slot is untouched, so
    /// the same mnemonic keeps working.
    pub fn change_password(&mut self, old_password: &str, new_password: &str) -> Result<()> {
        let slot = &self.header.password_slot;
        let verified = password_kek(old_password, slot)
            .and_then(|kek| unwrap_key(&kek, PASSWORD_SLOT_AAD, &slot.nonce, &slot.wrapped_key));
        if verified.is_err() {
            self.audit(AuditEvent::ChangePassword, Outcome::Failure, None);
            return Err(CredVaultError::AuthenticationFailure);
        }

        match self.rewrap_password(new_password) {
            Ok(()) => {
                self.audit(AuditEvent::ChangePassword, Outcome::Success, None);
                info!(vault = %self.path.display(), "master password changed");
                Ok(())
            }
            Err(e) => {
                self.audit(AuditEvent::ChangePassword, Outcome::Failure, None);
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Credentials
    // ------------------------------------------------------------------

    /// Add a new credential with the given fields.
    pub fn add_credential(&mut self, service: &str, fields: BTreeMap<String, String>) -> Result<()> {
        validate_name("service", service)?;
        for name in fields.keys() {
            validate_name("field", name)?;
        }
        if self.contents.credentials.contains_key(service) {
            return Err(CredVaultError::CredentialAlreadyExists(service.to_string()));
        }

        self.commit(Some(AuditEvent::CredentialAdd), service, |contents| {
            contents
                .credentials
                .insert(service.to_string(), Credential::new(service, fields));
            Ok(())
        })
    }

    /// Insert or replace one field of an existing credential.
    pub fn set_field(&mut self, service: &str, field: &str, value: &str) -> Result<()> {
        validate_name("field", field)?;
        self.commit(Some(AuditEvent::CredentialUpdate), service, |contents| {
            contents
                .credentials
                .get_mut(service)
                .ok_or_else(|| CredVaultError::CredentialNotFound(service.to_string()))?
                .set_field(field, value);
            Ok(())
        })
    }

    /// Delete a credential together with its usage history.
    pub fn remove_credential(&mut self, service: &str) -> Result<()> {
        self.commit(Some(AuditEvent::CredentialDelete), service, |contents| {
            contents
                .credentials
                .remove(service)
                .map(drop)
                .ok_or_else(|| CredVaultError::CredentialNotFound(service.to_string()))
        })
    }

    pub fn credential(&self, service: &str) -> Result<&Credential> {
        self.contents
            .credentials
            .get(service)
            .ok_or_else(|| CredVaultError::CredentialNotFound(service.to_string()))
    }

    /// Metadata for every credential, sorted by service name.
    pub fn list_credentials(&self) -> Vec<CredentialSummary> {
        self.contents
            .credentials
            .values()
            .map(CredentialSummary::from)
            .collect()
    }

    /// Record that `service` was read from `location`.
    pub fn record_usage(&mut self, service: &str, location: &Path) -> Result<()> {
        let key = usage::location_key(location);
        let git_repo = usage::find_git_repo(location).map(|p| p.display().to_string());
        let now = Utc::now();
        self.commit(None, service, |contents| {
            contents
                .credentials
                .get_mut(service)
                .ok_or_else(|| CredVaultError::CredentialNotFound(service.to_string()))?
                .record_usage(&key, git_repo, now);
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Backups
    // ------------------------------------------------------------------

    /// Copy the vault file to a new timestamped backup.
    pub fn create_backup(&mut self, kind: BackupKind) -> Result<BackupRef> {
        match self.backups.create(kind) {
            Ok(backup) => {
                let context = format!("{kind} {}", backup.path.display());
                self.audit(AuditEvent::Backup, Outcome::Success, Some(&context));
                Ok(backup)
            }
            Err(e) => {
                self.audit(AuditEvent::Backup, Outcome::Failure, Some(kind.as_str()));
                Err(e)
            }
        }
    }

    /// Backups of this vault, newest first.
    pub fn list_backups(&self) -> Result<Vec<BackupRef>> {
        self.backups.discover()
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &VaultHeader {
        &self.header
    }

    pub fn recovery_metadata(&self) -> &RecoveryMetadata {
        &self.header.recovery
    }

    /// Audit write problems seen so far; see `Auditor::take_warnings`.
    pub fn take_warnings(&mut self) -> Vec<String> {
        self.auditor.take_warnings()
    }

    pub(crate) fn absorb_warnings(&mut self, warnings: Vec<String>) {
        for warning in warnings {
            warn!(%warning, "carried over audit warning");
            self.auditor.push_warning(warning);
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn audit(&mut self, event: AuditEvent, outcome: Outcome, context: Option<&str>) {
        self.auditor.record(event, outcome, context);
    }

    /// Apply `change`, persist, and roll back memory if persisting fails.
    fn commit<F>(&mut self, event: Option<AuditEvent>, service: &str, change: F) -> Result<()>
    where
        F: FnOnce(&mut VaultContents) -> Result<()>,
    {
        let before = self.contents.clone();
        let result = change(&mut self.contents).and_then(|()| self.persist());
        if result.is_err() {
            self.contents = before;
        }

        if let Some(event) = event {
            let outcome = if result.is_ok() {
                Outcome::Success
            } else {
                Outcome::Failure
            };
            self.audit(event, outcome, Some(service));
        }
        result
    }

    /// New salt and current KDF params for the password slot, then persist.
    fn rewrap_password(&mut self, new_password: &str) -> Result<()> {
        let salt = generate_salt();
        let slot = password_slot(new_password, &salt, self.options.argon2, &self.data_key)?;
        let previous = std::mem::replace(&mut self.header.password_slot, slot);
        if let Err(e) = self.persist() {
            self.header.password_slot = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Back up the file on disk, then replace it with the current state.
    /// A failed backup aborts the write.
    fn persist(&mut self) -> Result<()> {
        if let Some(backup) = self.backups.create_automatic(self.options.auto_backup)? {
            debug!(backup = %backup.path.display(), "pre-write backup");
        }
        self.write()
    }

    fn write(&mut self) -> Result<()> {
        let plaintext = Zeroizing::new(self.contents.to_bytes()?);
        let bytes = format::encode(&mut self.header, &self.data_key, &plaintext)?;
        atomic::write_atomic(&self.path, &bytes)
    }
}

impl std::fmt::Debug for VaultSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSession")
            .field("path", &self.path)
            .field("credentials", &self.contents.credentials.len())
            .finish_non_exhaustive()
    }
}

/// Build a password slot wrapping `data_key`.
fn password_slot(
    password: &str,
    salt: &[u8],
    params: Argon2Params,
    data_key: &SecretKey,
) -> Result<KeySlot> {
    let kdf = KdfDescriptor::argon2id(params);
    let master = derive_key(password.as_bytes(), salt, &params)?;
    let kek = master.derive_subkey(PASSWORD_WRAP_INFO)?;
    let (nonce, wrapped_key) = wrap_key(&kek, PASSWORD_SLOT_AAD, data_key)?;
    Ok(KeySlot {
        kdf,
        salt: salt.to_vec(),
        nonce: nonce.to_vec(),
        wrapped_key,
    })
}

/// Key-encryption key for an existing password slot.
fn password_kek(password: &str, slot: &KeySlot) -> Result<SecretKey> {
    let master = derive_key(password.as_bytes(), &slot.salt, &slot.kdf.params)?;
    master.derive_subkey(PASSWORD_WRAP_INFO)
}

fn open_with_password(data: &[u8], password: &str) -> Result<(VaultHeader, VaultContents, SecretKey)> {
    let parsed = format::parse(data)?;
    let slot = &parsed.header.password_slot;
    let kek = password_kek(password, slot)?;
    let data_key = unwrap_key(&kek, PASSWORD_SLOT_AAD, &slot.nonce, &slot.wrapped_key)?;
    let (header, contents) = open_with_key(data, &data_key)?;
    Ok((header, contents, data_key))
}

fn open_with_key(data: &[u8], data_key: &SecretKey) -> Result<(VaultHeader, VaultContents)> {
    let parsed = format::parse(data)?;
    let plaintext = Zeroizing::new(parsed.decrypt(data_key)?);
    let contents = VaultContents::from_bytes(&plaintext)?;
    Ok((parsed.header, contents))
}
