use std::path::PathBuf;
use thiserror::Error;

/// All errors that can occur in CredVault.
#[derive(Debug, Error)]
pub enum CredVaultError {
    // --- Crypto errors ---
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Authentication failed — wrong password or corrupted data")]
    AuthenticationFailure,

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    // --- Vault errors ---
    #[error("Vault not found at {0}")]
    VaultNotFound(PathBuf),

    #[error("Vault already exists at {0}")]
    VaultAlreadyExists(PathBuf),

    #[error("Integrity check failed: {0}")]
    IntegrityFailure(String),

    #[error("Credential '{0}' not found")]
    CredentialNotFound(String),

    #[error("Credential '{0}' already exists (use `set` to update a field)")]
    CredentialAlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("Vault at {0} is already open in another session")]
    ConcurrentAccessConflict(PathBuf),

    // --- Recovery errors ---
    #[error("Recovery is not enabled for this vault")]
    RecoveryNotEnabled,

    #[error("Recovery failed")]
    RecoveryChallengeFailed,

    #[error("'{0}' is not a valid recovery word")]
    InvalidRecoveryWord(String),

    // --- Backup errors ---
    #[error("No backups available")]
    NoBackupsAvailable,

    #[error(
        "Newest backup {} is corrupted ({reason}); valid alternatives: {}",
        path.display(),
        display_paths(alternatives)
    )]
    BackupCorrupted {
        path: PathBuf,
        reason: String,
        alternatives: Vec<PathBuf>,
    },

    // --- Keychain errors ---
    #[error("Keychain error: {0}")]
    KeychainError(String),

    // --- Config errors ---
    #[error("Config file error: {0}")]
    ConfigError(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // --- Audit errors ---
    #[error("Audit error: {0}")]
    AuditError(String),

    // --- CLI errors ---
    #[error("Command failed: {0}")]
    CommandFailed(String),
}

impl CredVaultError {
    /// Map an IO error on `path`, keeping permission problems distinct.
    pub fn from_io(err: std::io::Error, path: &std::path::Path) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            Self::PermissionDenied(path.to_path_buf())
        } else {
            Self::Io(err)
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "none".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convenience type alias for CredVault results.
pub type Result<T> = std::result::Result<T, CredVaultError>;
