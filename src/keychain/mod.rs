//! OS keychain as an optional password source.
//!
//! The vault never depends on the keychain: it is only a cache in front
//! of the password prompt. With the `keyring-store` feature the OS
//! credential store is used:
//! - macOS: Keychain
//! - Windows: Credential Manager
//! - Linux: Secret Service (GNOME Keyring / KDE Wallet)
//!
//! Without the feature every lookup reports `Unavailable`.

use std::path::Path;

use zeroize::Zeroizing;

use crate::errors::Result;

/// Result of asking the keychain for a vault password.
pub enum KeychainLookup {
    Found(Zeroizing<String>),
    Unavailable,
}

/// A place that can remember the master password of one vault.
pub trait PasswordCache {
    /// Never fails: any problem is reported as `Unavailable`.
    fn retrieve(&self) -> KeychainLookup;
    fn store(&self, password: &str) -> Result<()>;
    /// Removing an entry that does not exist succeeds.
    fn forget(&self) -> Result<()>;
}

/// Keychain entry account name for a vault path.
fn entry_key(vault_path: &Path) -> String {
    let canonical = vault_path
        .canonicalize()
        .unwrap_or_else(|_| vault_path.to_path_buf());
    format!("vault:{}", canonical.display())
}

/// Cache for `vault_path`: the OS keychain when compiled in, otherwise
/// a cache that never has anything.
pub fn for_vault(vault_path: &Path) -> Box<dyn PasswordCache> {
    #[cfg(feature = "keyring-store")]
    {
        Box::new(OsKeychain::new(vault_path))
    }
    #[cfg(not(feature = "keyring-store"))]
    {
        Box::new(NoKeychain::new(vault_path))
    }
}

/// Stand-in used when the crate is built without keychain support.
pub struct NoKeychain {
    account: String,
}

impl NoKeychain {
    pub fn new(vault_path: &Path) -> Self {
        Self {
            account: entry_key(vault_path),
        }
    }
}

impl PasswordCache for NoKeychain {
    fn retrieve(&self) -> KeychainLookup {
        tracing::debug!(account = %self.account, "keychain support not compiled in");
        KeychainLookup::Unavailable
    }

    fn store(&self, _password: &str) -> Result<()> {
        Err(crate::errors::CredVaultError::KeychainError(
            "keychain support not compiled in; rebuild with --features keyring-store".into(),
        ))
    }

    fn forget(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(feature = "keyring-store")]
pub use os::OsKeychain;

#[cfg(feature = "keyring-store")]
mod os {
    use std::path::Path;

    use zeroize::Zeroizing;

    use super::{entry_key, KeychainLookup, PasswordCache};
    use crate::errors::{CredVaultError, Result};

    /// Service name used in the OS keyring.
    const SERVICE_NAME: &str = "credvault";

    pub struct OsKeychain {
        account: String,
    }

    impl OsKeychain {
        pub fn new(vault_path: &Path) -> Self {
            Self {
                account: entry_key(vault_path),
            }
        }

        fn entry(&self) -> Result<::keyring::Entry> {
            ::keyring::Entry::new(SERVICE_NAME, &self.account).map_err(|e| {
                CredVaultError::KeychainError(format!("failed to create keyring entry: {e}"))
            })
        }
    }

    impl PasswordCache for OsKeychain {
        fn retrieve(&self) -> KeychainLookup {
            let entry = match self.entry() {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!(error = %e, "keychain unavailable");
                    return KeychainLookup::Unavailable;
                }
            };
            match entry.get_password() {
                Ok(password) => KeychainLookup::Found(Zeroizing::new(password)),
                Err(::keyring::Error::NoEntry) => KeychainLookup::Unavailable,
                Err(e) => {
                    tracing::debug!(error = %e, "keychain read failed");
                    KeychainLookup::Unavailable
                }
            }
        }

        fn store(&self, password: &str) -> Result<()> {
            self.entry()?.set_password(password).map_err(|e| {
                CredVaultError::KeychainError(format!("failed to store password in keyring: {e}"))
            })
        }

        fn forget(&self) -> Result<()> {
            match self.entry()?.delete_credential() {
                Ok(()) | Err(::keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(CredVaultError::KeychainError(format!(
                    "failed to delete from keyring: {e}"
                ))),
            }
        }
    }
}
