//! Password-based key derivation using Argon2id.
//!
//! The same function turns both the master password and the recovery
//! mnemonic (entropy plus optional passphrase) into a 256-bit key. The
//! parameters travel in the vault header next to each key slot, so the
//! cost can be raised later without breaking existing vaults.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::keys::{SecretKey, KEY_LEN};
use crate::errors::{CredVaultError, Result};

/// Length of the salt in bytes (256 bits).
pub const SALT_LEN: usize = 32;

/// Identifier written to the header for the only algorithm we support.
pub const ALGORITHM_ID: &str = "argon2id-v19";

/// Minimum safe memory cost in KiB (8 MB).
pub const MIN_MEMORY_KIB: u32 = 8_192;

/// Upper bound accepted when reading a header (4 GiB).
pub const MAX_MEMORY_KIB: u32 = 4 * 1024 * 1024;

/// Upper bound for iterations and lanes accepted from a header.
const MAX_ITERATIONS: u32 = 64;
const MAX_PARALLELISM: u32 = 64;

/// Configurable Argon2id parameters.
///
/// These map 1:1 to the fields in `Settings` and to the `kdf` object
/// stored with every key slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argon2Params {
    /// Memory cost in KiB (default: 65 536 = 64 MB).
    pub memory_kib: u32,
    /// Number of iterations (default: 3).
    pub iterations: u32,
    /// Parallelism lanes (default: 4).
    pub parallelism: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            memory_kib: 65_536,
            iterations: 3,
            parallelism: 4,
        }
    }
}

impl Argon2Params {
    /// Check the parameters against the accepted range.
    ///
    /// Used both before deriving and when classifying a header as
    /// well-formed without the password.
    pub fn validate(&self) -> Result<()> {
        if self.memory_kib < MIN_MEMORY_KIB || self.memory_kib > MAX_MEMORY_KIB {
            return Err(CredVaultError::KeyDerivationFailed(format!(
                "Argon2 memory_kib must be between {MIN_MEMORY_KIB} and {MAX_MEMORY_KIB} (got {})",
                self.memory_kib
            )));
        }
        if self.iterations < 1 || self.iterations > MAX_ITERATIONS {
            return Err(CredVaultError::KeyDerivationFailed(format!(
                "Argon2 iterations must be between 1 and {MAX_ITERATIONS} (got {})",
                self.iterations
            )));
        }
        if self.parallelism < 1 || self.parallelism > MAX_PARALLELISM {
            return Err(CredVaultError::KeyDerivationFailed(format!(
                "Argon2 parallelism must be between 1 and {MAX_PARALLELISM} (got {})",
                self.parallelism
            )));
        }
        Ok(())
    }
}

/// Derive a 32-byte key from `secret` and `salt` with explicit parameters.
///
/// The same secret + salt + params always produce the same key.
pub fn derive_key(secret: &[u8], salt: &[u8], argon2_params: &Argon2Params) -> Result<SecretKey> {
    argon2_params.validate()?;

    let params = Params::new(
        argon2_params.memory_kib,
        argon2_params.iterations,
        argon2_params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| CredVaultError::KeyDerivationFailed(format!("invalid Argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = SecretKey::zeroed();
    argon2
        .hash_password_into(secret, salt, key.as_mut_bytes())
        .map_err(|e| {
            CredVaultError::KeyDerivationFailed(format!("Argon2id hashing failed: {e}"))
        })?;

    Ok(key)
}

/// Generate a cryptographically random 32-byte salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light() -> Argon2Params {
        Argon2Params {
            memory_kib: MIN_MEMORY_KIB,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn rejects_memory_below_floor() {
        let params = Argon2Params {
            memory_kib: 1024,
            ..light()
        };
        assert!(derive_key(b"pw", &[0u8; SALT_LEN], &params).is_err());
    }

    #[test]
    fn rejects_zero_iterations_and_lanes() {
        assert!(Argon2Params {
            iterations: 0,
            ..light()
        }
        .validate()
        .is_err());
        assert!(Argon2Params {
            parallelism: 0,
            ..light()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn rejects_absurd_header_values() {
        assert!(Argon2Params {
            memory_kib: u32::MAX,
            ..light()
        }
        .validate()
        .is_err());
        assert!(Argon2Params {
            iterations: 10_000,
            ..light()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn salts_are_random() {
        assert_ne!(generate_salt(), generate_salt());
    }

    #[test]
    fn different_salt_gives_different_key() {
        let a = derive_key(b"pw", &[1u8; SALT_LEN], &light()).unwrap();
        let b = derive_key(b"pw", &[2u8; SALT_LEN], &light()).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }
}
