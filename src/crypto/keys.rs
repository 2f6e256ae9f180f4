//! Key material handling.
//!
//! - `SecretKey` holds 32 bytes of key material and wipes them on drop.
//! - HKDF-SHA256 splits a KDF output into purpose-bound sub-keys, so the
//!   key that wraps the data key is never the same bytes as the one
//!   that is fingerprinted.
//! - HMAC-SHA256 produces the one-way fingerprint stored for the
//!   recovery key; comparison is constant-time.
//! - AES-256-GCM key wrapping protects the random data key in each slot.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::encryption::{self, NONCE_LEN};
use crate::errors::{CredVaultError, Result};

/// Length of every key handled by the vault (256 bits).
pub const KEY_LEN: usize = 32;

/// HKDF info for the key that wraps the data key in the password slot.
pub const PASSWORD_WRAP_INFO: &[u8] = b"credvault-wrap:password";

/// HKDF info for the key that wraps the data key in the recovery slot.
pub const RECOVERY_WRAP_INFO: &[u8] = b"credvault-wrap:recovery";

/// HMAC message for the recovery-key fingerprint.
const FINGERPRINT_LABEL: &[u8] = b"credvault-recovery-fingerprint";

/// A 32-byte key that is zeroed when dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    bytes: [u8; KEY_LEN],
}

impl SecretKey {
    /// Create a key from raw bytes.
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    pub(crate) fn zeroed() -> Self {
        Self {
            bytes: [0u8; KEY_LEN],
        }
    }

    /// Draw a fresh random key (used for the vault data key).
    pub fn random() -> Self {
        let mut key = Self::zeroed();
        rand::rng().fill_bytes(&mut key.bytes);
        key
    }

    /// Access the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    pub(crate) fn as_mut_bytes(&mut self) -> &mut [u8; KEY_LEN] {
        &mut self.bytes
    }

    /// Derive a purpose-bound sub-key with HKDF-SHA256.
    ///
    /// The extract step is skipped on purpose: the input already came out
    /// of Argon2id and is uniformly random.
    pub fn derive_subkey(&self, info: &[u8]) -> Result<SecretKey> {
        let hk = Hkdf::<Sha256>::new(None, &self.bytes);
        let mut okm = SecretKey::zeroed();
        hk.expand(info, &mut okm.bytes)
            .map_err(|e| CredVaultError::KeyDerivationFailed(format!("HKDF expand failed: {e}")))?;
        Ok(okm)
    }

    /// Compute the base64 fingerprint of this key.
    pub fn fingerprint(&self) -> Result<String> {
        use base64::engine::general_purpose::STANDARD as BASE64;
        use base64::Engine;

        let mut mac = Hmac::<Sha256>::new_from_slice(&self.bytes)
            .map_err(|e| CredVaultError::KeyDerivationFailed(format!("HMAC init failed: {e}")))?;
        mac.update(FINGERPRINT_LABEL);
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }

    /// Check this key against a stored fingerprint in constant time.
    pub fn matches_fingerprint(&self, expected: &str) -> Result<bool> {
        let actual = self.fingerprint()?;
        Ok(actual.as_bytes().ct_eq(expected.as_bytes()).into())
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Wrap `key` under `kek`, binding `aad` (the slot label).
pub fn wrap_key(kek: &SecretKey, aad: &[u8], key: &SecretKey) -> Result<([u8; NONCE_LEN], Vec<u8>)> {
    encryption::seal(kek.as_bytes(), aad, key.as_bytes())
}

/// Unwrap a key produced by `wrap_key`.
///
/// Any mismatch in `kek`, `aad` or the stored bytes is an
/// `AuthenticationFailure`.
pub fn unwrap_key(kek: &SecretKey, aad: &[u8], nonce: &[u8], wrapped: &[u8]) -> Result<SecretKey> {
    let mut plain = encryption::open(kek.as_bytes(), nonce, aad, wrapped)?;
    if plain.len() != KEY_LEN {
        plain.zeroize();
        return Err(CredVaultError::AuthenticationFailure);
    }
    let mut key = SecretKey::zeroed();
    key.bytes.copy_from_slice(&plain);
    plain.zeroize();
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subkeys_differ_by_info() {
        let master = SecretKey::new([0x42; KEY_LEN]);
        let a = master.derive_subkey(PASSWORD_WRAP_INFO).unwrap();
        let b = master.derive_subkey(RECOVERY_WRAP_INFO).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), master.as_bytes());
    }

    #[test]
    fn fingerprint_is_deterministic_and_checked() {
        let key = SecretKey::new([9; KEY_LEN]);
        let fp = key.fingerprint().unwrap();
        assert_eq!(fp, key.fingerprint().unwrap());
        assert!(key.matches_fingerprint(&fp).unwrap());

        let other = SecretKey::new([10; KEY_LEN]);
        assert!(!other.matches_fingerprint(&fp).unwrap());
    }

    #[test]
    fn wrap_unwrap_roundtrip() {
        let kek = SecretKey::random();
        let dek = SecretKey::random();
        let (nonce, wrapped) = wrap_key(&kek, b"slot:password", &dek).unwrap();
        let back = unwrap_key(&kek, b"slot:password", &nonce, &wrapped).unwrap();
        assert_eq!(back.as_bytes(), dek.as_bytes());
    }

    #[test]
    fn unwrap_with_wrong_label_fails() {
        let kek = SecretKey::random();
        let dek = SecretKey::random();
        let (nonce, wrapped) = wrap_key(&kek, b"slot:password", &dek).unwrap();
        assert!(matches!(
            unwrap_key(&kek, b"slot:recovery", &nonce, &wrapped),
            Err(CredVaultError::AuthenticationFailure)
        ));
    }

    #[test]
    fn debug_does_not_print_key() {
        let key = SecretKey::new([0xAB; KEY_LEN]);
        let shown = format!("{key:?}");
        assert!(shown.contains("REDACTED"));
        assert!(!shown.contains("171"));
    }
}
