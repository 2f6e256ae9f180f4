//! AES-256-GCM authenticated encryption with associated data.
//!
//! Every seal draws a fresh random 96-bit nonce from the OS RNG; there is
//! no counter that could reset and repeat a nonce under the same key.
//!
//! `seal_bound` hands the freshly drawn nonce to the caller before
//! encrypting so that the caller can place it inside the header that is
//! bound as additional authenticated data. Any change to the header, the
//! nonce, the ciphertext or the tag makes `open` fail with the single
//! opaque `AuthenticationFailure`.

use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};

use crate::errors::{CredVaultError, Result};

/// Size of the AES-256-GCM nonce in bytes.
pub const NONCE_LEN: usize = 12;

/// Size of the GCM authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// Output of a bound seal: the nonce, the exact AAD bytes that were
/// authenticated, and the ciphertext with its trailing tag.
pub struct Sealed {
    pub nonce: [u8; NONCE_LEN],
    pub aad: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// Draw a fresh random nonce.
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let mut out = [0u8; NONCE_LEN];
    out.copy_from_slice(&nonce);
    out
}

/// Encrypt `plaintext` under `key`, authenticating `aad` alongside it.
///
/// Returns the nonce that was used and the ciphertext (tag included).
pub fn seal(key: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<([u8; NONCE_LEN], Vec<u8>)> {
    let sealed = seal_bound(key, plaintext, |_| Ok(aad.to_vec()))?;
    Ok((sealed.nonce, sealed.ciphertext))
}

/// Encrypt `plaintext`, letting `bind` build the AAD from the new nonce.
pub fn seal_bound<F>(key: &[u8], plaintext: &[u8], bind: F) -> Result<Sealed>
where
    F: FnOnce(&[u8; NONCE_LEN]) -> Result<Vec<u8>>,
{
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CredVaultError::EncryptionFailed(format!("invalid key length: {e}")))?;

    let nonce = generate_nonce();
    let aad = bind(&nonce)?;

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|e| CredVaultError::EncryptionFailed(format!("encryption error: {e}")))?;

    Ok(Sealed {
        nonce,
        aad,
        ciphertext,
    })
}

/// Decrypt and verify data produced by `seal` or `seal_bound`.
///
/// Fails closed: a bad key, nonce, AAD, ciphertext or tag all yield
/// `AuthenticationFailure` and no plaintext.
pub fn open(key: &[u8], nonce: &[u8], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if nonce.len() != NONCE_LEN || ciphertext.len() < TAG_LEN {
        return Err(CredVaultError::AuthenticationFailure);
    }

    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|_| CredVaultError::AuthenticationFailure)?;

    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CredVaultError::AuthenticationFailure)
}
