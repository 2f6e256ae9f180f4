//! Binary vault file format.
//!
//! A `.vault` file has this layout:
//!
//! ```text
//! [CVLT: 4 bytes][version: 1 byte][header_len: 4 bytes LE][header JSON][ciphertext + 16-byte GCM tag]
//! ```
//!
//! - **Magic** (`CVLT`): identifies the file as a CredVault vault.
//! - **Version**: format version (currently `1`).
//! - **Header length**: little-endian u32 telling us where the header
//!   JSON ends and the ciphertext begins.
//! - **Header JSON**: serialized `VaultHeader` — key slots with their
//!   KDF parameters and salts, recovery metadata, and the content nonce.
//! - **Ciphertext**: AES-256-GCM over the serialized `VaultContents`.
//!
//! The header is readable without the password (recovery needs it to
//! decide whether to ask for a passphrase) but it is not malleable: the
//! whole prefix + header region is the AAD of the content ciphertext.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::kdf::ALGORITHM_ID;
use crate::crypto::{open, seal_bound, Argon2Params, SecretKey, KEY_LEN, NONCE_LEN, SALT_LEN, TAG_LEN};
use crate::errors::{CredVaultError, Result};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic bytes at the start of every vault file.
const MAGIC: &[u8; 4] = b"CVLT";

/// Current binary format version.
pub const CURRENT_VERSION: u8 = 1;

/// Fixed-size prefix: 4 (magic) + 1 (version) + 4 (header_len).
const PREFIX_LEN: usize = 9;

/// Refuse headers larger than this before trying to parse them.
const MAX_HEADER_LEN: usize = 1024 * 1024;

/// Number of words in a recovery mnemonic.
pub const TOTAL_RECOVERY_WORDS: u8 = 24;

/// Default number of words asked during a recovery challenge.
pub const DEFAULT_CHALLENGE_WORDS: u8 = 6;

/// AAD label for the password key slot.
pub const PASSWORD_SLOT_AAD: &[u8] = b"credvault-slot:password";

/// AAD label for the recovery key slot.
pub const RECOVERY_SLOT_AAD: &[u8] = b"credvault-slot:recovery";

// ---------------------------------------------------------------------------
// Header types
// ---------------------------------------------------------------------------

/// KDF description stored with each key slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfDescriptor {
    /// Algorithm identifier, always `argon2id-v19` today.
    #[serde(with = "algorithm_id")]
    pub algorithm: Algorithm,
    #[serde(flatten)]
    pub params: Argon2Params,
}

/// Supported KDF algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Argon2id,
}

impl KdfDescriptor {
    pub fn argon2id(params: Argon2Params) -> Self {
        Self {
            algorithm: Algorithm::Argon2id,
            params,
        }
    }
}

/// A copy of the data key wrapped under one derived key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeySlot {
    pub kdf: KdfDescriptor,

    /// Salt for the slot's Argon2id derivation (base64 in JSON).
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub salt: Vec<u8>,

    /// Nonce used to wrap the data key (base64 in JSON).
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub nonce: Vec<u8>,

    /// Wrapped data key plus GCM tag (base64 in JSON).
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub wrapped_key: Vec<u8>,
}

/// Everything recovery needs to know before a recovery key exists.
///
/// Neither the mnemonic nor the recovery key is ever stored; only the
/// fingerprint of the key and a slot wrapping the data key under it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryMetadata {
    pub recovery_enabled: bool,
    pub passphrase_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_key_fingerprint: Option<String>,
    pub challenge_word_count: u8,
    pub total_word_count: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<KeySlot>,
}

impl RecoveryMetadata {
    /// Metadata for a vault created without recovery.
    pub fn disabled() -> Self {
        Self {
            recovery_enabled: false,
            passphrase_required: false,
            recovery_key_fingerprint: None,
            challenge_word_count: DEFAULT_CHALLENGE_WORDS,
            total_word_count: TOTAL_RECOVERY_WORDS,
            slot: None,
        }
    }
}

/// Metadata stored at the beginning of a vault file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultHeader {
    /// Format version.
    pub version: u8,

    /// When this vault was first created.
    pub created_at: DateTime<Utc>,

    /// Data key wrapped under the master-password key.
    pub password_slot: KeySlot,

    /// Recovery parameters and the recovery key slot.
    pub recovery: RecoveryMetadata,

    /// Nonce of the content ciphertext, fresh on every write (base64).
    #[serde(
        default,
        serialize_with = "base64_encode",
        deserialize_with = "base64_decode"
    )]
    pub nonce: Vec<u8>,
}

impl VaultHeader {
    /// Structural checks that do not need any key.
    pub fn validate(&self) -> Result<()> {
        if self.version != CURRENT_VERSION {
            return Err(integrity(format!(
                "unsupported version {}, expected {CURRENT_VERSION}",
                self.version
            )));
        }
        validate_slot("password slot", &self.password_slot)?;

        let recovery = &self.recovery;
        if recovery.total_word_count != TOTAL_RECOVERY_WORDS {
            return Err(integrity(format!(
                "recovery word count {} is not {TOTAL_RECOVERY_WORDS}",
                recovery.total_word_count
            )));
        }
        if recovery.challenge_word_count == 0
            || recovery.challenge_word_count > recovery.total_word_count
        {
            return Err(integrity(format!(
                "challenge word count {} out of range",
                recovery.challenge_word_count
            )));
        }
        if recovery.recovery_enabled {
            let slot = recovery
                .slot
                .as_ref()
                .ok_or_else(|| integrity("recovery enabled but no recovery slot"))?;
            validate_slot("recovery slot", slot)?;
            if recovery.recovery_key_fingerprint.is_none() {
                return Err(integrity("recovery enabled but no key fingerprint"));
            }
        }

        if self.nonce.len() != NONCE_LEN {
            return Err(integrity("content nonce has the wrong length"));
        }
        Ok(())
    }
}

fn validate_slot(name: &str, slot: &KeySlot) -> Result<()> {
    slot.kdf
        .params
        .validate()
        .map_err(|e| integrity(format!("{name}: {e}")))?;
    if slot.salt.len() != SALT_LEN {
        return Err(integrity(format!("{name}: salt has the wrong length")));
    }
    if slot.nonce.len() != NONCE_LEN {
        return Err(integrity(format!("{name}: nonce has the wrong length")));
    }
    if slot.wrapped_key.len() != KEY_LEN + TAG_LEN {
        return Err(integrity(format!("{name}: wrapped key has the wrong length")));
    }
    Ok(())
}

fn integrity(reason: impl Into<String>) -> CredVaultError {
    CredVaultError::IntegrityFailure(reason.into())
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Seal `plaintext` under `data_key` and lay out the complete file bytes.
///
/// A fresh nonce is drawn for every call and written into `header`
/// before the header is serialized and bound as AAD.
pub fn encode(header: &mut VaultHeader, data_key: &SecretKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let sealed = seal_bound(data_key.as_bytes(), plaintext, |nonce| {
        header.nonce = nonce.to_vec();
        encode_header_region(header)
    })?;

    let mut buf = sealed.aad;
    buf.extend_from_slice(&sealed.ciphertext);
    Ok(buf)
}

fn encode_header_region(header: &VaultHeader) -> Result<Vec<u8>> {
    let header_bytes = serde_json::to_vec(header)
        .map_err(|e| CredVaultError::SerializationError(format!("header: {e}")))?;
    let header_len = u32::try_from(header_bytes.len()).map_err(|_| {
        CredVaultError::SerializationError(format!(
            "header length {} exceeds u32::MAX",
            header_bytes.len()
        ))
    })?;

    let mut buf = Vec::with_capacity(PREFIX_LEN + header_bytes.len());
    buf.extend_from_slice(MAGIC); // 4 bytes
    buf.push(CURRENT_VERSION); // 1 byte
    buf.extend_from_slice(&header_len.to_le_bytes()); // 4 bytes LE
    buf.extend_from_slice(&header_bytes); // header JSON
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// A vault file split into its parts, borrowing the raw bytes.
///
/// `header_region` is the exact prefix + header JSON from disk, which is
/// what the ciphertext was bound to.
pub struct ParsedVault<'a> {
    pub header: VaultHeader,
    pub header_region: &'a [u8],
    pub ciphertext: &'a [u8],
}

impl ParsedVault<'_> {
    /// Decrypt the content ciphertext with the unwrapped data key.
    pub fn decrypt(&self, data_key: &SecretKey) -> Result<Vec<u8>> {
        open(
            data_key.as_bytes(),
            &self.header.nonce,
            self.header_region,
            self.ciphertext,
        )
    }
}

/// Parse and structurally validate vault bytes without any key.
///
/// Every failure here is an `IntegrityFailure`: decryption is never
/// attempted on a file whose header does not parse.
pub fn parse(data: &[u8]) -> Result<ParsedVault<'_>> {
    if data.len() < PREFIX_LEN + TAG_LEN {
        return Err(integrity("file too small to be a valid vault"));
    }

    if &data[0..4] != MAGIC {
        return Err(integrity("missing CVLT magic bytes"));
    }

    let version = data[4];
    if version != CURRENT_VERSION {
        return Err(integrity(format!(
            "unsupported version {version}, expected {CURRENT_VERSION}"
        )));
    }

    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&data[5..9]);
    let header_len = usize::try_from(u32::from_le_bytes(len_bytes))
        .map_err(|_| integrity("header length exceeds platform address space"))?;
    if header_len > MAX_HEADER_LEN {
        return Err(integrity(format!("header length {header_len} is implausible")));
    }

    let header_end = PREFIX_LEN + header_len;
    if header_end + TAG_LEN > data.len() {
        return Err(integrity("header length exceeds file size"));
    }

    let header: VaultHeader = serde_json::from_slice(&data[PREFIX_LEN..header_end])
        .map_err(|e| integrity(format!("header JSON: {e}")))?;
    if header.version != version {
        return Err(integrity("header version disagrees with file prefix"));
    }
    header.validate()?;

    Ok(ParsedVault {
        header,
        header_region: &data[..header_end],
        ciphertext: &data[header_end..],
    })
}

/// Read a vault file and return only its validated header.
pub fn read_header(path: &Path) -> Result<VaultHeader> {
    let data = read_file(path)?;
    Ok(parse(&data)?.header)
}

/// Read a vault file, mapping a missing file to `VaultNotFound`.
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    match fs::read(path) {
        Ok(data) => Ok(data),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(CredVaultError::VaultNotFound(path.to_path_buf()))
        }
        Err(e) => Err(CredVaultError::from_io(e, path)),
    }
}

/// Result of a password-free integrity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Integrity {
    Valid,
    Corrupted(String),
}

/// Check that the file at `path` has a well-formed header.
pub fn check_file(path: &Path) -> Integrity {
    let data = match fs::read(path) {
        Ok(d) => d,
        Err(e) => return Integrity::Corrupted(format!("unreadable: {e}")),
    };
    match parse(&data) {
        Ok(_) => Integrity::Valid,
        Err(CredVaultError::IntegrityFailure(reason)) => Integrity::Corrupted(reason),
        Err(e) => Integrity::Corrupted(e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

pub(crate) fn base64_encode<S>(data: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let encoded = BASE64.encode(data);
    serializer.serialize_str(&encoded)
}

pub(crate) fn base64_decode<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    BASE64.decode(&s).map_err(serde::de::Error::custom)
}

mod algorithm_id {
    use super::{Algorithm, ALGORITHM_ID};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(_: &Algorithm, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(ALGORITHM_ID)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Algorithm, D::Error> {
        let id = String::deserialize(d)?;
        if id == ALGORITHM_ID {
            Ok(Algorithm::Argon2id)
        } else {
            Err(serde::de::Error::custom(format!("unknown KDF algorithm '{id}'")))
        }
    }
}
