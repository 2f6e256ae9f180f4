//! Cryptographic primitives for CredVault.
//!
//! This module provides:
//! - AES-256-GCM sealing and opening with bound headers (`encryption`)
//! - Argon2id password and mnemonic key derivation (`kdf`)
//! - Zeroizing keys, HKDF sub-keys, fingerprints and key wrapping (`keys`)

pub mod encryption;
pub mod kdf;
pub mod keys;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{seal, open, derive_key, ...};
pub use encryption::{open, seal, seal_bound, Sealed, NONCE_LEN, TAG_LEN};
pub use kdf::{derive_key, generate_salt, Argon2Params, SALT_LEN};
pub use keys::{unwrap_key, wrap_key, SecretKey, KEY_LEN};
