//! Vault module — encrypted credential storage.
//!
//! This module provides:
//! - `Credential`, `UsageRecord` and `VaultContents` (`credential`)
//! - The `CVLT` file format with key slots and a bound header (`format`)
//! - Crash-safe temp-file + rename writes (`atomic`)
//! - The advisory single-writer lock (`lock`)
//! - `VaultSession`, the unlocked vault callers work through (`session`)

pub mod atomic;
pub mod credential;
pub mod format;
pub mod lock;
pub mod session;

// Re-export the most commonly used items.
pub use credential::{Credential, CredentialSummary, UsageRecord, VaultContents};
pub use format::{Integrity, RecoveryMetadata, VaultHeader};
pub use session::{SessionOptions, VaultSession};
