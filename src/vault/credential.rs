//! Credential, UsageRecord and VaultContents — the encrypted payload.
//!
//! `VaultContents` only ever exists in plaintext inside an unlocked
//! session; it is serialized to JSON, sealed, and written as a whole.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::errors::{CredVaultError, Result};

/// Maximum length of a service or field name.
const MAX_NAME_LEN: usize = 256;

/// Where and how often a credential was used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_repo: Option<String>,
    pub last_access: DateTime<Utc>,
    pub count: u64,
}

impl UsageRecord {
    fn new(location: &str, git_repo: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            location: location.to_string(),
            git_repo,
            last_access: now,
            count: 1,
        }
    }

    /// Count one more access. `last_access` never moves backwards.
    fn touch(&mut self, git_repo: Option<String>, now: DateTime<Utc>) {
        self.count = self.count.saturating_add(1);
        if now > self.last_access {
            self.last_access = now;
        }
        if git_repo.is_some() {
            self.git_repo = git_repo;
        }
    }
}

/// One named credential with its secret fields and usage history.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
    pub service: String,
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub usage: BTreeMap<String, UsageRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(service: &str, fields: BTreeMap<String, String>) -> Self {
        let now = Utc::now();
        Self {
            service: service.to_string(),
            fields,
            usage: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Value of a field, if present.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Insert or replace a field, wiping the previous value.
    pub fn set_field(&mut self, name: &str, value: &str) {
        if let Some(mut old) = self.fields.insert(name.to_string(), value.to_string()) {
            old.zeroize();
        }
        self.updated_at = Utc::now();
    }

    /// Record an access from `location`.
    pub fn record_usage(&mut self, location: &str, git_repo: Option<String>, now: DateTime<Utc>) {
        match self.usage.get_mut(location) {
            Some(record) => record.touch(git_repo, now),
            None => {
                self.usage
                    .insert(location.to_string(), UsageRecord::new(location, git_repo, now));
            }
        }
    }

    /// Total accesses across every location.
    pub fn total_uses(&self) -> u64 {
        self.usage.values().map(|u| u.count).sum()
    }

    /// Most recent access across every location.
    pub fn last_used(&self) -> Option<DateTime<Utc>> {
        self.usage.values().map(|u| u.last_access).max()
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        for value in self.fields.values_mut() {
            value.zeroize();
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("service", &self.service)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("usage", &self.usage.len())
            .finish()
    }
}

/// Lightweight metadata about a credential (no field values).
///
/// Returned by `VaultSession::list_credentials` so callers can render a
/// listing without touching secret values.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialSummary {
    pub service: String,
    pub field_names: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total_uses: u64,
    pub last_used: Option<DateTime<Utc>>,
}

impl From<&Credential> for CredentialSummary {
    fn from(c: &Credential) -> Self {
        Self {
            service: c.service.clone(),
            field_names: c.fields.keys().cloned().collect(),
            created_at: c.created_at,
            updated_at: c.updated_at,
            total_uses: c.total_uses(),
            last_used: c.last_used(),
        }
    }
}

/// The plaintext payload sealed inside a vault file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultContents {
    #[serde(default)]
    pub credentials: BTreeMap<String, Credential>,
}

impl VaultContents {
    /// Serialize for sealing. The caller must wipe the returned buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| CredVaultError::SerializationError(format!("vault contents: {e}")))
    }

    /// Parse decrypted bytes. A parse failure after successful
    /// authentication means the vault was written by something else.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| CredVaultError::IntegrityFailure(format!("vault contents: {e}")))
    }
}

/// Validate a service or field name.
///
/// Must be non-empty, at most 256 characters, and free of control
/// characters.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(CredVaultError::CommandFailed(format!(
            "{kind} name cannot be empty"
        )));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(CredVaultError::CommandFailed(format!(
            "{kind} name cannot exceed {MAX_NAME_LEN} characters"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(CredVaultError::CommandFailed(format!(
            "{kind} name contains control characters"
        )));
    }
    Ok(())
}
