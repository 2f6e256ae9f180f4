//! Audit log — append-only SQLite record of security-relevant operations.
//!
//! Entries live in `<vault_dir>/audit.db`. The core only ever inserts;
//! nothing here updates or deletes a row. Timestamps are clamped so they
//! never go backwards relative to the previous entry, keeping the log
//! ordered by time even if the wall clock steps back.
//!
//! Writing is best-effort: `Auditor::record` never fails the operation it
//! describes. A write failure is logged and kept as a warning the caller
//! can surface.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::warn;

use crate::errors::{CredVaultError, Result};

/// File name of the audit database inside the vault directory.
const DB_FILE: &str = "audit.db";

/// Kinds of operations that are recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEvent {
    Initialize,
    Unlock,
    ChangePassword,
    RecoveryBegin,
    RecoveryVerify,
    RecoveryComplete,
    Backup,
    Restore,
    CredentialAdd,
    CredentialUpdate,
    CredentialDelete,
}

impl AuditEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Unlock => "unlock",
            Self::ChangePassword => "change-password",
            Self::RecoveryBegin => "recovery-begin",
            Self::RecoveryVerify => "recovery-verify",
            Self::RecoveryComplete => "recovery-complete",
            Self::Backup => "backup",
            Self::Restore => "restore",
            Self::CredentialAdd => "credential-add",
            Self::CredentialUpdate => "credential-update",
            Self::CredentialDelete => "credential-delete",
        }
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an operation ended. Cancellation is not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    Cancelled,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single audit log entry as read back from the database.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event: String,
    pub outcome: String,
    pub context: Option<String>,
}

/// SQLite-backed audit log.
pub struct AuditLog {
    conn: Connection,
}

impl AuditLog {
    /// Open (or create) the audit database at `<vault_dir>/audit.db`.
    pub fn open(vault_dir: &Path) -> Result<Self> {
        let db_path = Self::db_path(vault_dir);
        let conn = Connection::open(&db_path)
            .map_err(|e| CredVaultError::AuditError(format!("open {}: {e}", db_path.display())))?;

        // Set restrictive permissions on the audit database (owner-only).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&db_path, perms);
        }

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS audit_log (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp   TEXT NOT NULL,
                event       TEXT NOT NULL,
                outcome     TEXT NOT NULL,
                context     TEXT
            );",
        )
        .map_err(|e| CredVaultError::AuditError(format!("create table: {e}")))?;

        Ok(Self { conn })
    }

    /// Append one entry. Returns the timestamp actually recorded.
    pub fn append(
        &self,
        event: AuditEvent,
        outcome: Outcome,
        context: Option<&str>,
    ) -> Result<DateTime<Utc>> {
        let last: Option<String> = self
            .conn
            .query_row(
                "SELECT timestamp FROM audit_log ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| CredVaultError::AuditError(format!("read last entry: {e}")))?;

        let mut timestamp = Utc::now();
        if let Some(prev) = last.as_deref().and_then(parse_timestamp) {
            if prev > timestamp {
                timestamp = prev;
            }
        }

        self.conn
            .execute(
                "INSERT INTO audit_log (timestamp, event, outcome, context)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    format_timestamp(timestamp),
                    event.as_str(),
                    outcome.as_str(),
                    context
                ],
            )
            .map_err(|e| CredVaultError::AuditError(format!("insert: {e}")))?;

        Ok(timestamp)
    }

    /// Query recent audit entries.
    ///
    /// - `limit`: maximum number of entries to return (most recent first).
    /// - `since`: if provided, only return entries at or after this time.
    pub fn query(&self, limit: usize, since: Option<DateTime<Utc>>) -> Result<Vec<AuditEntry>> {
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let since_str = since.map_or_else(String::new, format_timestamp);

        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, timestamp, event, outcome, context
                 FROM audit_log
                 WHERE timestamp >= ?1
                 ORDER BY id DESC
                 LIMIT ?2",
            )
            .map_err(|e| CredVaultError::AuditError(format!("query prepare: {e}")))?;

        let rows = stmt
            .query_map(rusqlite::params![since_str, limit_i64], |row| {
                let ts_str: String = row.get(1)?;
                Ok(AuditEntry {
                    id: row.get(0)?,
                    timestamp: parse_timestamp(&ts_str).unwrap_or(DateTime::UNIX_EPOCH),
                    event: row.get(2)?,
                    outcome: row.get(3)?,
                    context: row.get(4)?,
                })
            })
            .map_err(|e| CredVaultError::AuditError(format!("query exec: {e}")))?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(|e| CredVaultError::AuditError(format!("row parse: {e}")))?);
        }

        Ok(entries)
    }

    /// Return the path to the audit database.
    pub fn db_path(vault_dir: &Path) -> PathBuf {
        vault_dir.join(DB_FILE)
    }
}

/// Fixed-width RFC 3339 so that text order equals time order.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Best-effort audit writer used by the vault, recovery and restore flows.
///
/// Opens the database per entry, like a log file append, and keeps any
/// failure as a warning instead of returning it.
#[derive(Debug)]
pub struct Auditor {
    vault_dir: PathBuf,
    warnings: Vec<String>,
}

impl Auditor {
    pub fn new(vault_dir: &Path) -> Self {
        Self {
            vault_dir: vault_dir.to_path_buf(),
            warnings: Vec::new(),
        }
    }

    /// Auditor for the directory that holds `vault_path`.
    pub fn for_vault(vault_path: &Path) -> Self {
        Self::new(vault_path.parent().unwrap_or(Path::new(".")))
    }

    /// Record an event. Never fails; see `take_warnings`.
    pub fn record(&mut self, event: AuditEvent, outcome: Outcome, context: Option<&str>) {
        let result =
            AuditLog::open(&self.vault_dir).and_then(|log| log.append(event, outcome, context));
        if let Err(e) = result {
            warn!(%event, %outcome, error = %e, "audit write failed");
            self.warnings
                .push(format!("audit entry for '{event}' was not written: {e}"));
        }
    }

    pub(crate) fn push_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Drain warnings collected since the last call.
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }
}
