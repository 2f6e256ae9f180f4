//! `credvault backup` / `credvault backups` — create and list backups.
//!
//! Neither needs the password: backups are byte copies of the sealed
//! vault file.

use crate::audit::{AuditEvent, Auditor, Outcome};
use crate::backup::{BackupKind, BackupManager};
use crate::cli::output;
use crate::cli::{print_warnings, settings, vault_path, Cli};
use crate::errors::Result;

/// Execute the `backup` command.
pub fn execute_create(cli: &Cli) -> Result<()> {
    let settings = settings()?;
    let path = vault_path(cli, &settings)?;
    let mut auditor = Auditor::for_vault(&path);

    match BackupManager::new(&path).create(BackupKind::Manual) {
        Ok(backup) => {
            let context = format!("manual {}", backup.path.display());
            auditor.record(AuditEvent::Backup, Outcome::Success, Some(&context));
            print_warnings(auditor.take_warnings());
            output::success(&format!("Backup written to {}", backup.path.display()));
            Ok(())
        }
        Err(e) => {
            auditor.record(AuditEvent::Backup, Outcome::Failure, Some("manual"));
            print_warnings(auditor.take_warnings());
            Err(e)
        }
    }
}

/// Execute the `backups` command.
pub fn execute_list(cli: &Cli) -> Result<()> {
    let settings = settings()?;
    let path = vault_path(cli, &settings)?;

    let backups = BackupManager::new(&path).discover()?;
    output::print_backups_table(&backups);
    Ok(())
}
