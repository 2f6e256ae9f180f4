//! `credvault restore` — replace the vault with its newest backup.

use crate::audit::Auditor;
use crate::backup::{BackupManager, RestoreOptions, RestoreOutcome};
use crate::cli::output;
use crate::cli::{confirm, print_warnings, settings, vault_path, Cli};
use crate::errors::Result;

/// Execute the `restore` command.
pub fn execute(cli: &Cli, force: bool, dry_run: bool) -> Result<()> {
    let settings = settings()?;
    let path = vault_path(cli, &settings)?;
    let mut auditor = Auditor::for_vault(&path);

    let result = BackupManager::new(&path).restore(
        RestoreOptions { force, dry_run },
        &mut auditor,
        |backup| {
            confirm(&format!(
                "Replace {} with {}?",
                path.display(),
                backup.file_name()
            ))
        },
    );
    print_warnings(auditor.take_warnings());

    match result? {
        RestoreOutcome::DryRun(backup) => {
            output::info(&format!(
                "Would restore from {} ({}, {})",
                backup.path.display(),
                backup.kind,
                backup.modified.format("%Y-%m-%d %H:%M:%S")
            ));
        }
        RestoreOutcome::Cancelled(_) => output::info("Cancelled."),
        RestoreOutcome::Restored { from, snapshot } => {
            output::success(&format!("Vault restored from {}", from.path.display()));
            if let Some(snapshot) = snapshot {
                output::tip(&format!(
                    "The replaced vault was saved as {}",
                    snapshot.path.display()
                ));
            }
        }
    }

    Ok(())
}
