//! `credvault delete` — remove a credential and its usage history.

use crate::cli::output;
use crate::cli::{confirm, open_session, print_warnings, Cli};
use crate::errors::Result;

/// Execute the `delete` command.
pub fn execute(cli: &Cli, service: &str, force: bool) -> Result<()> {
    // Unless --force is set, ask for confirmation before deleting.
    if !force && !confirm(&format!("Delete credential '{service}'?"))? {
        output::info("Cancelled.");
        return Ok(());
    }

    let mut session = open_session(cli)?;
    session.remove_credential(service)?;
    print_warnings(session.take_warnings());
    output::success(&format!("Deleted credential '{service}'"));

    Ok(())
}
