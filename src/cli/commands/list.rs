//! `credvault list` — show credentials without their values.

use crate::cli::output::{self, OutputFormat};
use crate::cli::{open_session, print_warnings, Cli};
use crate::errors::Result;

/// Execute the `list` command.
pub fn execute(cli: &Cli, format: OutputFormat) -> Result<()> {
    let mut session = open_session(cli)?;
    let credentials = session.list_credentials();

    if format == OutputFormat::Table {
        output::info(&format!("{} credential(s)", credentials.len()));
    }
    output::print_credentials(&credentials, format)?;
    print_warnings(session.take_warnings());

    Ok(())
}
