//! `credvault set` — set one field of an existing credential.

use zeroize::Zeroizing;

use crate::cli::output;
use crate::cli::{open_session, print_warnings, prompt_secret, Cli};
use crate::errors::Result;

/// Execute the `set` command.
pub fn execute(cli: &Cli, service: &str, field: &str, value: Option<&str>) -> Result<()> {
    let mut session = open_session(cli)?;

    // Argument, piped stdin, or hidden prompt.
    let value = match value {
        Some(v) => {
            output::warning("Value provided on command line; it may appear in shell history.");
            Zeroizing::new(v.to_string())
        }
        None => prompt_secret(&format!("Value for {service}.{field}"))?,
    };

    session.set_field(service, field, &value)?;
    print_warnings(session.take_warnings());
    output::success(&format!("Updated '{field}' of '{service}'"));

    Ok(())
}
