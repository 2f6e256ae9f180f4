//! `credvault get` — print (or copy) one field of a credential.
//!
//! Each read is counted against the current directory in the
//! credential's usage records.

use zeroize::Zeroizing;

use crate::cli::output;
use crate::cli::{open_session, print_warnings, Cli};
use crate::errors::{CredVaultError, Result};

/// Execute the `get` command.
pub fn execute(cli: &Cli, service: &str, field: &str, copy: bool) -> Result<()> {
    let mut session = open_session(cli)?;

    let value = session
        .credential(service)?
        .field(field)
        .map(|v| Zeroizing::new(v.to_string()))
        .ok_or_else(|| {
            CredVaultError::CommandFailed(format!("credential '{service}' has no field '{field}'"))
        })?;

    let cwd = std::env::current_dir()?;
    if let Err(e) = session.record_usage(service, &cwd) {
        output::warning(&format!("usage was not recorded: {e}"));
    }
    print_warnings(session.take_warnings());

    if copy {
        let mut clipboard = arboard::Clipboard::new()
            .map_err(|e| CredVaultError::CommandFailed(format!("clipboard unavailable: {e}")))?;
        clipboard
            .set_text(value.as_str())
            .map_err(|e| CredVaultError::CommandFailed(format!("clipboard write failed: {e}")))?;
        output::success(&format!("Copied {service}.{field} to the clipboard"));
    } else {
        println!("{}", value.as_str());
    }

    Ok(())
}
