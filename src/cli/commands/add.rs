//! `credvault add` — add a new credential.

use std::collections::BTreeMap;

use crate::cli::output;
use crate::cli::{open_session, print_warnings, prompt_secret, Cli};
use crate::errors::Result;

/// Execute the `add` command.
pub fn execute(cli: &Cli, service: &str, username: Option<&str>, notes: Option<&str>) -> Result<()> {
    let mut session = open_session(cli)?;

    let password = prompt_secret(&format!("Password for '{service}'"))?;

    let mut fields = BTreeMap::new();
    fields.insert("password".to_string(), password.to_string());
    if let Some(username) = username {
        fields.insert("username".to_string(), username.to_string());
    }
    if let Some(notes) = notes {
        fields.insert("notes".to_string(), notes.to_string());
    }

    session.add_credential(service, fields)?;
    print_warnings(session.take_warnings());
    output::success(&format!("Added credential '{service}'"));

    Ok(())
}
