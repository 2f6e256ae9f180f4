//! `credvault change-password` — replace the master password.
//!
//! The recovery phrase keeps working afterwards. The data key is not
//! replaced, so backups taken before the change still open with the old
//! password.

use crate::cli::output;
use crate::cli::{
    print_warnings, prompt_new_password, prompt_password_for_vault, settings, vault_path, Cli,
    NEW_PASSWORD_ENV,
};
use crate::errors::Result;
use crate::keychain;
use crate::vault::VaultSession;

/// Execute the `change-password` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let settings = settings()?;
    let path = vault_path(cli, &settings)?;

    // The current password is typed (or taken from the env), never from
    // the keychain.
    let old_password = prompt_password_for_vault(None)?;
    let mut session = VaultSession::unlock(&path, &old_password, &settings.session_options())?;

    output::info("Choose the new master password.");
    let new_password = prompt_new_password(NEW_PASSWORD_ENV)?;

    session.change_password(&old_password, &new_password)?;
    print_warnings(session.take_warnings());

    if let Err(e) = keychain::for_vault(&path).forget() {
        output::warning(&format!("could not clear the cached password: {e}"));
    }

    output::success("Master password changed.");
    output::warning(
        "Older backups still open with the old password. If it leaked, delete them \
         (see `credvault backups`).",
    );
    output::tip("Run `credvault auth keyring` to cache the new password.");

    Ok(())
}
