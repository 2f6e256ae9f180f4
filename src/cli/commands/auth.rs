//! `credvault auth keyring` — cache the master password in the OS keychain.

use crate::cli::output;
use crate::cli::{prompt_password_for_vault, settings, vault_path, Cli};
use crate::errors::Result;
use crate::keychain;
use crate::vault::VaultSession;

/// Execute `credvault auth keyring [--delete]`.
pub fn execute_keyring(cli: &Cli, delete: bool) -> Result<()> {
    let settings = settings()?;
    let path = vault_path(cli, &settings)?;
    let cache = keychain::for_vault(&path);

    if delete {
        cache.forget()?;
        output::success("Password removed from OS keyring.");
        return Ok(());
    }

    // Verify the password works before storing it. No keychain lookup
    // here: the user is explicitly setting the password.
    let password = prompt_password_for_vault(None)?;
    drop(VaultSession::unlock(
        &path,
        &password,
        &settings.session_options(),
    )?);

    cache.store(&password)?;
    output::success("Password saved to OS keyring. Future opens will be automatic.");

    Ok(())
}
