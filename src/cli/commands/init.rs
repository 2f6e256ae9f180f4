//! `credvault init` — create a new vault and hand out its recovery phrase.

use zeroize::Zeroizing;

use crate::cli::output;
use crate::cli::{print_warnings, prompt_new_password, settings, vault_path, Cli, PASSWORD_ENV};
use crate::errors::{CredVaultError, Result};
use crate::recovery::RecoverySecret;
use crate::vault::VaultSession;

/// Execute the `init` command.
pub fn execute(cli: &Cli, no_recovery: bool, passphrase: bool) -> Result<()> {
    let settings = settings()?;
    let path = vault_path(cli, &settings)?;

    // 1. Refuse to overwrite an existing vault.
    if path.exists() {
        output::tip("Use `credvault add` to add credentials to the existing vault.");
        return Err(CredVaultError::VaultAlreadyExists(path));
    }

    // 2. Prompt for the master password (with confirmation).
    let password = prompt_new_password(PASSWORD_ENV)?;

    // 3. Optional recovery passphrase.
    let passphrase = if passphrase {
        Some(prompt_passphrase()?)
    } else {
        None
    };

    // 4. Create the vault file.
    let (mut session, secret) = VaultSession::initialize(
        &path,
        &password,
        !no_recovery,
        passphrase.as_deref().map(String::as_str),
        &settings.session_options(),
    )?;
    output::success(&format!("Vault created at {}", path.display()));

    // 5. Show the recovery phrase once and check it was written down.
    match secret {
        Some(secret) => {
            output::print_mnemonic(secret.words());
            verify_transcription(&secret)?;
            output::success("Recovery phrase confirmed.");
            if passphrase.is_some() {
                output::warning("Recovery also needs the passphrase. Store it separately.");
            }
        }
        None => output::warning("Recovery is disabled: a lost password cannot be reset."),
    }

    print_warnings(session.take_warnings());

    output::tip("Run `credvault add <SERVICE>` to add a credential.");
    output::tip("Run `credvault list` to see all credentials.");

    Ok(())
}

fn prompt_passphrase() -> Result<Zeroizing<String>> {
    let passphrase = dialoguer::Password::new()
        .with_prompt("Choose recovery passphrase")
        .with_confirmation(
            "Confirm recovery passphrase",
            "Passphrases do not match, try again",
        )
        .interact()
        .map_err(|e| CredVaultError::CommandFailed(format!("passphrase prompt: {e}")))?;
    Ok(Zeroizing::new(passphrase))
}

/// Ask for a few random words until they match. The phrase is fixed
/// once the vault exists, so a miss shows the same phrase again.
fn verify_transcription(secret: &RecoverySecret) -> Result<()> {
    loop {
        let positions = secret.transcription_challenge();
        output::info("Confirm you wrote it down:");

        let mut answers = Vec::with_capacity(positions.len());
        for position in &positions {
            let word: String = dialoguer::Input::new()
                .with_prompt(format!("Word #{position}"))
                .interact_text()
                .map_err(|e| CredVaultError::CommandFailed(format!("word prompt: {e}")))?;
            answers.push(Zeroizing::new(word));
        }

        let answers: Vec<&str> = answers.iter().map(|a| a.as_str()).collect();
        if secret.check_transcription(&positions, &answers) {
            return Ok(());
        }

        output::warning("That does not match. Here is the phrase again.");
        output::print_mnemonic(secret.words());
    }
}
