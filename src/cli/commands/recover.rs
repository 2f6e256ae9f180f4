//! `credvault recover` — reset a lost master password with the recovery
//! phrase.
//!
//! The user answers the randomly chosen challenge words, then enters the
//! whole phrase (and the passphrase if one was set). Wrong input is
//! reported only as "Recovery failed".

use zeroize::Zeroizing;

use crate::cli::output;
use crate::cli::{
    print_warnings, prompt_hidden, prompt_new_password, settings, vault_path, Cli,
    NEW_PASSWORD_ENV,
};
use crate::errors::{CredVaultError, Result};
use crate::keychain;
use crate::recovery::{RecoveryResponse, RecoverySession};

/// Execute the `recover` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let settings = settings()?;
    let path = vault_path(cli, &settings)?;

    let mut recovery = RecoverySession::begin(&path, &settings.session_options())?;

    loop {
        let Some(challenge) = recovery.challenge().cloned() else {
            print_warnings(recovery.take_warnings());
            return Err(CredVaultError::RecoveryChallengeFailed);
        };

        output::info(&format!(
            "Enter the words at positions {}.",
            challenge
                .positions
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ));
        let mut answers = Vec::with_capacity(challenge.positions.len());
        for position in &challenge.positions {
            answers.push(prompt_hidden(&format!("Word #{position}"))?.trim().to_string());
        }

        let phrase = prompt_hidden("Full recovery phrase (24 words)")?;
        let words = phrase.split_whitespace().map(str::to_string).collect();

        let passphrase: Option<Zeroizing<String>> = if challenge.passphrase_required {
            Some(prompt_hidden("Recovery passphrase")?)
        } else {
            None
        };

        let response = RecoveryResponse { words, answers };
        match recovery.submit(&response, passphrase.as_deref().map(String::as_str)) {
            Ok(()) => break,
            Err(CredVaultError::InvalidRecoveryWord(word)) => {
                output::warning(&format!("'{word}' is not a recovery word. Check the spelling."));
            }
            Err(CredVaultError::RecoveryChallengeFailed) if recovery.attempts_remaining() > 0 => {
                output::warning(&format!(
                    "Recovery failed. {} attempt(s) left.",
                    recovery.attempts_remaining()
                ));
            }
            Err(e) => {
                print_warnings(recovery.take_warnings());
                return Err(e);
            }
        }
    }

    output::success("Recovery phrase verified.");
    output::info("Choose the new master password.");
    let new_password = prompt_new_password(NEW_PASSWORD_ENV)?;

    let mut session = recovery.complete(&new_password)?;
    print_warnings(session.take_warnings());

    if let Err(e) = keychain::for_vault(&path).forget() {
        output::warning(&format!("could not clear the cached password: {e}"));
    }

    output::success("Master password reset. The recovery phrase is unchanged.");
    Ok(())
}
