//! CLI module — Clap argument parser, output helpers, and command implementations.

pub mod commands;
pub mod output;

use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use clap::Parser;

use zeroize::Zeroizing;

use crate::config::Settings;
use crate::errors::{CredVaultError, Result};
use crate::keychain::{self, KeychainLookup};
use crate::vault::VaultSession;

use output::OutputFormat;

/// Minimum password length to prevent trivially weak passwords.
const MIN_PASSWORD_LEN: usize = 8;

/// Env var holding the master password (CI/CD and scripts).
pub const PASSWORD_ENV: &str = "CREDVAULT_PASSWORD";

/// Env var holding the new password for `change-password` and `recover`.
pub const NEW_PASSWORD_ENV: &str = "CREDVAULT_NEW_PASSWORD";

/// CredVault CLI: local encrypted credential vault.
#[derive(Parser)]
#[command(
    name = "credvault",
    about = "Local encrypted credential vault with mnemonic recovery",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Vault file (default: <vault_dir>/<vault_file> from .credvault.toml)
    #[arg(long, global = true, env = "CREDVAULT_VAULT")]
    pub vault: Option<PathBuf>,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Create a new vault and show its recovery phrase
    Init {
        /// Create the vault without a recovery phrase
        #[arg(long)]
        no_recovery: bool,

        /// Protect the recovery phrase with an extra passphrase
        #[arg(long, conflicts_with = "no_recovery")]
        passphrase: bool,
    },

    /// Add a credential (the password is prompted)
    Add {
        /// Service name (e.g. github)
        service: String,
        /// Username or login
        #[arg(short, long)]
        username: Option<String>,
        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// Set one field of an existing credential
    Set {
        /// Service name
        service: String,
        /// Field name (e.g. password, username, token)
        field: String,
        /// Field value (omit for hidden prompt)
        value: Option<String>,
    },

    /// Print one field of a credential
    Get {
        /// Service name
        service: String,
        /// Field to print
        #[arg(default_value = "password")]
        field: String,
        /// Copy to the clipboard instead of printing
        #[arg(short, long)]
        copy: bool,
    },

    /// List credentials
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Delete a credential and its usage history
    Delete {
        /// Service name
        service: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Change the master password
    ChangePassword,

    /// Reset a lost master password with the recovery phrase
    Recover,

    /// Create a manual backup of the vault file
    Backup,

    /// List backups, newest first
    Backups,

    /// Replace the vault with its newest backup
    Restore {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
        /// Only show which backup would be used
        #[arg(long)]
        dry_run: bool,
    },

    /// View the audit log of vault operations
    Audit {
        /// Number of entries to show (default: 50)
        #[arg(long, default_value = "50")]
        last: usize,
        /// Show entries since a duration ago (e.g. 7d, 24h, 30m)
        #[arg(long)]
        since: Option<String>,
    },

    /// Manage the OS keychain password cache
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for (bash, zsh, fish, powershell)
        shell: String,
    },
}

/// Auth subcommands.
#[derive(clap::Subcommand)]
pub enum AuthAction {
    /// Save vault password to OS keyring (auto-unlock)
    Keyring {
        /// Remove password from keyring instead of saving
        #[arg(long)]
        delete: bool,
    },
}

// ---------------------------------------------------------------------------
// Shared helpers used by multiple commands
// ---------------------------------------------------------------------------

/// Load `.credvault.toml` from the current directory.
pub fn settings() -> Result<Settings> {
    let cwd = std::env::current_dir()?;
    Settings::load(&cwd)
}

/// Resolve the vault file: `--vault` if given, else from settings.
pub fn vault_path(cli: &Cli, settings: &Settings) -> Result<PathBuf> {
    match &cli.vault {
        Some(path) => Ok(path.clone()),
        None => {
            let cwd = std::env::current_dir()?;
            Ok(settings.vault_path(&cwd))
        }
    }
}

/// Get the vault password, trying in order:
/// 1. `CREDVAULT_PASSWORD` env var (CI/CD)
/// 2. OS keychain (if compiled with `keyring-store` feature)
/// 3. Interactive prompt
///
/// Returns `Zeroizing<String>` so the password is wiped from memory on drop.
pub fn prompt_password_for_vault(vault: Option<&Path>) -> Result<Zeroizing<String>> {
    // 1. Check the environment variable first (CI/CD friendly).
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }

    // 2. Try the keychain.
    if let Some(path) = vault {
        if let KeychainLookup::Found(pw) = keychain::for_vault(path).retrieve() {
            return Ok(pw);
        }
    }

    // 3. Fall back to interactive prompt.
    let pw = dialoguer::Password::new()
        .with_prompt("Enter vault password")
        .interact()
        .map_err(|e| CredVaultError::CommandFailed(format!("password prompt: {e}")))?;
    Ok(Zeroizing::new(pw))
}

/// Prompt for a new password with confirmation.
///
/// `env_var` is checked first for scripted/CI usage.
/// Enforces a minimum password length.
pub fn prompt_new_password(env_var: &str) -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var(env_var) {
        if !pw.is_empty() {
            if pw.len() < MIN_PASSWORD_LEN {
                return Err(CredVaultError::CommandFailed(format!(
                    "password must be at least {MIN_PASSWORD_LEN} characters"
                )));
            }
            return Ok(Zeroizing::new(pw));
        }
    }

    loop {
        let password = dialoguer::Password::new()
            .with_prompt("Choose vault password")
            .with_confirmation(
                "Confirm vault password",
                "Passwords do not match, try again",
            )
            .interact()
            .map_err(|e| CredVaultError::CommandFailed(format!("password prompt: {e}")))?;

        if password.len() < MIN_PASSWORD_LEN {
            output::warning(&format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters. Try again."
            ));
            continue;
        }

        return Ok(Zeroizing::new(password));
    }
}

/// Read a secret value: piped stdin if stdin is not a terminal,
/// otherwise a hidden single-line prompt.
pub fn prompt_secret(prompt: &str) -> Result<Zeroizing<String>> {
    if !io::stdin().is_terminal() {
        let mut buf = Zeroizing::new(String::new());
        io::stdin().read_to_string(&mut buf)?;
        return Ok(Zeroizing::new(buf.trim_end().to_string()));
    }
    prompt_hidden(prompt)
}

/// Hidden single-line prompt. Always interactive.
pub fn prompt_hidden(prompt: &str) -> Result<Zeroizing<String>> {
    let value = dialoguer::Password::new()
        .with_prompt(prompt)
        .allow_empty_password(true)
        .interact()
        .map_err(|e| CredVaultError::CommandFailed(format!("secret prompt: {e}")))?;
    Ok(Zeroizing::new(value))
}

/// Yes/no confirmation, defaulting to no.
pub fn confirm(prompt: &str) -> Result<bool> {
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| CredVaultError::CommandFailed(format!("confirm prompt: {e}")))
}

/// Resolve settings and path, get the password and unlock.
pub fn open_session(cli: &Cli) -> Result<VaultSession> {
    let settings = settings()?;
    let path = vault_path(cli, &settings)?;
    let password = prompt_password_for_vault(Some(&path))?;
    VaultSession::unlock(&path, &password, &settings.session_options())
}

/// Show audit warnings collected during a command.
pub fn print_warnings(warnings: Vec<String>) {
    for warning in warnings {
        output::warning(&warning);
    }
}
