use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backup::AutoBackupPolicy;
use crate::crypto::kdf::Argon2Params;
use crate::errors::{CredVaultError, Result};
use crate::vault::format::{DEFAULT_CHALLENGE_WORDS, TOTAL_RECOVERY_WORDS};
use crate::vault::SessionOptions;

/// Project-level configuration, loaded from `.credvault.toml`.
///
/// Every field has a sensible default so CredVault works out-of-the-box
/// without any config file at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory (relative to project root) where the vault lives.
    #[serde(default = "default_vault_dir")]
    pub vault_dir: String,

    /// File name of the vault inside `vault_dir`.
    #[serde(default = "default_vault_file")]
    pub vault_file: String,

    /// Argon2 memory cost in KiB (default: 64 MB).
    #[serde(default = "default_argon2_memory_kib")]
    pub argon2_memory_kib: u32,

    /// Argon2 iteration count (default: 3).
    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,

    /// Argon2 parallelism degree (default: 4).
    #[serde(default = "default_argon2_parallelism")]
    pub argon2_parallelism: u32,

    /// How pre-write backups are kept: `rolling` or `timestamped`.
    #[serde(default)]
    pub auto_backup: AutoBackupPolicy,

    /// Words asked per recovery challenge (default: 6 of 24).
    #[serde(default = "default_recovery_challenge_words")]
    pub recovery_challenge_words: u8,

    /// Failed recovery attempts allowed per session (default: 3).
    #[serde(default = "default_recovery_max_attempts")]
    pub recovery_max_attempts: u32,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_vault_dir() -> String {
    ".credvault".to_string()
}

fn default_vault_file() -> String {
    "credentials.vault".to_string()
}

fn default_argon2_memory_kib() -> u32 {
    65_536 // 64 MB
}

fn default_argon2_iterations() -> u32 {
    3
}

fn default_argon2_parallelism() -> u32 {
    4
}

fn default_recovery_challenge_words() -> u8 {
    DEFAULT_CHALLENGE_WORDS
}

fn default_recovery_max_attempts() -> u32 {
    3
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            vault_dir: default_vault_dir(),
            vault_file: default_vault_file(),
            argon2_memory_kib: default_argon2_memory_kib(),
            argon2_iterations: default_argon2_iterations(),
            argon2_parallelism: default_argon2_parallelism(),
            auto_backup: AutoBackupPolicy::default(),
            recovery_challenge_words: default_recovery_challenge_words(),
            recovery_max_attempts: default_recovery_max_attempts(),
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the project root.
    pub const FILE_NAME: &'static str = ".credvault.toml";

    /// Load settings from `<project_dir>/.credvault.toml`.
    ///
    /// If the file does not exist, sensible defaults are returned.
    /// If the file exists but cannot be parsed or holds out-of-range
    /// values, an error is returned.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)
            .map_err(|e| CredVaultError::from_io(e, &config_path))?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            CredVaultError::ConfigError(format!("Failed to parse {}: {e}", config_path.display()))
        })?;
        settings.validate().map_err(|e| {
            CredVaultError::ConfigError(format!("{}: {e}", config_path.display()))
        })?;

        tracing::debug!(config = %config_path.display(), "loaded settings");
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        self.argon2_params().validate()?;
        if self.recovery_challenge_words == 0 || self.recovery_challenge_words > TOTAL_RECOVERY_WORDS {
            return Err(CredVaultError::ConfigError(format!(
                "recovery_challenge_words must be between 1 and {TOTAL_RECOVERY_WORDS}"
            )));
        }
        if self.recovery_max_attempts == 0 {
            return Err(CredVaultError::ConfigError(
                "recovery_max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Build the full path to the vault file.
    ///
    /// Example: `project_dir/.credvault/credentials.vault`
    pub fn vault_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.vault_dir).join(&self.vault_file)
    }

    /// Convert the Argon2 settings into crypto-layer params.
    pub fn argon2_params(&self) -> Argon2Params {
        Argon2Params {
            memory_kib: self.argon2_memory_kib,
            iterations: self.argon2_iterations,
            parallelism: self.argon2_parallelism,
        }
    }

    /// Options for opening a vault session.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            argon2: self.argon2_params(),
            auto_backup: self.auto_backup,
            challenge_words: self.recovery_challenge_words,
            max_recovery_attempts: self.recovery_max_attempts,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn default_settings_are_sensible() {
        let s = Settings::default();
        assert_eq!(s.vault_dir, ".credvault");
        assert_eq!(s.vault_file, "credentials.vault");
        assert_eq!(s.argon2_memory_kib, 65_536);
        assert_eq!(s.argon2_iterations, 3);
        assert_eq!(s.argon2_parallelism, 4);
        assert_eq!(s.auto_backup, AutoBackupPolicy::Rolling);
        assert_eq!(s.recovery_challenge_words, 6);
        assert_eq!(s.recovery_max_attempts, 3);
    }

    #[test]
    fn load_returns_defaults_when_no_config_file() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.vault_file, "credentials.vault");
    }

    #[test]
    fn load_parses_toml_file() {
        let tmp = TempDir::new().unwrap();
        let config = r#"
vault_dir = "secrets"
vault_file = "team.vault"
argon2_memory_kib = 131072
argon2_iterations = 5
argon2_parallelism = 8
auto_backup = "timestamped"
recovery_challenge_words = 4
recovery_max_attempts = 5
"#;
        fs::write(tmp.path().join(".credvault.toml"), config).unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.vault_dir, "secrets");
        assert_eq!(settings.vault_file, "team.vault");
        assert_eq!(settings.argon2_memory_kib, 131_072);
        assert_eq!(settings.argon2_iterations, 5);
        assert_eq!(settings.argon2_parallelism, 8);
        assert_eq!(settings.auto_backup, AutoBackupPolicy::Timestamped);

        let options = settings.session_options();
        assert_eq!(options.challenge_words, 4);
        assert_eq!(options.max_recovery_attempts, 5);
    }

    #[test]
    fn load_uses_defaults_for_missing_fields() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".credvault.toml"), "vault_dir = \"v\"\n").unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.vault_dir, "v");
        // Rest should be defaults
        assert_eq!(settings.vault_file, "credentials.vault");
        assert_eq!(settings.argon2_iterations, 3);
    }

    #[test]
    fn load_errors_on_invalid_toml() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".credvault.toml"), "not valid {{toml").unwrap();

        let result = Settings::load(tmp.path());
        assert!(result.is_err());
    }

    #[test]
    fn load_rejects_out_of_range_values() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(".credvault.toml"),
            "recovery_challenge_words = 30\n",
        )
        .unwrap();
        assert!(matches!(
            Settings::load(tmp.path()),
            Err(CredVaultError::ConfigError(_))
        ));

        fs::write(tmp.path().join(".credvault.toml"), "argon2_memory_kib = 16\n").unwrap();
        assert!(Settings::load(tmp.path()).is_err());
    }

    #[test]
    fn vault_path_builds_correct_path() {
        let s = Settings::default();
        let project = Path::new("/home/user/myproject");
        assert_eq!(
            s.vault_path(project),
            PathBuf::from("/home/user/myproject/.credvault/credentials.vault")
        );
    }

    #[test]
    fn vault_path_respects_custom_vault_dir() {
        let s = Settings {
            vault_dir: "secrets".to_string(),
            ..Settings::default()
        };
        let project = Path::new("/home/user/myproject");
        assert_eq!(
            s.vault_path(project),
            PathBuf::from("/home/user/myproject/secrets/credentials.vault")
        );
    }
}
