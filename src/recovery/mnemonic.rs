//! The recovery secret: 256 bits of entropy shown to the user as a
//! 24-word BIP-39 mnemonic (English wordlist, with checksum).
//!
//! The secret is handed out exactly once, at vault creation, and is
//! never written anywhere. What the vault keeps is a fingerprint of the
//! key derived from it and the data key wrapped under that key.

use bip39::{Language, Mnemonic};
use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

use super::challenge::pick_positions;
use crate::crypto::{derive_key, Argon2Params, SecretKey};
use crate::errors::{CredVaultError, Result};
use crate::vault::format::TOTAL_RECOVERY_WORDS;

/// Entropy size for a 24-word mnemonic.
const ENTROPY_LEN: usize = 32;

/// Number of positions asked right after creation to confirm the
/// user wrote the mnemonic down correctly.
pub const TRANSCRIPTION_CHECK_WORDS: usize = 3;

/// Normalize user input for wordlist lookup.
pub fn normalize_word(word: &str) -> String {
    word.trim().to_lowercase()
}

/// `true` if `word` (after normalization) is in the English wordlist.
pub fn is_valid_word(word: &str) -> bool {
    let word = normalize_word(word);
    Language::English.word_list().contains(&word.as_str())
}

/// Reject a single word that is not in the wordlist.
///
/// Naming the word is safe: it is what the user just typed and says
/// nothing about the stored secret.
pub fn validate_word(word: &str) -> Result<()> {
    if is_valid_word(word) {
        Ok(())
    } else {
        Err(CredVaultError::InvalidRecoveryWord(word.trim().to_string()))
    }
}

/// A recovery mnemonic held in memory. Wiped on drop.
pub struct RecoverySecret {
    words: Vec<String>,
    entropy: Zeroizing<Vec<u8>>,
}

impl RecoverySecret {
    /// Draw fresh entropy and encode it as a 24-word mnemonic.
    pub fn generate() -> Result<Self> {
        let mut entropy = Zeroizing::new(vec![0u8; ENTROPY_LEN]);
        rand::rng().fill_bytes(&mut entropy);

        let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy)
            .map_err(|e| CredVaultError::KeyDerivationFailed(format!("mnemonic encoding: {e}")))?;

        let phrase = Zeroizing::new(mnemonic.to_string());
        let words = phrase.split_whitespace().map(str::to_string).collect();
        Ok(Self { words, entropy })
    }

    /// Rebuild the secret from all 24 words typed by the user.
    ///
    /// Each word is checked against the wordlist first so a typo is
    /// reported precisely. A wrong word count or a checksum mismatch is
    /// reported as the generic recovery failure.
    pub fn from_words<S: AsRef<str>>(words: &[S]) -> Result<Self> {
        for word in words {
            validate_word(word.as_ref())?;
        }
        if words.len() != usize::from(TOTAL_RECOVERY_WORDS) {
            return Err(CredVaultError::RecoveryChallengeFailed);
        }

        let words: Vec<String> = words.iter().map(|w| normalize_word(w.as_ref())).collect();
        let phrase = Zeroizing::new(words.join(" "));
        let mnemonic = Mnemonic::parse_in_normalized(Language::English, &phrase)
            .map_err(|_| CredVaultError::RecoveryChallengeFailed)?;

        Ok(Self {
            words,
            entropy: Zeroizing::new(mnemonic.to_entropy()),
        })
    }

    /// The words in order, for the one-time display.
    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Word at a 1-based position.
    pub fn word_at(&self, position: usize) -> Option<&str> {
        position
            .checked_sub(1)
            .and_then(|i| self.words.get(i))
            .map(String::as_str)
    }

    /// The mnemonic as a single space-separated phrase.
    pub fn phrase(&self) -> Zeroizing<String> {
        Zeroizing::new(self.words.join(" "))
    }

    /// Derive the recovery key: Argon2id over entropy ‖ passphrase.
    pub fn derive_key(
        &self,
        passphrase: Option<&str>,
        salt: &[u8],
        params: &Argon2Params,
    ) -> Result<SecretKey> {
        derive_recovery_key(&self.entropy, passphrase, salt, params)
    }

    /// Random positions for the post-creation transcription check.
    pub fn transcription_challenge(&self) -> Vec<usize> {
        pick_positions(self.words.len(), TRANSCRIPTION_CHECK_WORDS)
    }

    /// Check the user's answers for `positions` (1-based).
    ///
    /// Every answer is compared, in constant time, before deciding.
    pub fn check_transcription<S: AsRef<str>>(&self, positions: &[usize], answers: &[S]) -> bool {
        if positions.len() != answers.len() {
            return false;
        }
        let mut all_match = true;
        for (position, answer) in positions.iter().zip(answers) {
            let expected = self.word_at(*position).unwrap_or("");
            let given = normalize_word(answer.as_ref());
            let same: bool = expected.as_bytes().ct_eq(given.as_bytes()).into();
            all_match &= same;
        }
        all_match
    }
}

impl Drop for RecoverySecret {
    fn drop(&mut self) {
        for word in &mut self.words {
            word.zeroize();
        }
    }
}

impl std::fmt::Debug for RecoverySecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoverySecret")
            .field("words", &"[REDACTED]")
            .finish()
    }
}

/// Argon2id over `entropy ‖ passphrase` with the slot's salt and params.
pub(crate) fn derive_recovery_key(
    entropy: &[u8],
    passphrase: Option<&str>,
    salt: &[u8],
    params: &Argon2Params,
) -> Result<SecretKey> {
    let passphrase = passphrase.unwrap_or("");
    let mut input = Zeroizing::new(Vec::with_capacity(entropy.len() + passphrase.len()));
    input.extend_from_slice(entropy);
    input.extend_from_slice(passphrase.as_bytes());
    derive_key(&input, salt, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light() -> Argon2Params {
        Argon2Params {
            memory_kib: 8_192,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn generates_24_valid_words() {
        let secret = RecoverySecret::generate().unwrap();
        assert_eq!(secret.words().len(), 24);
        assert!(secret.words().iter().all(|w| is_valid_word(w)));
    }

    #[test]
    fn two_secrets_differ() {
        let a = RecoverySecret::generate().unwrap();
        let b = RecoverySecret::generate().unwrap();
        assert_ne!(a.words(), b.words());
    }

    #[test]
    fn from_words_recovers_same_entropy() {
        let secret = RecoverySecret::generate().unwrap();
        let again = RecoverySecret::from_words(secret.words()).unwrap();
        assert_eq!(*secret.entropy, *again.entropy);
    }

    #[test]
    fn from_words_accepts_mixed_case_and_spaces() {
        let secret = RecoverySecret::generate().unwrap();
        let sloppy: Vec<String> = secret
            .words()
            .iter()
            .map(|w| format!("  {} ", w.to_uppercase()))
            .collect();
        let again = RecoverySecret::from_words(&sloppy).unwrap();
        assert_eq!(again.words(), secret.words());
    }

    #[test]
    fn unknown_word_is_reported_by_name() {
        let secret = RecoverySecret::generate().unwrap();
        let mut words = secret.words().to_vec();
        words[7] = "notaword".into();
        match RecoverySecret::from_words(&words) {
            Err(CredVaultError::InvalidRecoveryWord(w)) => assert_eq!(w, "notaword"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn wrong_count_is_generic_failure() {
        let secret = RecoverySecret::generate().unwrap();
        let words = &secret.words()[..12];
        assert!(matches!(
            RecoverySecret::from_words(words),
            Err(CredVaultError::RecoveryChallengeFailed)
        ));
    }

    #[test]
    fn swapped_words_usually_fail_checksum() {
        let secret = RecoverySecret::generate().unwrap();
        let mut words = secret.words().to_vec();
        // Replace the last word (which carries the checksum) with one
        // that differs from it; every valid replacement but 1 in 256
        // breaks the checksum, so try until one does.
        let list = Language::English.word_list();
        let failed = list.iter().take(300).any(|candidate| {
            if *candidate == words[23] {
                return false;
            }
            words[23] = (*candidate).to_string();
            RecoverySecret::from_words(&words).is_err()
        });
        assert!(failed);
    }

    #[test]
    fn derive_is_deterministic_and_passphrase_sensitive() {
        let secret = RecoverySecret::generate().unwrap();
        let salt = [3u8; 32];

        let a = secret.derive_key(Some("tree"), &salt, &light()).unwrap();
        let b = secret.derive_key(Some("tree"), &salt, &light()).unwrap();
        let c = secret.derive_key(Some("trees"), &salt, &light()).unwrap();
        let d = secret.derive_key(None, &salt, &light()).unwrap();

        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), c.as_bytes());
        assert_ne!(a.as_bytes(), d.as_bytes());
    }

    #[test]
    fn transcription_check() {
        let secret = RecoverySecret::generate().unwrap();
        let positions = secret.transcription_challenge();
        assert_eq!(positions.len(), TRANSCRIPTION_CHECK_WORDS);

        let right: Vec<String> = positions
            .iter()
            .map(|p| secret.word_at(*p).unwrap().to_string())
            .collect();
        assert!(secret.check_transcription(&positions, &right));

        let mut wrong = right.clone();
        wrong[1] = "zoo".into();
        if secret.word_at(positions[1]) != Some("zoo") {
            assert!(!secret.check_transcription(&positions, &wrong));
        }

        assert!(!secret.check_transcription(&positions, &right[..2]));
    }

    #[test]
    fn word_at_is_one_based() {
        let secret = RecoverySecret::generate().unwrap();
        assert_eq!(secret.word_at(1), Some(secret.words()[0].as_str()));
        assert_eq!(secret.word_at(24), Some(secret.words()[23].as_str()));
        assert_eq!(secret.word_at(0), None);
        assert_eq!(secret.word_at(25), None);
    }

    #[test]
    fn wordlist_validation() {
        assert!(is_valid_word("abandon"));
        assert!(is_valid_word(" Zoo "));
        assert!(!is_valid_word("abandonx"));
        assert!(validate_word("qwerty").is_err());
    }
}
