//! Recovery challenge: prove possession of the mnemonic, then reset the
//! master password.
//!
//! States: `NotStarted → ChallengePresented → WordsSubmitted →
//! Verified | Failed`. A failed attempt presents a fresh set of positions
//! while attempts remain; after the last one the session stays `Failed`.
//!
//! The user submits the full 24-word mnemonic together with the words at
//! the challenged positions. The mnemonic is the secret that feeds the
//! KDF. The challenged words are a possession check layered on top.
//! Every failure past word validation is the same `RecoveryChallengeFailed`.

use std::path::{Path, PathBuf};

use rand::seq::{index, SliceRandom};
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use super::mnemonic::{derive_recovery_key, normalize_word, validate_word, RecoverySecret};
use crate::audit::{AuditEvent, Auditor, Outcome};
use crate::crypto::keys::RECOVERY_WRAP_INFO;
use crate::crypto::{unwrap_key, SecretKey, KEY_LEN};
use crate::errors::{CredVaultError, Result};
use crate::vault::format::{self, VaultHeader, RECOVERY_SLOT_AAD};
use crate::vault::lock::VaultLock;
use crate::vault::session::{SessionOptions, VaultSession};

/// Pick `count` distinct 1-based positions out of `total`, in random
/// order that is never plain ascending when more than one is asked.
pub fn pick_positions(total: usize, count: usize) -> Vec<usize> {
    let count = count.min(total);
    let mut rng = rand::rng();
    let mut positions: Vec<usize> = index::sample(&mut rng, total, count)
        .into_iter()
        .map(|i| i + 1)
        .collect();

    if count > 1 {
        while positions.windows(2).all(|w| w[0] < w[1]) {
            positions.shuffle(&mut rng);
        }
    }
    positions
}

/// Where a recovery session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    NotStarted,
    ChallengePresented,
    WordsSubmitted,
    Verified,
    Failed,
}

/// Positions the user must answer, in presentation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryChallenge {
    pub positions: Vec<usize>,
    pub passphrase_required: bool,
}

/// What the user typed for one attempt.
#[derive(Debug, Clone, Default)]
pub struct RecoveryResponse {
    /// The full mnemonic, in order.
    pub words: Vec<String>,
    /// Words for `RecoveryChallenge::positions`, in the same order.
    pub answers: Vec<String>,
}

impl Drop for RecoveryResponse {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.words.iter_mut().for_each(Zeroize::zeroize);
        self.answers.iter_mut().for_each(Zeroize::zeroize);
    }
}

/// An in-progress recovery of one vault.
///
/// Holds the vault lock from `begin` until the session is dropped or
/// handed over to the `VaultSession` returned by `complete`.
pub struct RecoverySession {
    path: PathBuf,
    data: Vec<u8>,
    header: VaultHeader,
    options: SessionOptions,
    state: RecoveryState,
    challenge: Option<RecoveryChallenge>,
    attempts: u32,
    data_key: Option<SecretKey>,
    auditor: Auditor,
    lock: VaultLock,
}

impl RecoverySession {
    /// Load the vault's recovery metadata and present the first challenge.
    pub fn begin(path: &Path, options: &SessionOptions) -> Result<Self> {
        if !path.exists() {
            return Err(CredVaultError::VaultNotFound(path.to_path_buf()));
        }
        let lock = VaultLock::acquire(path)?;
        let mut auditor = Auditor::for_vault(path);

        let data = format::read_file(path)?;
        let header = match format::parse(&data) {
            Ok(parsed) => parsed.header,
            Err(e) => {
                auditor.record(AuditEvent::RecoveryBegin, Outcome::Failure, Some("corrupted"));
                return Err(e);
            }
        };

        if !header.recovery.recovery_enabled {
            auditor.record(
                AuditEvent::RecoveryBegin,
                Outcome::Failure,
                Some("not enabled"),
            );
            return Err(CredVaultError::RecoveryNotEnabled);
        }

        let mut session = Self {
            path: path.to_path_buf(),
            data,
            header,
            options: options.clone(),
            state: RecoveryState::NotStarted,
            challenge: None,
            attempts: 0,
            data_key: None,
            auditor,
            lock,
        };
        session.present_challenge();
        session
            .auditor
            .record(AuditEvent::RecoveryBegin, Outcome::Success, None);
        info!(vault = %path.display(), "recovery started");
        Ok(session)
    }

    pub fn state(&self) -> RecoveryState {
        self.state
    }

    /// The current challenge, if one is being presented.
    pub fn challenge(&self) -> Option<&RecoveryChallenge> {
        match self.state {
            RecoveryState::ChallengePresented => self.challenge.as_ref(),
            _ => None,
        }
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.options.max_recovery_attempts.saturating_sub(self.attempts)
    }

    /// Submit one attempt.
    ///
    /// A word outside the wordlist is rejected with `InvalidRecoveryWord`
    /// before anything else and does not use up an attempt. Everything
    /// else that can go wrong is reported as `RecoveryChallengeFailed`.
    pub fn submit(&mut self, response: &RecoveryResponse, passphrase: Option<&str>) -> Result<()> {
        let positions = match (self.state, &self.challenge) {
            (RecoveryState::ChallengePresented, Some(c)) => c.positions.clone(),
            _ => return Err(CredVaultError::RecoveryChallengeFailed),
        };

        for word in response.words.iter().chain(&response.answers) {
            validate_word(word)?;
        }

        self.state = RecoveryState::WordsSubmitted;
        self.attempts += 1;

        match self.verify(&positions, response, passphrase) {
            Ok(Some(data_key)) => {
                self.data_key = Some(data_key);
                self.state = RecoveryState::Verified;
                self.auditor
                    .record(AuditEvent::RecoveryVerify, Outcome::Success, None);
                info!("recovery challenge verified");
                Ok(())
            }
            Ok(None) => {
                self.auditor
                    .record(AuditEvent::RecoveryVerify, Outcome::Failure, None);
                warn!(
                    remaining = self.attempts_remaining(),
                    "recovery challenge failed"
                );
                if self.attempts_remaining() > 0 {
                    self.present_challenge();
                } else {
                    self.state = RecoveryState::Failed;
                    self.challenge = None;
                }
                Err(CredVaultError::RecoveryChallengeFailed)
            }
            Err(e) => {
                self.state = RecoveryState::Failed;
                self.challenge = None;
                self.auditor
                    .record(AuditEvent::RecoveryVerify, Outcome::Failure, None);
                Err(e)
            }
        }
    }

    /// Re-encrypt the vault under `new_password` and return an unlocked
    /// session on it.
    pub fn complete(mut self, new_password: &str) -> Result<VaultSession> {
        let data_key = match (self.state, self.data_key.take()) {
            (RecoveryState::Verified, Some(key)) => key,
            _ => return Err(CredVaultError::RecoveryChallengeFailed),
        };

        let result = VaultSession::from_recovery(
            &self.path,
            &self.data,
            data_key,
            new_password,
            &self.options,
            self.lock,
        );

        let mut auditor = self.auditor;
        match result {
            Ok(mut session) => {
                auditor.record(AuditEvent::RecoveryComplete, Outcome::Success, None);
                session.absorb_warnings(auditor.take_warnings());
                info!(vault = %self.path.display(), "recovery completed, password reset");
                Ok(session)
            }
            Err(e) => {
                auditor.record(AuditEvent::RecoveryComplete, Outcome::Failure, None);
                Err(e)
            }
        }
    }

    /// Warnings from audit writes so far.
    pub fn take_warnings(&mut self) -> Vec<String> {
        self.auditor.take_warnings()
    }

    fn present_challenge(&mut self) {
        let recovery = &self.header.recovery;
        let positions = pick_positions(
            usize::from(recovery.total_word_count),
            usize::from(recovery.challenge_word_count),
        );
        self.challenge = Some(RecoveryChallenge {
            positions,
            passphrase_required: recovery.passphrase_required,
        });
        self.state = RecoveryState::ChallengePresented;
    }

    /// `Ok(None)` for any mismatch. Work is the same whichever input was
    /// wrong: the KDF always runs and every comparison is constant-time.
    fn verify(
        &self,
        positions: &[usize],
        response: &RecoveryResponse,
        passphrase: Option<&str>,
    ) -> Result<Option<SecretKey>> {
        let recovery = &self.header.recovery;
        let slot = recovery
            .slot
            .as_ref()
            .ok_or_else(|| CredVaultError::IntegrityFailure("missing recovery slot".into()))?;
        let fingerprint = recovery
            .recovery_key_fingerprint
            .as_deref()
            .ok_or_else(|| CredVaultError::IntegrityFailure("missing key fingerprint".into()))?;

        let answers_ok = answers_match(positions, response);

        let passphrase = if recovery.passphrase_required {
            Some(passphrase.unwrap_or(""))
        } else {
            None
        };

        let (parsed, candidate) = match RecoverySecret::from_words(&response.words) {
            Ok(secret) => (
                true,
                secret.derive_key(passphrase, &slot.salt, &slot.kdf.params)?,
            ),
            Err(_) => (
                false,
                derive_recovery_key(&[0u8; KEY_LEN], passphrase, &slot.salt, &slot.kdf.params)?,
            ),
        };

        let fingerprint_ok = candidate.matches_fingerprint(fingerprint)?;
        if !(parsed & answers_ok & fingerprint_ok) {
            return Ok(None);
        }

        let kek = candidate.derive_subkey(RECOVERY_WRAP_INFO)?;
        let data_key = unwrap_key(&kek, RECOVERY_SLOT_AAD, &slot.nonce, &slot.wrapped_key)
            .map_err(|_| {
                CredVaultError::IntegrityFailure("recovery slot does not match its key".into())
            })?;
        Ok(Some(data_key))
    }
}

/// Compare the challenge answers with the mnemonic words at those
/// positions, without stopping at the first difference.
fn answers_match(positions: &[usize], response: &RecoveryResponse) -> bool {
    let mut ok = positions.len() == response.answers.len();
    for (i, position) in positions.iter().enumerate() {
        let expected = position
            .checked_sub(1)
            .and_then(|p| response.words.get(p))
            .map(|w| normalize_word(w))
            .unwrap_or_default();
        let given = response
            .answers
            .get(i)
            .map(|w| normalize_word(w))
            .unwrap_or_default();
        let same: bool = expected.as_bytes().ct_eq(given.as_bytes()).into();
        ok &= same & !expected.is_empty();
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_distinct_in_range_and_not_ascending() {
        for _ in 0..50 {
            let p = pick_positions(24, 6);
            assert_eq!(p.len(), 6);
            assert!(p.iter().all(|&x| (1..=24).contains(&x)));

            let mut sorted = p.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), 6);
            assert_ne!(p, sorted);
        }
    }

    #[test]
    fn single_position_and_oversized_count() {
        assert_eq!(pick_positions(24, 1).len(), 1);
        assert_eq!(pick_positions(3, 10).len(), 3);
    }

    #[test]
    fn answers_must_match_positions() {
        let words: Vec<String> = (0..24).map(|i| format!("w{i}")).collect();
        let response = RecoveryResponse {
            words: words.clone(),
            answers: vec!["w4".into(), "W0".into()],
        };
        assert!(answers_match(&[5, 1], &response));
        assert!(!answers_match(&[1, 5], &response));
        assert!(!answers_match(&[5], &response));

        let short = RecoveryResponse {
            words: words[..3].to_vec(),
            answers: vec![String::new()],
        };
        assert!(!answers_match(&[10], &short));
    }
}
