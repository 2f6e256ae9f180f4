//! Integration tests for mnemonic recovery: challenge flow, uniform
//! failures, attempt limits and password reset.

use std::collections::BTreeMap;
use std::path::PathBuf;

use credvault::crypto::Argon2Params;
use credvault::errors::CredVaultError;
use credvault::recovery::{
    pick_positions, RecoveryResponse, RecoverySecret, RecoverySession, RecoveryState,
};
use credvault::vault::{SessionOptions, VaultSession};
use tempfile::TempDir;

fn options() -> SessionOptions {
    SessionOptions {
        argon2: Argon2Params {
            memory_kib: 8_192,
            iterations: 1,
            parallelism: 1,
        },
        ..SessionOptions::default()
    }
}

/// A vault with one credential, plus its mnemonic.
fn setup(passphrase: Option<&str>) -> (TempDir, PathBuf, RecoverySecret) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("credentials.vault");

    let (mut session, secret) =
        VaultSession::initialize(&path, "Sw0rdfish!", true, passphrase, &options()).unwrap();
    let mut fields = BTreeMap::new();
    fields.insert("password".to_string(), "hunter2".to_string());
    session.add_credential("github", fields).unwrap();

    (dir, path, secret.unwrap())
}

/// The correct response to whatever the session is asking right now.
fn correct_response(session: &RecoverySession, secret: &RecoverySecret) -> RecoveryResponse {
    let positions = &session.challenge().expect("challenge presented").positions;
    RecoveryResponse {
        words: secret.words().to_vec(),
        answers: positions
            .iter()
            .map(|&p| secret.word_at(p).unwrap().to_string())
            .collect(),
    }
}

fn other_word(word: &str) -> &'static str {
    if word == "zoo" {
        "abandon"
    } else {
        "zoo"
    }
}

#[test]
fn full_recovery_resets_password() {
    let (_dir, path, secret) = setup(None);

    let mut recovery = RecoverySession::begin(&path, &options()).unwrap();
    assert_eq!(recovery.state(), RecoveryState::ChallengePresented);
    let challenge = recovery.challenge().unwrap().clone();
    assert_eq!(challenge.positions.len(), 6);
    assert!(!challenge.passphrase_required);

    let response = correct_response(&recovery, &secret);
    recovery.submit(&response, None).unwrap();
    assert_eq!(recovery.state(), RecoveryState::Verified);
    assert!(recovery.challenge().is_none());

    let session = recovery.complete("Br4ndNewPass").unwrap();
    assert_eq!(
        session.credential("github").unwrap().field("password"),
        Some("hunter2")
    );
    drop(session);

    assert!(matches!(
        VaultSession::unlock(&path, "Sw0rdfish!", &options()),
        Err(CredVaultError::AuthenticationFailure)
    ));
    let session = VaultSession::unlock(&path, "Br4ndNewPass", &options()).unwrap();
    // Recovery stays enabled with the same mnemonic.
    assert!(session.recovery_metadata().recovery_enabled);
}

#[test]
fn input_is_normalized() {
    let (_dir, path, secret) = setup(None);
    let mut recovery = RecoverySession::begin(&path, &options()).unwrap();

    let mut response = correct_response(&recovery, &secret);
    response.words = response
        .words
        .iter()
        .map(|w| format!("  {}  ", w.to_uppercase()))
        .collect();
    response.answers = response.answers.iter().map(|w| w.to_uppercase()).collect();

    recovery.submit(&response, None).unwrap();
    assert_eq!(recovery.state(), RecoveryState::Verified);
}

#[test]
fn every_mismatch_is_the_same_failure() {
    let (_dir, path, secret) = setup(Some("correct horse"));
    let opts = SessionOptions {
        max_recovery_attempts: 10,
        ..options()
    };
    let mut recovery = RecoverySession::begin(&path, &opts).unwrap();
    assert!(recovery.challenge().unwrap().passphrase_required);

    let mut messages = Vec::new();

    // Wrong mnemonic word (outside or inside the challenge, it does not matter).
    let mut response = correct_response(&recovery, &secret);
    response.words[4] = other_word(&response.words[4]).to_string();
    let err = recovery.submit(&response, Some("correct horse")).unwrap_err();
    assert!(matches!(err, CredVaultError::RecoveryChallengeFailed));
    messages.push(err.to_string());

    // Wrong challenge answer.
    let mut response = correct_response(&recovery, &secret);
    response.answers[0] = other_word(&response.answers[0]).to_string();
    let err = recovery.submit(&response, Some("correct horse")).unwrap_err();
    assert!(matches!(err, CredVaultError::RecoveryChallengeFailed));
    messages.push(err.to_string());

    // Wrong passphrase.
    let response = correct_response(&recovery, &secret);
    let err = recovery.submit(&response, Some("wrong horse")).unwrap_err();
    assert!(matches!(err, CredVaultError::RecoveryChallengeFailed));
    messages.push(err.to_string());

    // Missing passphrase.
    let response = correct_response(&recovery, &secret);
    let err = recovery.submit(&response, None).unwrap_err();
    assert!(matches!(err, CredVaultError::RecoveryChallengeFailed));
    messages.push(err.to_string());

    // Too few words.
    let mut response = correct_response(&recovery, &secret);
    response.words.truncate(12);
    let err = recovery.submit(&response, Some("correct horse")).unwrap_err();
    assert!(matches!(err, CredVaultError::RecoveryChallengeFailed));
    messages.push(err.to_string());

    messages.dedup();
    assert_eq!(messages.len(), 1, "failures must be indistinguishable");
    assert_eq!(recovery.attempts_remaining(), 5);
    assert_eq!(recovery.state(), RecoveryState::ChallengePresented);

    let response = correct_response(&recovery, &secret);
    recovery.submit(&response, Some("correct horse")).unwrap();
    assert_eq!(recovery.state(), RecoveryState::Verified);
}

#[test]
fn invalid_word_costs_no_attempt() {
    let (_dir, path, secret) = setup(None);
    let mut recovery = RecoverySession::begin(&path, &options()).unwrap();
    let before = recovery.attempts_remaining();
    let positions = recovery.challenge().unwrap().positions.clone();

    let mut response = correct_response(&recovery, &secret);
    response.words[0] = "notaword".to_string();
    match recovery.submit(&response, None) {
        Err(CredVaultError::InvalidRecoveryWord(word)) => assert_eq!(word, "notaword"),
        other => panic!("expected InvalidRecoveryWord, got {other:?}"),
    }

    assert_eq!(recovery.attempts_remaining(), before);
    assert_eq!(recovery.state(), RecoveryState::ChallengePresented);
    // Same challenge is still open.
    assert_eq!(recovery.challenge().unwrap().positions, positions);
}

#[test]
fn attempts_are_bounded() {
    let (_dir, path, secret) = setup(None);
    let mut recovery = RecoverySession::begin(&path, &options()).unwrap();

    for remaining in (0..3).rev() {
        let mut response = correct_response(&recovery, &secret);
        response.answers[0] = other_word(&response.answers[0]).to_string();
        assert!(matches!(
            recovery.submit(&response, None),
            Err(CredVaultError::RecoveryChallengeFailed)
        ));
        assert_eq!(recovery.attempts_remaining(), remaining);
    }

    assert_eq!(recovery.state(), RecoveryState::Failed);
    assert!(recovery.challenge().is_none());

    // Even the right answer is refused now.
    let response = RecoveryResponse {
        words: secret.words().to_vec(),
        answers: Vec::new(),
    };
    assert!(matches!(
        recovery.submit(&response, None),
        Err(CredVaultError::RecoveryChallengeFailed)
    ));
    assert!(matches!(
        recovery.complete("Br4ndNewPass"),
        Err(CredVaultError::RecoveryChallengeFailed)
    ));

    // The vault itself is untouched.
    assert!(VaultSession::unlock(&path, "Sw0rdfish!", &options()).is_ok());
}

#[test]
fn complete_before_verification_fails() {
    let (_dir, path, _secret) = setup(None);
    let recovery = RecoverySession::begin(&path, &options()).unwrap();
    assert!(matches!(
        recovery.complete("Br4ndNewPass"),
        Err(CredVaultError::RecoveryChallengeFailed)
    ));
}

#[test]
fn recovery_not_enabled() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("credentials.vault");
    drop(VaultSession::initialize(&path, "Sw0rdfish!", false, None, &options()).unwrap());

    assert!(matches!(
        RecoverySession::begin(&path, &options()),
        Err(CredVaultError::RecoveryNotEnabled)
    ));
}

#[test]
fn begin_on_missing_vault() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        RecoverySession::begin(&dir.path().join("nope.vault"), &options()),
        Err(CredVaultError::VaultNotFound(_))
    ));
}

#[test]
fn recovery_key_is_deterministic() {
    let secret = RecoverySecret::generate().unwrap();
    let typed = RecoverySecret::from_words(secret.words()).unwrap();
    let salt = [7u8; 32];
    let params = options().argon2;

    let a = secret.derive_key(Some("pp"), &salt, &params).unwrap();
    let b = typed.derive_key(Some("pp"), &salt, &params).unwrap();
    let c = typed.derive_key(None, &salt, &params).unwrap();

    assert_eq!(a.as_bytes(), b.as_bytes());
    assert_ne!(a.as_bytes(), c.as_bytes());
}

#[test]
fn challenge_positions_are_unique_and_shuffled() {
    for _ in 0..200 {
        let positions = pick_positions(24, 6);
        assert_eq!(positions.len(), 6);
        assert!(positions.iter().all(|p| (1..=24).contains(p)));

        let mut sorted = positions.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 6);
        assert_ne!(sorted, positions, "positions must not be ascending");
    }
}
