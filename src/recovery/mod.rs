//! Mnemonic recovery.
//!
//! This module provides:
//! - 24-word mnemonic generation, validation and recovery-key derivation (`mnemonic`)
//! - The challenge-response flow that resets a lost master password (`challenge`)

pub mod challenge;
pub mod mnemonic;

pub use challenge::{
    pick_positions, RecoveryChallenge, RecoveryResponse, RecoverySession, RecoveryState,
};
pub use mnemonic::{is_valid_word, validate_word, RecoverySecret, TRANSCRIPTION_CHECK_WORDS};
