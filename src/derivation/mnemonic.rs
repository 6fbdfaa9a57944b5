// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! BIP-39 mnemonic helpers.
//!
//! Phrases are NFKD-normalised before parsing. Validation never echoes the
//! words of a phrase back; errors only reference word positions.

use bip39::{Language, Mnemonic};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use utoipa::ToSchema;

use super::DerivationError;

/// Word counts accepted for new wallets.
pub const SUPPORTED_WORD_COUNTS: [u32; 5] = [12, 15, 18, 21, 24];

/// Word count used when a wallet request does not specify one.
pub const DEFAULT_WORD_COUNT: u32 = 24;

/// Entropy bits for a mnemonic word count.
pub fn strength_for_word_count(word_count: u32) -> Option<u32> {
    match word_count {
        12 => Some(128),
        15 => Some(160),
        18 => Some(192),
        21 => Some(224),
        24 => Some(256),
        _ => None,
    }
}

/// Mnemonic word count for an entropy strength in bits.
pub fn word_count_for_strength(strength: u32) -> Option<u32> {
    match strength {
        128 => Some(12),
        160 => Some(15),
        192 => Some(18),
        224 => Some(21),
        256 => Some(24),
        _ => None,
    }
}

/// Outcome of validating a seed phrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SeedValidation {
    pub is_valid: bool,
    /// Entropy bits implied by the word count, 0 when the count is unsupported.
    pub strength: u32,
    pub word_count: u32,
    pub errors: Vec<String>,
}

fn normalize(phrase: &str) -> String {
    let nfkd: String = phrase.nfkd().collect();
    nfkd.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Encode raw entropy as an English mnemonic phrase.
pub fn phrase_from_entropy(entropy: &[u8]) -> Result<String, DerivationError> {
    let bits = (entropy.len() * 8) as u32;
    if word_count_for_strength(bits).is_none() {
        return Err(DerivationError::InvalidStrength(bits));
    }

    let mnemonic = Mnemonic::from_entropy_in(Language::English, entropy)
        .map_err(|e| DerivationError::InvalidMnemonic(e.to_string()))?;
    Ok(mnemonic.to_string())
}

/// Parse a phrase and stretch it into the 64-byte BIP-39 seed (empty passphrase).
pub fn seed_from_phrase(phrase: &str) -> Result<[u8; 64], DerivationError> {
    let mnemonic = Mnemonic::parse_in_normalized(Language::English, &normalize(phrase))
        .map_err(|e| DerivationError::InvalidMnemonic(e.to_string()))?;
    Ok(mnemonic.to_seed_normalized(""))
}

/// Check a phrase against the English wordlist and its checksum.
///
/// Malformed input is reported through `errors`, never as a failure.
pub fn validate_phrase(phrase: &str) -> SeedValidation {
    let normalized = normalize(phrase);
    let words: Vec<&str> = normalized.split_whitespace().collect();
    let word_count = words.len() as u32;
    let strength = strength_for_word_count(word_count);
    let mut errors = Vec::new();

    if words.is_empty() {
        errors.push("seed phrase is empty".to_string());
    } else if strength.is_none() {
        errors.push(format!(
            "invalid word count {word_count}: expected one of 12, 15, 18, 21 or 24"
        ));
    }

    let wordlist = Language::English.word_list();
    for (position, word) in words.iter().enumerate() {
        if wordlist.binary_search(word).is_err() {
            errors.push(format!(
                "word {} is not in the BIP-39 English wordlist",
                position + 1
            ));
        }
    }

    if errors.is_empty() {
        match Mnemonic::parse_in_normalized(Language::English, &normalized) {
            Ok(_) => {}
            Err(bip39::Error::InvalidChecksum) => errors.push("checksum mismatch".to_string()),
            Err(e) => errors.push(e.to_string()),
        }
    }

    SeedValidation {
        is_valid: errors.is_empty(),
        strength: strength.unwrap_or(0),
        word_count,
        errors,
    }
}
