// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Key Derivation Primitives
//!
//! Pure, stateless functions turning a BIP-39 seed and a derivation path into
//! an account public key and chain address.
//!
//! ## Supported combinations
//!
//! | Curve | Derivation | Address formats |
//! |-------|------------|-----------------|
//! | secp256k1 | BIP-32 | Ethereum (EIP-55), Bitcoin P2PKH / P2WPKH (mainnet, testnet), compressed key |
//! | ed25519 | SLIP-10 (hardened only) | Solana |
//!
//! Derivation is deterministic: the same `(seed, path, curve, format)` always
//! yields the same key and address.

pub mod address;
pub mod ed25519;
pub mod mnemonic;
pub mod path;
pub mod secp256k1;
pub mod types;

use serde::{Deserialize, Serialize};

pub use address::{encode_address, PublicKeyMaterial};
pub use mnemonic::{
    phrase_from_entropy, seed_from_phrase, strength_for_word_count, validate_phrase,
    word_count_for_strength, SeedValidation, DEFAULT_WORD_COUNT, SUPPORTED_WORD_COUNTS,
};
pub use path::{ChildIndex, DerivationPath};
pub use types::{AccountSpec, AddressFormat, Curve, PathFormat};

/// Errors raised by derivation primitives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DerivationError {
    #[error("invalid derivation path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("unsupported combination: {0}")]
    UnsupportedCombination(String),

    #[error("coin type mismatch for {format}: expected {expected}', found {found}'")]
    CoinTypeMismatch {
        format: AddressFormat,
        expected: u32,
        found: u32,
    },

    #[error("{curve} derivation requires every path segment to be hardened")]
    HardenedRequired { curve: Curve },

    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("unsupported entropy strength: {0} bits")]
    InvalidStrength(u32),

    #[error("key derivation failed: {0}")]
    Key(String),
}

/// Public result of deriving one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedAccount {
    pub path: String,
    pub curve: Curve,
    pub address_format: AddressFormat,
    /// Hex-encoded public key (33-byte compressed secp256k1 or 32-byte ed25519).
    pub public_key: String,
    pub address: String,
}

/// Derive the key and address of one account from a BIP-39 seed.
pub fn derive_account(seed: &[u8], spec: &AccountSpec) -> Result<DerivedAccount, DerivationError> {
    let path = spec.validate()?;

    let key = match spec.curve {
        Curve::Secp256k1 => PublicKeyMaterial::Secp256k1(secp256k1::derive_public_key(seed, &path)?),
        Curve::Ed25519 => PublicKeyMaterial::Ed25519(ed25519::derive_public_key(seed, &path)?),
    };

    let address = encode_address(spec.address_format, &key)?;

    Ok(DerivedAccount {
        path: path.to_string(),
        curve: spec.curve,
        address_format: spec.address_format,
        public_key: key.to_hex(),
        address,
    })
}

/// Reference to the wallet root: the BIP-32 master key fingerprint.
pub fn root_key_reference(seed: &[u8]) -> Result<String, DerivationError> {
    secp256k1::master_fingerprint(seed)
}
