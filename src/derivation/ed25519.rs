// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! SLIP-10 derivation on ed25519.
//!
//! Only hardened children exist on this curve.

use ed25519_dalek::{SigningKey, VerifyingKey};
use hmac::{Hmac, Mac};
use sha2::Sha512;

use super::{DerivationError, DerivationPath};

type HmacSha512 = Hmac<Sha512>;

const MASTER_SECRET: &[u8] = b"ed25519 seed";

/// Private key and chain code at one node of the tree.
pub(crate) struct ExtendedKey {
    pub(crate) key: [u8; 32],
    pub(crate) chain_code: [u8; 32],
}

fn hmac_split(key: &[u8], parts: &[&[u8]]) -> Result<ExtendedKey, DerivationError> {
    let mut mac =
        HmacSha512::new_from_slice(key).map_err(|e| DerivationError::Key(e.to_string()))?;
    for part in parts {
        mac.update(part);
    }
    let out = mac.finalize().into_bytes();

    let mut node = ExtendedKey {
        key: [0u8; 32],
        chain_code: [0u8; 32],
    };
    node.key.copy_from_slice(&out[..32]);
    node.chain_code.copy_from_slice(&out[32..]);
    Ok(node)
}

pub(crate) fn master_key(seed: &[u8]) -> Result<ExtendedKey, DerivationError> {
    hmac_split(MASTER_SECRET, &[seed])
}

pub(crate) fn derive_key(seed: &[u8], path: &DerivationPath) -> Result<ExtendedKey, DerivationError> {
    if !path.is_fully_hardened() {
        return Err(DerivationError::HardenedRequired {
            curve: super::Curve::Ed25519,
        });
    }

    let mut node = master_key(seed)?;
    for segment in path.segments() {
        let index = segment.raw().to_be_bytes();
        let parts: [&[u8]; 3] = [&[0u8], &node.key, &index];
        node = hmac_split(&node.chain_code, &parts)?;
    }
    Ok(node)
}

/// Derive the public key at `path`.
pub fn derive_public_key(seed: &[u8], path: &DerivationPath) -> Result<VerifyingKey, DerivationError> {
    let node = derive_key(seed, path)?;
    Ok(SigningKey::from_bytes(&node.key).verifying_key())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::hex;

    // SLIP-10 test vector 1 for ed25519.
    const SEED: &str = "000102030405060708090a0b0c0d0e0f";

    #[test]
    fn slip10_master_node() {
        let seed = hex::decode(SEED).unwrap();
        let master = master_key(&seed).unwrap();
        assert_eq!(
            hex::encode(master.key),
            "2b4be7f19ee27bbf30c667b642d5f4aa69fd169872f8fc3059c08ebae2eb19e7"
        );
        assert_eq!(
            hex::encode(master.chain_code),
            "90046a93de5380a72b5e45010748567d5ea02bbf6522f979e05c0d8d8ca9fffb"
        );
        assert_eq!(
            hex::encode(SigningKey::from_bytes(&master.key).verifying_key().as_bytes()),
            "a4b2856bfec510abab89753fac1ac0e1112364e7d250545963f135f2a33188ed"
        );
    }

    #[test]
    fn slip10_first_hardened_child() {
        let seed = hex::decode(SEED).unwrap();
        let path: DerivationPath = "m/0'".parse().unwrap();
        let node = derive_key(&seed, &path).unwrap();
        assert_eq!(
            hex::encode(node.key),
            "68e0fe46dfb67e368c75379acec591dad19df3cde26e63b93a8e704f1dade7a3"
        );
        assert_eq!(
            hex::encode(derive_public_key(&seed, &path).unwrap().as_bytes()),
            "8c8a13df77a28f3445213a0f432fde644acaa215fc72dcdf300d5efaa85d350c"
        );
    }

    #[test]
    fn normal_children_are_rejected() {
        let path: DerivationPath = "m/44'/501'/0'/0".parse().unwrap();
        assert!(matches!(
            derive_public_key(&[1u8; 64], &path),
            Err(DerivationError::HardenedRequired { .. })
        ));
    }
}
