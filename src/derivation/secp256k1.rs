// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! BIP-32 derivation on secp256k1.

use bitcoin::{
    bip32::{ChildNumber, Xpriv},
    secp256k1::{PublicKey, Secp256k1},
    NetworkKind,
};

use super::{DerivationError, DerivationPath};

fn to_child_numbers(path: &DerivationPath) -> Result<Vec<ChildNumber>, DerivationError> {
    path.segments()
        .iter()
        .map(|segment| {
            let child = if segment.hardened {
                ChildNumber::from_hardened_idx(segment.index)
            } else {
                ChildNumber::from_normal_idx(segment.index)
            };
            child.map_err(|e| DerivationError::Key(e.to_string()))
        })
        .collect()
}

fn master_key(seed: &[u8]) -> Result<Xpriv, DerivationError> {
    Xpriv::new_master(NetworkKind::Main, seed).map_err(|e| DerivationError::Key(e.to_string()))
}

/// Derive the public key at `path`. Private material never leaves this function.
pub fn derive_public_key(seed: &[u8], path: &DerivationPath) -> Result<PublicKey, DerivationError> {
    let secp = Secp256k1::new();
    let child = master_key(seed)?
        .derive_priv(&secp, &to_child_numbers(path)?)
        .map_err(|e| DerivationError::Key(e.to_string()))?;

    Ok(child.private_key.public_key(&secp))
}

/// Hex fingerprint of the master key, as it appears in descriptors.
pub fn master_fingerprint(seed: &[u8]) -> Result<String, DerivationError> {
    let secp = Secp256k1::new();
    Ok(master_key(seed)?.fingerprint(&secp).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // BIP-32 test vector 1.
    const SEED: &str = "000102030405060708090a0b0c0d0e0f";

    #[test]
    fn bip32_vector_one() {
        let seed = alloy::hex::decode(SEED).unwrap();

        let path: DerivationPath = "m/0'/1/2'".parse().unwrap();
        let key = derive_public_key(&seed, &path).unwrap();
        assert_eq!(
            key.to_string(),
            "0357bfe1e341d01c69fe5654309956cbea516822fba8a601743a012a7896ee8dc2"
        );

        assert_eq!(master_fingerprint(&seed).unwrap(), "3442193e");
    }
}
