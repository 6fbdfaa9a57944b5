// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Chain address encodings.

use alloy::primitives::{keccak256, Address as EthAddress};
use bitcoin::{secp256k1::PublicKey, Address as BtcAddress, CompressedPublicKey};
use ed25519_dalek::VerifyingKey;

use super::{AddressFormat, DerivationError};

/// A derived account public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicKeyMaterial {
    Secp256k1(PublicKey),
    Ed25519(VerifyingKey),
}

impl PublicKeyMaterial {
    /// Compressed SEC1 (33 bytes) or raw ed25519 (32 bytes), hex encoded.
    pub fn to_hex(&self) -> String {
        match self {
            PublicKeyMaterial::Secp256k1(pk) => alloy::hex::encode(pk.serialize()),
            PublicKeyMaterial::Ed25519(vk) => alloy::hex::encode(vk.as_bytes()),
        }
    }
}

/// Encode `key` in the requested address format.
pub fn encode_address(
    format: AddressFormat,
    key: &PublicKeyMaterial,
) -> Result<String, DerivationError> {
    match (format, key) {
        (AddressFormat::Ethereum, PublicKeyMaterial::Secp256k1(pk)) => {
            let uncompressed = pk.serialize_uncompressed();
            let hash = keccak256(&uncompressed[1..]);
            Ok(EthAddress::from_slice(&hash[12..]).to_checksum(None))
        }
        (
            AddressFormat::BitcoinMainnetP2pkh | AddressFormat::BitcoinTestnetP2pkh,
            PublicKeyMaterial::Secp256k1(pk),
        ) => {
            let network = bitcoin_network(format)?;
            let compressed = CompressedPublicKey(*pk);
            Ok(BtcAddress::p2pkh(compressed.pubkey_hash(), network).to_string())
        }
        (
            AddressFormat::BitcoinMainnetP2wpkh | AddressFormat::BitcoinTestnetP2wpkh,
            PublicKeyMaterial::Secp256k1(pk),
        ) => {
            let network = bitcoin_network(format)?;
            Ok(BtcAddress::p2wpkh(&CompressedPublicKey(*pk), network).to_string())
        }
        (AddressFormat::Compressed, PublicKeyMaterial::Secp256k1(_)) => Ok(key.to_hex()),
        (AddressFormat::Solana, PublicKeyMaterial::Ed25519(vk)) => {
            Ok(bitcoin::base58::encode(vk.as_bytes()))
        }
        (format, key) => Err(DerivationError::UnsupportedCombination(format!(
            "{format} cannot encode a {} key",
            match key {
                PublicKeyMaterial::Secp256k1(_) => "secp256k1",
                PublicKeyMaterial::Ed25519(_) => "ed25519",
            }
        ))),
    }
}

fn bitcoin_network(format: AddressFormat) -> Result<bitcoin::Network, DerivationError> {
    format
        .bitcoin_network()
        .ok_or_else(|| DerivationError::UnsupportedCombination(format!("{format} is not a Bitcoin format")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    // Compressed public key of the BIP-84 `abandon ... about` account m/84'/0'/0'/0/0.
    const BIP84_PUBKEY: &str = "0330d54fd0dd420a6e5f8d3624f5f3482cae350f79d5f0753bf5beef9c2d91af3c";

    fn bip84_key() -> PublicKeyMaterial {
        PublicKeyMaterial::Secp256k1(PublicKey::from_str(BIP84_PUBKEY).unwrap())
    }

    #[test]
    fn segwit_and_legacy_encodings() {
        let key = bip84_key();
        assert_eq!(
            encode_address(AddressFormat::BitcoinMainnetP2wpkh, &key).unwrap(),
            "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu"
        );
        assert!(encode_address(AddressFormat::BitcoinTestnetP2wpkh, &key)
            .unwrap()
            .starts_with("tb1q"));
        assert!(encode_address(AddressFormat::BitcoinMainnetP2pkh, &key)
            .unwrap()
            .starts_with('1'));
        let testnet = encode_address(AddressFormat::BitcoinTestnetP2pkh, &key).unwrap();
        assert!(testnet.starts_with('m') || testnet.starts_with('n'));
    }

    #[test]
    fn compressed_format_is_the_key_hex() {
        assert_eq!(
            encode_address(AddressFormat::Compressed, &bip84_key()).unwrap(),
            BIP84_PUBKEY
        );
    }

    #[test]
    fn curve_mismatch_is_rejected() {
        let ed = PublicKeyMaterial::Ed25519(
            ed25519_dalek::SigningKey::from_bytes(&[9u8; 32]).verifying_key(),
        );
        assert!(matches!(
            encode_address(AddressFormat::Ethereum, &ed),
            Err(DerivationError::UnsupportedCombination(_))
        ));
        assert!(matches!(
            encode_address(AddressFormat::Solana, &bip84_key()),
            Err(DerivationError::UnsupportedCombination(_))
        ));
    }
}
