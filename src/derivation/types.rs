// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Closed enums for curves, path formats and address formats.

use bitcoin::Network;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{DerivationError, DerivationPath};

/// Elliptic curve an account key lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Curve {
    #[serde(rename = "CURVE_SECP256K1")]
    Secp256k1,
    #[serde(rename = "CURVE_ED25519")]
    Ed25519,
}

impl Curve {
    pub fn as_str(&self) -> &'static str {
        match self {
            Curve::Secp256k1 => "CURVE_SECP256K1",
            Curve::Ed25519 => "CURVE_ED25519",
        }
    }
}

impl std::fmt::Display for Curve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoding of the derivation path string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
pub enum PathFormat {
    #[default]
    #[serde(rename = "PATH_FORMAT_BIP32")]
    Bip32,
}

/// Chain address encoding of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum AddressFormat {
    #[serde(rename = "ADDRESS_FORMAT_ETHEREUM")]
    Ethereum,
    #[serde(rename = "ADDRESS_FORMAT_BITCOIN_MAINNET_P2PKH")]
    BitcoinMainnetP2pkh,
    #[serde(rename = "ADDRESS_FORMAT_BITCOIN_MAINNET_P2WPKH")]
    BitcoinMainnetP2wpkh,
    #[serde(rename = "ADDRESS_FORMAT_BITCOIN_TESTNET_P2PKH")]
    BitcoinTestnetP2pkh,
    #[serde(rename = "ADDRESS_FORMAT_BITCOIN_TESTNET_P2WPKH")]
    BitcoinTestnetP2wpkh,
    #[serde(rename = "ADDRESS_FORMAT_SOLANA")]
    Solana,
    /// Hex of the 33-byte compressed secp256k1 public key.
    #[serde(rename = "ADDRESS_FORMAT_COMPRESSED")]
    Compressed,
}

impl AddressFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressFormat::Ethereum => "ADDRESS_FORMAT_ETHEREUM",
            AddressFormat::BitcoinMainnetP2pkh => "ADDRESS_FORMAT_BITCOIN_MAINNET_P2PKH",
            AddressFormat::BitcoinMainnetP2wpkh => "ADDRESS_FORMAT_BITCOIN_MAINNET_P2WPKH",
            AddressFormat::BitcoinTestnetP2pkh => "ADDRESS_FORMAT_BITCOIN_TESTNET_P2PKH",
            AddressFormat::BitcoinTestnetP2wpkh => "ADDRESS_FORMAT_BITCOIN_TESTNET_P2WPKH",
            AddressFormat::Solana => "ADDRESS_FORMAT_SOLANA",
            AddressFormat::Compressed => "ADDRESS_FORMAT_COMPRESSED",
        }
    }

    /// Curve whose keys this format encodes.
    pub fn curve(&self) -> Curve {
        match self {
            AddressFormat::Solana => Curve::Ed25519,
            _ => Curve::Secp256k1,
        }
    }

    /// SLIP-44 coin type expected in the path, `None` when any coin is accepted.
    pub fn coin_type(&self) -> Option<u32> {
        match self {
            AddressFormat::Ethereum => Some(60),
            AddressFormat::BitcoinMainnetP2pkh | AddressFormat::BitcoinMainnetP2wpkh => Some(0),
            AddressFormat::BitcoinTestnetP2pkh | AddressFormat::BitcoinTestnetP2wpkh => Some(1),
            AddressFormat::Solana => Some(501),
            AddressFormat::Compressed => None,
        }
    }

    /// Accepted BIP-43 purpose values.
    pub fn purposes(&self) -> &'static [u32] {
        match self {
            AddressFormat::BitcoinMainnetP2wpkh | AddressFormat::BitcoinTestnetP2wpkh => &[44, 84],
            _ => &[44],
        }
    }

    /// Bitcoin network for Bitcoin formats.
    pub fn bitcoin_network(&self) -> Option<Network> {
        match self {
            AddressFormat::BitcoinMainnetP2pkh | AddressFormat::BitcoinMainnetP2wpkh => {
                Some(Network::Bitcoin)
            }
            AddressFormat::BitcoinTestnetP2pkh | AddressFormat::BitcoinTestnetP2wpkh => {
                Some(Network::Testnet)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for AddressFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One requested wallet account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct AccountSpec {
    pub curve: Curve,
    #[serde(default)]
    pub path_format: PathFormat,
    /// BIP-32 path, e.g. `m/44'/60'/0'/0/0`.
    pub path: String,
    pub address_format: AddressFormat,
}

impl AccountSpec {
    /// Check that curve, path and address format agree; returns the parsed path.
    pub fn validate(&self) -> Result<DerivationPath, DerivationError> {
        if self.address_format.curve() != self.curve {
            return Err(DerivationError::UnsupportedCombination(format!(
                "{} requires {}, got {}",
                self.address_format,
                self.address_format.curve(),
                self.curve
            )));
        }

        let path: DerivationPath = self.path.parse()?;
        let invalid = |reason: &str| DerivationError::InvalidPath {
            path: self.path.clone(),
            reason: reason.to_string(),
        };

        let segments = path.segments();
        if !(3..=5).contains(&segments.len()) {
            return Err(invalid("expected m/purpose'/coin'/account'[/change[/index]]"));
        }
        if !segments[..3].iter().all(|s| s.hardened) {
            return Err(invalid("purpose, coin type and account must be hardened"));
        }

        let purpose = segments[0].index;
        if !self.address_format.purposes().contains(&purpose) {
            return Err(invalid(&format!(
                "purpose {purpose}' is not valid for {}",
                self.address_format
            )));
        }

        if let Some(expected) = self.address_format.coin_type() {
            let found = segments[1].index;
            if found != expected {
                return Err(DerivationError::CoinTypeMismatch {
                    format: self.address_format,
                    expected,
                    found,
                });
            }
        }

        if self.curve == Curve::Ed25519 && !path.is_fully_hardened() {
            return Err(DerivationError::HardenedRequired { curve: self.curve });
        }

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(curve: Curve, path: &str, format: AddressFormat) -> AccountSpec {
        AccountSpec {
            curve,
            path_format: PathFormat::Bip32,
            path: path.into(),
            address_format: format,
        }
    }

    #[test]
    fn serde_uses_prefixed_names() {
        let json = serde_json::to_string(&AddressFormat::BitcoinTestnetP2wpkh).unwrap();
        assert_eq!(json, "\"ADDRESS_FORMAT_BITCOIN_TESTNET_P2WPKH\"");

        let curve: Curve = serde_json::from_str("\"CURVE_ED25519\"").unwrap();
        assert_eq!(curve, Curve::Ed25519);

        assert!(serde_json::from_str::<Curve>("\"CURVE_P256\"").is_err());
    }

    #[test]
    fn valid_specs() {
        assert!(spec(Curve::Secp256k1, "m/44'/60'/0'/0/0", AddressFormat::Ethereum).validate().is_ok());
        assert!(spec(Curve::Secp256k1, "m/84'/1'/0'/0/3", AddressFormat::BitcoinTestnetP2wpkh).validate().is_ok());
        assert!(spec(Curve::Ed25519, "m/44'/501'/0'/0'", AddressFormat::Solana).validate().is_ok());
        assert!(spec(Curve::Secp256k1, "m/44'/9000'/0'/0/0", AddressFormat::Compressed).validate().is_ok());
    }

    #[test]
    fn ed25519_never_pairs_with_bitcoin() {
        let err = spec(Curve::Ed25519, "m/44'/0'/0'/0'/0'", AddressFormat::BitcoinMainnetP2wpkh)
            .validate()
            .unwrap_err();
        assert!(matches!(err, DerivationError::UnsupportedCombination(_)));
    }

    #[test]
    fn ed25519_requires_hardened_segments() {
        let err = spec(Curve::Ed25519, "m/44'/501'/0'/0/0", AddressFormat::Solana)
            .validate()
            .unwrap_err();
        assert_eq!(err, DerivationError::HardenedRequired { curve: Curve::Ed25519 });
    }

    #[test]
    fn rejects_wrong_purpose_and_shape() {
        assert!(spec(Curve::Secp256k1, "m/84'/60'/0'/0/0", AddressFormat::Ethereum).validate().is_err());
        assert!(spec(Curve::Secp256k1, "m/44'/60'", AddressFormat::Ethereum).validate().is_err());
        assert!(spec(Curve::Secp256k1, "m/44'/60'/0/0/0", AddressFormat::Ethereum).validate().is_err());
        assert!(spec(Curve::Secp256k1, "m/44'/60'/0'/0/0/1", AddressFormat::Ethereum).validate().is_err());
    }
}
