// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger signing key for `SIGNATURE` proofs (ECDSA secp256k1 over SHA-256).

use std::fmt;

use k256::ecdsa::{
    signature::{Signer, Verifier},
    Signature, SigningKey, VerifyingKey,
};
use k256::elliptic_curve::rand_core::OsRng;

use crate::error::{ServiceError, ServiceResult};

pub const SIGNATURE_ALGORITHM: &str = "ECDSA_SECP256K1_SHA256";

pub struct ProofSigner {
    key: SigningKey,
}

impl fmt::Debug for ProofSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProofSigner")
            .field("public_key", &self.public_key_hex())
            .finish()
    }
}

impl ProofSigner {
    pub fn from_bytes(secret: &[u8; 32]) -> ServiceResult<Self> {
        let key = SigningKey::from_slice(secret)
            .map_err(|e| ServiceError::internal(format!("invalid ledger signing key: {e}")))?;
        Ok(Self { key })
    }

    /// Key that lives only as long as the process.
    pub fn random() -> Self {
        Self {
            key: SigningKey::random(&mut OsRng),
        }
    }

    /// Hex of the compressed SEC1 public key.
    pub fn public_key_hex(&self) -> String {
        alloy::hex::encode(self.key.verifying_key().to_encoded_point(true).as_bytes())
    }

    /// Hex of the 64-byte `r || s` signature.
    pub fn sign(&self, message: &[u8]) -> String {
        let signature: Signature = self.key.sign(message);
        alloy::hex::encode(signature.to_bytes())
    }
}

/// Check a signature produced by [`ProofSigner::sign`].
pub fn verify_signature(public_key_hex: &str, message: &[u8], signature_hex: &str) -> bool {
    let Ok(public_key) = alloy::hex::decode(public_key_hex) else {
        return false;
    };
    let Ok(signature) = alloy::hex::decode(signature_hex) else {
        return false;
    };
    let (Ok(key), Ok(signature)) = (
        VerifyingKey::from_sec1_bytes(&public_key),
        Signature::from_slice(&signature),
    ) else {
        return false;
    };
    key.verify(message, &signature).is_ok()
}
