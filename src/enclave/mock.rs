// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Deterministic in-process stand-in for the enclave.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::Sha256;
use uuid::Uuid;

use super::{EnclaveClient, EnclaveError, EnclaveInfo, GeneratedSeed};
use crate::derivation::{phrase_from_entropy, validate_phrase, word_count_for_strength, SeedValidation};

type HmacSha256 = Hmac<Sha256>;

pub const MOCK_ENCLAVE_ID: &str = "mock-enclave";

/// Entropy is `HMAC-SHA256(seed, organization | user | counter)`, truncated to
/// the requested strength: reproducible for a given seed, fresh on every call.
pub struct MockEnclaveClient {
    seed: [u8; 32],
    counter: AtomicU64,
    online: bool,
}

impl MockEnclaveClient {
    pub fn new(seed: [u8; 32]) -> Self {
        Self {
            seed,
            counter: AtomicU64::new(0),
            online: true,
        }
    }

    /// Mock seeded from the system RNG.
    pub fn random() -> Result<Self, EnclaveError> {
        let mut seed = [0u8; 32];
        SystemRandom::new()
            .fill(&mut seed)
            .map_err(|_| EnclaveError::Protocol("system RNG unavailable".into()))?;
        Ok(Self::new(seed))
    }

    /// A mock whose every call fails as unreachable.
    pub fn offline() -> Self {
        Self {
            online: false,
            ..Self::new([0u8; 32])
        }
    }

    fn ensure_online(&self) -> Result<(), EnclaveError> {
        if self.online {
            Ok(())
        } else {
            Err(EnclaveError::Unavailable("mock enclave is offline".into()))
        }
    }

    fn draw(&self, organization_id: &str, user_id: &str, counter: u64) -> Result<[u8; 32], EnclaveError> {
        let mut mac = HmacSha256::new_from_slice(&self.seed)
            .map_err(|e| EnclaveError::Protocol(e.to_string()))?;
        mac.update(organization_id.as_bytes());
        mac.update(b"|");
        mac.update(user_id.as_bytes());
        mac.update(b"|");
        mac.update(&counter.to_be_bytes());
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&mac.finalize().into_bytes());
        Ok(digest)
    }
}

#[async_trait]
impl EnclaveClient for MockEnclaveClient {
    async fn generate_seed(
        &self,
        organization_id: &str,
        user_id: &str,
        strength: u32,
    ) -> Result<GeneratedSeed, EnclaveError> {
        self.ensure_online()?;
        let word_count = word_count_for_strength(strength).ok_or_else(|| {
            EnclaveError::InvalidRequest(format!("unsupported entropy strength: {strength} bits"))
        })?;

        let counter = self.counter.fetch_add(1, Ordering::SeqCst);
        let digest = self.draw(organization_id, user_id, counter)?;
        let entropy = &digest[..(strength / 8) as usize];

        let seed_phrase =
            phrase_from_entropy(entropy).map_err(|e| EnclaveError::Protocol(e.to_string()))?;
        let request_id = Uuid::new_v5(
            &Uuid::NAMESPACE_OID,
            format!("{organization_id}|{user_id}|{counter}").as_bytes(),
        );

        Ok(GeneratedSeed {
            seed_phrase,
            entropy: alloy::hex::encode(entropy),
            strength,
            word_count,
            request_id: request_id.to_string(),
        })
    }

    async fn validate_seed(&self, seed_phrase: &str) -> Result<SeedValidation, EnclaveError> {
        self.ensure_online()?;
        Ok(validate_phrase(seed_phrase))
    }

    async fn enclave_info(&self) -> Result<EnclaveInfo, EnclaveError> {
        self.ensure_online()?;
        Ok(EnclaveInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            enclave_id: MOCK_ENCLAVE_ID.to_string(),
            capabilities: vec![
                "seed_generation".to_string(),
                "seed_validation".to_string(),
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation::SUPPORTED_WORD_COUNTS;

    #[tokio::test]
    async fn generated_seeds_validate_with_matching_strength() {
        let enclave = MockEnclaveClient::new([1u8; 32]);

        for words in SUPPORTED_WORD_COUNTS {
            let strength = crate::derivation::strength_for_word_count(words).unwrap();
            let seed = enclave.generate_seed("org", "user", strength).await.unwrap();
            assert_eq!(seed.word_count, words);
            assert_eq!(seed.entropy.len() as u32, strength / 4);

            let validation = enclave.validate_seed(&seed.seed_phrase).await.unwrap();
            assert!(validation.is_valid);
            assert_eq!(validation.strength, strength);
            assert_eq!(validation.word_count, words);
        }
    }

    #[tokio::test]
    async fn every_call_draws_fresh_entropy() {
        let enclave = MockEnclaveClient::new([2u8; 32]);
        let a = enclave.generate_seed("org", "user", 256).await.unwrap();
        let b = enclave.generate_seed("org", "user", 256).await.unwrap();
        assert_ne!(a.seed_phrase, b.seed_phrase);
        assert_ne!(a.request_id, b.request_id);

        // Same seed, same call sequence.
        let replay = MockEnclaveClient::new([2u8; 32]);
        let c = replay.generate_seed("org", "user", 256).await.unwrap();
        assert_eq!(a.seed_phrase, c.seed_phrase);
    }

    #[tokio::test]
    async fn rejects_unsupported_strength() {
        let enclave = MockEnclaveClient::new([3u8; 32]);
        assert!(matches!(
            enclave.generate_seed("org", "user", 100).await,
            Err(EnclaveError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn offline_mock_is_unavailable() {
        let enclave = MockEnclaveClient::offline();
        assert!(matches!(
            enclave.enclave_info().await,
            Err(EnclaveError::Unavailable(_))
        ));
        assert!(matches!(
            enclave.validate_seed("abandon").await,
            Err(EnclaveError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn malformed_phrases_are_reported_not_raised() {
        let enclave = MockEnclaveClient::new([4u8; 32]);
        let validation = enclave.validate_seed("not a real phrase").await.unwrap();
        assert!(!validation.is_valid);
        assert!(!validation.errors.is_empty());
    }
}
