// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Enclave Client
//!
//! Seed generation and validation are delegated to an isolated secure-compute
//! service. The rest of the crate only sees the [`EnclaveClient`] capability:
//!
//! - [`RemoteEnclaveClient`] speaks HTTP/JSON to the real enclave.
//! - [`MockEnclaveClient`] mints deterministic entropy for tests and offline runs.
//!
//! ## Failure semantics
//!
//! Timeouts and refused connections surface as [`EnclaveError::Unavailable`],
//! which callers may retry. `generate_seed` is never retried here: every call
//! draws fresh entropy inside the enclave.

mod mock;
mod remote;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::derivation::SeedValidation;

pub use mock::MockEnclaveClient;
pub use remote::RemoteEnclaveClient;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnclaveError {
    /// Timeout, refused connection or an overloaded enclave.
    #[error("{0}")]
    Unavailable(String),

    /// The enclave rejected the request parameters.
    #[error("{0}")]
    InvalidRequest(String),

    /// Unexpected status or malformed response body.
    #[error("{0}")]
    Protocol(String),
}

/// Entropy minted by the enclave, already encoded as a mnemonic.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedSeed {
    pub seed_phrase: String,
    /// Hex-encoded raw entropy.
    pub entropy: String,
    pub strength: u32,
    pub word_count: u32,
    pub request_id: String,
}

impl fmt::Debug for GeneratedSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedSeed")
            .field("seed_phrase", &"<redacted>")
            .field("entropy", &"<redacted>")
            .field("strength", &self.strength)
            .field("word_count", &self.word_count)
            .field("request_id", &self.request_id)
            .finish()
    }
}

/// Enclave introspection used for health and capability negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EnclaveInfo {
    pub version: String,
    pub enclave_id: String,
    pub capabilities: Vec<String>,
}

#[async_trait]
pub trait EnclaveClient: Send + Sync {
    /// Draw `strength` bits of entropy for `(organization_id, user_id)`.
    async fn generate_seed(
        &self,
        organization_id: &str,
        user_id: &str,
        strength: u32,
    ) -> Result<GeneratedSeed, EnclaveError>;

    /// Check a phrase against the wordlist and checksum. Malformed phrases
    /// come back as `is_valid = false`, not as an error.
    async fn validate_seed(&self, seed_phrase: &str) -> Result<SeedValidation, EnclaveError>;

    async fn enclave_info(&self) -> Result<EnclaveInfo, EnclaveError>;
}
