// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::IdentityVerifier;
use crate::service::CustodyService;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CustodyService>,
    /// Absent when no assertion secret is configured; sign-in is then refused.
    pub identity_verifier: Option<Arc<IdentityVerifier>>,
}

impl AppState {
    pub fn new(service: CustodyService) -> Self {
        Self {
            service: Arc::new(service),
            identity_verifier: None,
        }
    }

    pub fn with_identity_verifier(mut self, verifier: IdentityVerifier) -> Self {
        self.identity_verifier = Some(Arc::new(verifier));
        self
    }

    pub fn service(&self) -> &CustodyService {
        &self.service
    }

    pub fn identity_verifier(&self) -> Option<&IdentityVerifier> {
        self.identity_verifier.as_deref()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::auth::assertion::testing::{ISSUER, SECRET};
    use crate::config::AppConfig;
    use crate::enclave::MockEnclaveClient;
    use crate::session::MemoryCache;
    use crate::storage::Database;

    /// State over a temporary database, a seeded mock enclave and an in-memory
    /// cache. Sign-in accepts assertions signed with the test secret.
    pub(crate) fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open(&dir.path().join("test.redb")).unwrap());
        let config = AppConfig {
            ledger_signing_key: Some([0x11; 32]),
            ..AppConfig::default()
        };
        let service = CustodyService::new(
            &config,
            db,
            Arc::new(MockEnclaveClient::new([9u8; 32])),
            Arc::new(MemoryCache::new(100)),
        )
        .unwrap();
        let state = AppState::new(service).with_identity_verifier(IdentityVerifier::new(SECRET, ISSUER));
        (state, dir)
    }
}
