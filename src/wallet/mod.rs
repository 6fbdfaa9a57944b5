// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Wallet Engine
//!
//! Turns enclave-issued entropy into HD wallets:
//!
//! 1. validate the request (mnemonic length, account specs) before any side effect
//! 2. draw a seed from the enclave under a mandatory deadline
//! 3. derive every requested account and check its address for collisions
//! 4. persist the wallet and its accounts in one transaction
//!
//! Returned addresses follow the order of the requested accounts.

use std::{collections::HashSet, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::config::AddressCollisionPolicy;
use crate::derivation::{
    derive_account, root_key_reference, seed_from_phrase, strength_for_word_count, AccountSpec,
    SeedValidation, DEFAULT_WORD_COUNT,
};
use crate::enclave::{EnclaveClient, EnclaveError, EnclaveInfo, GeneratedSeed};
use crate::error::{ServiceError, ServiceResult};
use crate::models::{Wallet, WalletAccount};
use crate::storage::{Database, Page, PageRequest, WalletRepository};

/// Fresh seeds drawn after a cross-wallet address collision before giving up.
pub const MAX_REGENERATIONS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CreateWalletRequest {
    pub name: String,
    pub accounts: Vec<AccountSpec>,
    /// 12, 15, 18, 21 or 24; defaults to 24.
    #[serde(default)]
    pub mnemonic_length: Option<u32>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CreateWalletRequest {
    /// Check the request and return the entropy strength to ask the enclave for.
    pub fn validate(&self) -> ServiceResult<u32> {
        if self.name.trim().is_empty() {
            return Err(ServiceError::validation("wallet name must not be empty"));
        }

        let words = self.mnemonic_length.unwrap_or(DEFAULT_WORD_COUNT);
        let strength = strength_for_word_count(words)
            .ok_or_else(|| ServiceError::validation("invalid mnemonic length"))?;

        let mut seen = HashSet::with_capacity(self.accounts.len());
        for (i, spec) in self.accounts.iter().enumerate() {
            spec.validate()
                .map_err(|e| ServiceError::validation(format!("account {i}: {e}")))?;
            if !seen.insert((spec.curve, spec.path.trim(), spec.address_format)) {
                return Err(ServiceError::validation(format!(
                    "account {i}: duplicate of an earlier account"
                )));
            }
        }

        Ok(strength)
    }
}

/// Outcome of a successful wallet creation.
#[derive(Debug, Clone)]
pub struct CreatedWallet {
    pub wallet: Wallet,
    pub accounts: Vec<WalletAccount>,
    pub addresses: Vec<String>,
    pub enclave_request_id: String,
}

pub struct WalletEngine {
    db: Arc<Database>,
    enclave: Arc<dyn EnclaveClient>,
    enclave_timeout: Duration,
    collision_policy: AddressCollisionPolicy,
}

impl WalletEngine {
    pub fn new(
        db: Arc<Database>,
        enclave: Arc<dyn EnclaveClient>,
        enclave_timeout: Duration,
        collision_policy: AddressCollisionPolicy,
    ) -> Self {
        Self {
            db,
            enclave,
            enclave_timeout,
            collision_policy,
        }
    }

    fn repo(&self) -> WalletRepository<'_> {
        WalletRepository::new(&self.db)
    }

    /// Run an enclave call under the configured deadline.
    async fn with_deadline<T, F>(&self, call: F) -> ServiceResult<T>
    where
        F: std::future::Future<Output = Result<T, EnclaveError>>,
    {
        match tokio::time::timeout(self.enclave_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ServiceError::EnclaveUnavailable(format!(
                "no enclave response within {} ms",
                self.enclave_timeout.as_millis()
            ))),
        }
    }

    async fn generate_seed(
        &self,
        organization_id: &str,
        user_id: &str,
        strength: u32,
    ) -> ServiceResult<GeneratedSeed> {
        let seed = self
            .with_deadline(self.enclave.generate_seed(organization_id, user_id, strength))
            .await?;
        if seed.strength != strength {
            return Err(ServiceError::internal(format!(
                "enclave returned {} bits instead of {strength}",
                seed.strength
            )));
        }
        Ok(seed)
    }

    /// Derive all accounts of a new wallet from a mnemonic.
    fn derive(
        &self,
        organization_id: &str,
        request: &CreateWalletRequest,
        seed_phrase: &str,
    ) -> ServiceResult<(Wallet, Vec<WalletAccount>)> {
        let seed = seed_from_phrase(seed_phrase)?;
        let wallet = Wallet::new(
            organization_id,
            request.name.trim(),
            root_key_reference(&seed)?,
            request.tags.clone(),
        );

        let mut batch = HashSet::with_capacity(request.accounts.len());
        let mut accounts = Vec::with_capacity(request.accounts.len());
        for (index, spec) in request.accounts.iter().enumerate() {
            let derived = derive_account(&seed, spec)?;
            if !batch.insert(derived.address.clone()) {
                return Err(ServiceError::conflict(format!(
                    "address {} derived twice in one wallet",
                    derived.address
                )));
            }
            accounts.push(WalletAccount::from_derived(
                &wallet,
                index as u32,
                spec.path_format,
                derived,
            ));
        }
        Ok((wallet, accounts))
    }

    fn first_persisted_collision(&self, accounts: &[WalletAccount]) -> ServiceResult<Option<String>> {
        let repo = self.repo();
        for account in accounts {
            if repo.address_exists(&account.address)? {
                return Ok(Some(account.address.clone()));
            }
        }
        Ok(None)
    }

    /// Create a wallet for `organization_id` on behalf of `user_id`.
    ///
    /// Not idempotent: every call draws fresh entropy and yields a new wallet.
    pub async fn create_wallet(
        &self,
        organization_id: &str,
        user_id: &str,
        request: &CreateWalletRequest,
    ) -> ServiceResult<CreatedWallet> {
        let strength = request.validate()?;

        let mut regenerations = 0;
        loop {
            let seed = self.generate_seed(organization_id, user_id, strength).await?;
            let (wallet, accounts) = self.derive(organization_id, request, &seed.seed_phrase)?;

            if let Some(address) = self.first_persisted_collision(&accounts)? {
                match self.collision_policy {
                    AddressCollisionPolicy::Regenerate if regenerations < MAX_REGENERATIONS => {
                        regenerations += 1;
                        warn!(
                            organization_id,
                            attempt = regenerations,
                            "derived address already exists, drawing a fresh seed"
                        );
                        continue;
                    }
                    _ => {
                        return Err(ServiceError::conflict(format!(
                            "address {address} already belongs to another wallet"
                        )));
                    }
                }
            }

            self.repo().create_with_accounts(&wallet, &accounts)?;

            info!(
                organization_id,
                wallet_id = %wallet.id,
                accounts = accounts.len(),
                enclave_request_id = %seed.request_id,
                "wallet created"
            );
            let addresses = accounts.iter().map(|a| a.address.clone()).collect();
            return Ok(CreatedWallet {
                wallet,
                accounts,
                addresses,
                enclave_request_id: seed.request_id,
            });
        }
    }

    /// Active wallet of the organization.
    pub fn get_wallet(&self, organization_id: &str, wallet_id: &str) -> ServiceResult<Wallet> {
        self.repo()
            .get(wallet_id)?
            .filter(|w| w.is_active && w.organization_id == organization_id)
            .ok_or_else(|| ServiceError::not_found("wallet not found"))
    }

    pub fn list_wallets(&self, organization_id: &str, page: &PageRequest) -> ServiceResult<Page<Wallet>> {
        Ok(self.repo().list_by_org(organization_id, page)?)
    }

    pub fn list_accounts(&self, organization_id: &str, wallet_id: &str) -> ServiceResult<Vec<WalletAccount>> {
        self.get_wallet(organization_id, wallet_id)?;
        Ok(self.repo().list_accounts(wallet_id)?)
    }

    /// Fail with `ExportRequired` if deleting would destroy an active wallet
    /// without the caller's confirmation.
    pub fn check_delete(
        &self,
        organization_id: &str,
        wallet_id: &str,
        delete_without_export: bool,
    ) -> ServiceResult<()> {
        if delete_without_export {
            return Ok(());
        }
        if self.get_wallet(organization_id, wallet_id).is_ok() {
            return Err(ServiceError::ExportRequired(
                "export the wallet or set delete_without_export to delete it".into(),
            ));
        }
        Ok(())
    }

    /// Soft-delete a wallet. Idempotent: a missing, foreign or already deleted
    /// wallet succeeds without effect. Returns the wallet when it was deactivated.
    pub fn delete_wallet(
        &self,
        organization_id: &str,
        wallet_id: &str,
        delete_without_export: bool,
    ) -> ServiceResult<Option<Wallet>> {
        self.check_delete(organization_id, wallet_id, delete_without_export)?;

        let owned = self
            .repo()
            .get(wallet_id)?
            .is_some_and(|w| w.organization_id == organization_id && w.is_active);
        if !owned {
            return Ok(None);
        }

        let wallet = self.repo().deactivate(wallet_id)?;
        info!(organization_id, wallet_id, "wallet deleted");
        Ok(wallet)
    }

    pub async fn validate_seed(&self, seed_phrase: &str) -> ServiceResult<SeedValidation> {
        self.with_deadline(self.enclave.validate_seed(seed_phrase)).await
    }

    pub async fn enclave_info(&self) -> ServiceResult<EnclaveInfo> {
        self.with_deadline(self.enclave.enclave_info()).await
    }
}
