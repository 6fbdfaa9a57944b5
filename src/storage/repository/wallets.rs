// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallets and their derived accounts.
//!
//! ## Indexes
//!
//! - `wallet_by_org`: `organization_id|created_at|wallet_id` → wallet id
//! - `account_by_wallet`: `wallet_id|request_index|account_id` → account id
//! - `account_address`: address → account id, global and never released

use std::collections::HashSet;

use chrono::Utc;
use redb::ReadableTable;

use crate::models::{Organization, Wallet, WalletAccount};
use crate::storage::database::{
    fetch, fetch_for_update, order_key, read_row, scan_all, scan_page, sequence_key, store,
    write_row, Database, Record, StoreError, StoreResult, ACCOUNT_ADDRESS, ACCOUNT_BY_WALLET,
    WALLET_BY_ORG,
};
use crate::storage::{Page, PageRequest};

/// Repository for wallets and wallet accounts.
pub struct WalletRepository<'a> {
    db: &'a Database,
}

impl<'a> WalletRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Persist a wallet and all its accounts in one transaction.
    ///
    /// Fails with a conflict if any address repeats within the batch or is
    /// already held by another account.
    pub fn create_with_accounts(&self, wallet: &Wallet, accounts: &[WalletAccount]) -> StoreResult<()> {
        let mut batch = HashSet::with_capacity(accounts.len());
        for account in accounts {
            if !batch.insert(account.address.as_str()) {
                return Err(StoreError::Conflict(format!(
                    "address {} derived twice in one wallet",
                    account.address
                )));
            }
        }

        let txn = self.db.begin_write()?;
        if fetch_for_update::<Organization>(&txn, &wallet.organization_id)?.is_none() {
            return Err(StoreError::NotFound("organization not found".into()));
        }

        {
            let mut addresses = txn.open_table(ACCOUNT_ADDRESS)?;
            for account in accounts {
                if addresses.get(account.address.as_str())?.is_some() {
                    return Err(StoreError::Conflict(format!(
                        "address {} already exists",
                        account.address
                    )));
                }
                addresses.insert(account.address.as_str(), account.id.as_str())?;
            }

            let mut rows = txn.open_table(WalletAccount::TABLE)?;
            let mut by_wallet = txn.open_table(ACCOUNT_BY_WALLET)?;
            for account in accounts {
                write_row(&mut rows, account)?;
                let key = sequence_key(&wallet.id, account.index as u64, &account.id);
                by_wallet.insert(key.as_slice(), account.id.as_str())?;
            }

            let mut by_org = txn.open_table(WALLET_BY_ORG)?;
            let key = order_key(&wallet.organization_id, wallet.created_at, &wallet.id);
            by_org.insert(key.as_slice(), wallet.id.as_str())?;
        }
        store(&txn, wallet)?;

        txn.commit()?;
        Ok(())
    }

    /// Whether any stored account already uses `address`.
    pub fn address_exists(&self, address: &str) -> StoreResult<bool> {
        let txn = self.db.begin_read()?;
        let addresses = txn.open_table(ACCOUNT_ADDRESS)?;
        Ok(addresses.get(address)?.is_some())
    }

    /// Wallet by id, including soft-deleted ones.
    pub fn get(&self, wallet_id: &str) -> StoreResult<Option<Wallet>> {
        let txn = self.db.begin_read()?;
        fetch(&txn, wallet_id)
    }

    /// Active wallets of an organization, oldest first.
    pub fn list_by_org(&self, organization_id: &str, page: &PageRequest) -> StoreResult<Page<Wallet>> {
        let txn = self.db.begin_read()?;
        let index = txn.open_table(WALLET_BY_ORG)?;
        let wallets = txn.open_table(Wallet::TABLE)?;
        scan_page(&index, organization_id, page, |id| {
            Ok(read_row::<Wallet, _>(&wallets, id)?.filter(|w| w.is_active))
        })
    }

    /// Accounts of a wallet in request order.
    pub fn list_accounts(&self, wallet_id: &str) -> StoreResult<Vec<WalletAccount>> {
        let txn = self.db.begin_read()?;
        let index = txn.open_table(ACCOUNT_BY_WALLET)?;
        let rows = txn.open_table(WalletAccount::TABLE)?;

        let mut accounts = Vec::new();
        for id in scan_all(&index, wallet_id)? {
            if let Some(account) = read_row(&rows, &id)? {
                accounts.push(account);
            }
        }
        Ok(accounts)
    }

    /// Soft-delete a wallet and its accounts. Returns `None` when the wallet
    /// does not exist; deleting an inactive wallet is a no-op.
    pub fn deactivate(&self, wallet_id: &str) -> StoreResult<Option<Wallet>> {
        let txn = self.db.begin_write()?;
        let Some(mut wallet) = fetch_for_update::<Wallet>(&txn, wallet_id)? else {
            return Ok(None);
        };

        if wallet.is_active {
            wallet.is_active = false;
            wallet.updated_at = Utc::now();
            store(&txn, &wallet)?;

            let ids = {
                let index = txn.open_table(ACCOUNT_BY_WALLET)?;
                scan_all(&index, wallet_id)?
            };
            let mut rows = txn.open_table(WalletAccount::TABLE)?;
            for id in ids {
                if let Some(mut account) = read_row::<WalletAccount, _>(&rows, &id)? {
                    account.is_active = false;
                    write_row(&mut rows, &account)?;
                }
            }
        }

        txn.commit()?;
        Ok(Some(wallet))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation::{AddressFormat, Curve, DerivedAccount, PathFormat};
    use crate::models::{EmailPolicy, User};
    use crate::storage::OrganizationRepository;

    fn temp_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    fn org(db: &Database, name: &str) -> Organization {
        let org = Organization::new(name, 1);
        let user = User::new(&org.id, "root", format!("root@{name}.com"), "pk", vec![]);
        OrganizationRepository::new(db)
            .create_with_root_user(&org, user, EmailPolicy::Reject, None)
            .unwrap();
        org
    }

    fn wallet_with(org: &Organization, addresses: &[&str]) -> (Wallet, Vec<WalletAccount>) {
        let wallet = Wallet::new(&org.id, "W1", "deadbeef".into(), vec![]);
        let accounts = addresses
            .iter()
            .enumerate()
            .map(|(i, addr)| {
                WalletAccount::from_derived(
                    &wallet,
                    i as u32,
                    PathFormat::Bip32,
                    DerivedAccount {
                        path: format!("m/44'/60'/0'/0/{i}"),
                        curve: Curve::Secp256k1,
                        address_format: AddressFormat::Ethereum,
                        public_key: "02ab".into(),
                        address: addr.to_string(),
                    },
                )
            })
            .collect();
        (wallet, accounts)
    }

    #[test]
    fn wallet_and_accounts_persist_in_request_order() {
        let (db, _dir) = temp_db();
        let org = org(&db, "acme");
        let repo = WalletRepository::new(&db);

        let (wallet, accounts) = wallet_with(&org, &["0xa", "0xb", "0xc"]);
        repo.create_with_accounts(&wallet, &accounts).unwrap();

        let stored = repo.list_accounts(&wallet.id).unwrap();
        let addresses: Vec<_> = stored.iter().map(|a| a.address.as_str()).collect();
        assert_eq!(addresses, vec!["0xa", "0xb", "0xc"]);
        assert!(repo.address_exists("0xb").unwrap());
    }

    #[test]
    fn persisted_address_collision_rolls_back() {
        let (db, _dir) = temp_db();
        let org = org(&db, "acme");
        let repo = WalletRepository::new(&db);

        let (first, accounts) = wallet_with(&org, &["0xa"]);
        repo.create_with_accounts(&first, &accounts).unwrap();

        let (second, accounts) = wallet_with(&org, &["0xnew", "0xa"]);
        let err = repo.create_with_accounts(&second, &accounts).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(repo.get(&second.id).unwrap().is_none());
        assert!(!repo.address_exists("0xnew").unwrap());
    }

    #[test]
    fn batch_duplicates_are_rejected() {
        let (db, _dir) = temp_db();
        let org = org(&db, "acme");
        let (wallet, accounts) = wallet_with(&org, &["0xa", "0xa"]);
        let err = WalletRepository::new(&db)
            .create_with_accounts(&wallet, &accounts)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn listing_is_scoped_and_skips_deleted() {
        let (db, _dir) = temp_db();
        let acme = org(&db, "acme");
        let globex = org(&db, "globex");
        let repo = WalletRepository::new(&db);

        let (w1, a1) = wallet_with(&acme, &["0x1"]);
        let (w2, a2) = wallet_with(&acme, &["0x2"]);
        let (w3, a3) = wallet_with(&globex, &["0x3"]);
        repo.create_with_accounts(&w1, &a1).unwrap();
        repo.create_with_accounts(&w2, &a2).unwrap();
        repo.create_with_accounts(&w3, &a3).unwrap();

        repo.deactivate(&w1.id).unwrap();

        let page = repo.list_by_org(&acme.id, &PageRequest::default()).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, w2.id);

        assert!(repo.list_accounts(&w1.id).unwrap().iter().all(|a| !a.is_active));
    }

    #[test]
    fn deactivating_a_missing_wallet_is_not_an_error() {
        let (db, _dir) = temp_db();
        assert!(WalletRepository::new(&db).deactivate("nope").unwrap().is_none());
    }
}
