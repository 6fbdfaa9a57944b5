// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use chrono::{DateTime, Utc};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::derivation::{AddressFormat, Curve, DerivedAccount, PathFormat};
use crate::storage::{Record, RowTable};

/// HD wallet of an organization. Deletion is a soft state (`is_active = false`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Wallet {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    /// BIP-32 master key fingerprint of the wallet seed.
    pub root_key_ref: String,
    pub tags: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(
        organization_id: &str,
        name: impl Into<String>,
        root_key_ref: String,
        tags: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: super::new_id(),
            organization_id: organization_id.to_string(),
            name: name.into(),
            root_key_ref,
            tags: super::normalize_tags(tags),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for Wallet {
    const TABLE: RowTable = TableDefinition::new("wallets");

    fn id(&self) -> &str {
        &self.id
    }
}

/// One derived account of a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WalletAccount {
    pub id: String,
    pub wallet_id: String,
    pub organization_id: String,
    /// Position in the creation request.
    pub index: u32,
    pub name: String,
    pub path: String,
    pub curve: Curve,
    pub path_format: PathFormat,
    pub address_format: AddressFormat,
    pub address: String,
    pub public_key: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl WalletAccount {
    pub fn from_derived(wallet: &Wallet, index: u32, path_format: PathFormat, derived: DerivedAccount) -> Self {
        Self {
            id: super::new_id(),
            wallet_id: wallet.id.clone(),
            organization_id: wallet.organization_id.clone(),
            index,
            name: format!("{} account {}", wallet.name, index + 1),
            path: derived.path,
            curve: derived.curve,
            path_format,
            address_format: derived.address_format,
            address: derived.address,
            public_key: derived.public_key,
            is_active: true,
            created_at: wallet.created_at,
        }
    }
}

impl Record for WalletAccount {
    const TABLE: RowTable = TableDefinition::new("wallet_accounts");

    fn id(&self) -> &str {
        &self.id
    }
}
