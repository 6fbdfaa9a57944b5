// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet read endpoints.
//!
//! Wallets are created and deleted through activities
//! (`ACTIVITY_TYPE_CREATE_WALLET`, `ACTIVITY_TYPE_DELETE_WALLET`). These
//! endpoints only read, and only within the caller's organization.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    auth::Auth,
    error::ApiError,
    models::{Wallet, WalletAccount},
    state::AppState,
    storage::PageRequest,
};

/// Response containing a page of wallets.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WalletListResponse {
    pub wallets: Vec<Wallet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AccountListResponse {
    pub accounts: Vec<WalletAccount>,
    /// Total count of accounts.
    pub total: usize,
}

/// List the organization's active wallets.
#[utoipa::path(
    get,
    path = "/v1/wallets",
    tag = "Wallets",
    security(("bearer_auth" = [])),
    params(PageRequest),
    responses(
        (status = 200, description = "List of wallets", body = WalletListResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_wallets(
    Auth(session): Auth,
    State(state): State<AppState>,
    Query(page): Query<PageRequest>,
) -> Result<Json<WalletListResponse>, ApiError> {
    let page = state.service().list_wallets(&session, &page)?;
    Ok(Json(WalletListResponse {
        wallets: page.items,
        next_page_token: page.next_page_token,
    }))
}

#[utoipa::path(
    get,
    path = "/v1/wallets/{wallet_id}",
    tag = "Wallets",
    security(("bearer_auth" = [])),
    params(("wallet_id" = String, Path, description = "Wallet ID")),
    responses(
        (status = 200, description = "Wallet details", body = Wallet),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Wallet not found")
    )
)]
pub async fn get_wallet(
    Auth(session): Auth,
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
) -> Result<Json<Wallet>, ApiError> {
    Ok(Json(state.service().get_wallet(&session, &wallet_id)?))
}

#[utoipa::path(
    get,
    path = "/v1/wallets/{wallet_id}/accounts",
    tag = "Wallets",
    security(("bearer_auth" = [])),
    params(("wallet_id" = String, Path, description = "Wallet ID")),
    responses(
        (status = 200, description = "Derived accounts", body = AccountListResponse),
        (status = 404, description = "Wallet not found")
    )
)]
pub async fn list_accounts(
    Auth(session): Auth,
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
) -> Result<Json<AccountListResponse>, ApiError> {
    let accounts = state.service().list_accounts(&session, &wallet_id)?;
    let total = accounts.len();
    Ok(Json(AccountListResponse { accounts, total }))
}
