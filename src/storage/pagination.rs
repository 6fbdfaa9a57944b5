// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Cursor pagination. Page tokens are opaque to callers: hex of the last
//! ordering-index key returned.

use serde::{Deserialize, Serialize};
use utoipa::IntoParams;

use super::StoreError;

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageRequest {
    /// Items per page (default 50, max 100).
    #[serde(default)]
    pub page_size: Option<u32>,
    /// Token returned by the previous page.
    #[serde(default)]
    pub page_token: Option<String>,
}

impl PageRequest {
    pub fn new(page_size: Option<u32>, page_token: Option<String>) -> Self {
        Self {
            page_size,
            page_token: page_token.filter(|t| !t.is_empty()),
        }
    }

    pub fn first(page_size: u32) -> Self {
        Self::new(Some(page_size), None)
    }

    /// Effective page size: `0` or absent means the default, larger values are capped.
    pub fn limit(&self) -> usize {
        match self.page_size {
            None | Some(0) => DEFAULT_PAGE_SIZE,
            Some(n) => (n as usize).min(MAX_PAGE_SIZE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_page_token: self.next_page_token,
        }
    }
}

pub(crate) fn encode_cursor(key: &[u8]) -> String {
    alloy::hex::encode(key)
}

pub(crate) fn decode_cursor(cursor: &str) -> Result<Vec<u8>, StoreError> {
    alloy::hex::decode(cursor).map_err(|_| StoreError::InvalidCursor)
}
