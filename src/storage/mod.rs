// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Relational Store
//!
//! Persistence of every domain entity in an embedded redb database.
//!
//! ## Layout
//!
//! - [`database`] - table definitions, the [`Record`] row mapping, index key
//!   helpers and cursor scans
//! - [`pagination`] - page requests and opaque page tokens
//! - [`repository`] - typed access per aggregate
//!
//! ## Constraints
//!
//! Unique constraints (global email, username per organization, global
//! account address, OAuth subject) are checked inside the same write
//! transaction that inserts the row. Violations surface as
//! [`StoreError::Conflict`], never as internal failures.

pub mod database;
pub mod pagination;
pub mod repository;

pub use database::{
    Database, OrderIndex, Record, RowTable, StoreError, StoreResult, UniqueIndex,
};
pub use pagination::{Page, PageRequest, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use repository::{
    ActiveQuorum, ActivityRepository, OrganizationRepository, UserRepository, WalletRepository,
};
