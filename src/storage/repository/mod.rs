// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the relational store.
//!
//! Each repository borrows the [`Database`](super::Database) and exposes the
//! reads and atomic writes of one aggregate.

pub mod activities;
pub mod organizations;
pub mod users;
pub mod wallets;

pub use activities::ActivityRepository;
pub use organizations::{ActiveQuorum, OrganizationRepository};
pub use users::UserRepository;
pub use wallets::WalletRepository;
