// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Quorum Custody - Multi-tenant Key Custody Service
//!
//! Organizations own hierarchical-deterministic wallets whose seed entropy is
//! minted by an external secure enclave. Root authority is held by a quorum of
//! control members, and every privileged operation is recorded as an activity
//! with proofs in an append-only ledger.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Bearer session extractor and roles
//! - `authority` - Organizations, users, credentials and the root quorum
//! - `derivation` - BIP39 mnemonics, BIP32/SLIP-10 derivation and address encodings
//! - `enclave` - Secure enclave client (remote and mock)
//! - `ledger` - Activity ledger, intent fingerprints and signed proofs
//! - `service` - Façade composing the components behind the API
//! - `session` - Sessions and the distributed lock over the cache store
//! - `storage` - Embedded relational store (redb)
//! - `wallet` - Wallet engine

pub mod api;
pub mod auth;
pub mod authority;
pub mod config;
pub mod derivation;
pub mod enclave;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod service;
pub mod session;
pub mod state;
pub mod storage;
pub mod wallet;
