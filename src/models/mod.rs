// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Domain Models
//!
//! Entities persisted in the relational store. Each entity carries its own
//! [`Record`](crate::storage::Record) mapping next to its definition.
//!
//! ## Ownership
//!
//! - **Organization** owns its root quorum and quorum members.
//! - **User**, **Wallet** and **Activity** belong to one organization.
//! - **AuthMethod** belongs to one user; **WalletAccount** to one wallet;
//!   **Proof** to one activity.
//!
//! Cross-entity references are plain id strings, never ownership.

pub mod activity;
pub mod organization;
pub mod user;
pub mod wallet;

pub use activity::{Activity, ActivityStatus, ActivityType, Intent, Proof, ProofType};
pub use organization::{Organization, Quorum, QuorumMember};
pub use user::{AuthMethod, AuthMethodType, EmailPolicy, User};
pub use wallet::{Wallet, WalletAccount};

/// Fresh random entity id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Sort and deduplicate a tag set.
pub fn normalize_tags(tags: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut tags: Vec<String> = tags
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_behave_as_a_set() {
        let tags = normalize_tags(["b".into(), "a".into(), " b ".into(), "".into()]);
        assert_eq!(tags, vec!["a".to_string(), "b".to_string()]);
    }
}
