// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use chrono::{DateTime, Utc};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::{Record, RowTable};

/// Control set of an organization. `1 <= threshold <= member count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Quorum {
    pub threshold: u32,
}

/// Tenant root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Organization {
    pub id: String,
    /// Monotonic counter rendered as a string, bumped on every mutation.
    pub version: String,
    pub name: String,
    pub root_quorum: Quorum,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    pub fn new(name: impl Into<String>, threshold: u32) -> Self {
        let now = Utc::now();
        Self {
            id: super::new_id(),
            version: "1".to_string(),
            name: name.into(),
            root_quorum: Quorum { threshold },
            created_at: now,
            updated_at: now,
        }
    }

    pub fn bump_version(&mut self) {
        let current: u64 = self.version.parse().unwrap_or(0);
        self.version = (current + 1).to_string();
        self.updated_at = Utc::now();
    }
}

impl Record for Organization {
    const TABLE: RowTable = TableDefinition::new("organizations");

    fn id(&self) -> &str {
        &self.id
    }
}

/// Link granting a user root authority over an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QuorumMember {
    pub organization_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl QuorumMember {
    pub fn new(organization_id: &str, user_id: &str) -> Self {
        Self {
            organization_id: organization_id.to_string(),
            user_id: user_id.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_a_counter() {
        let mut org = Organization::new("Acme", 1);
        assert_eq!(org.version, "1");
        org.bump_version();
        org.bump_version();
        assert_eq!(org.version, "3");
    }
}
