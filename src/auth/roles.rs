// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session roles.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Role of a signed-in principal within its organization.
///
/// - `Root` - member of the organization's root quorum
/// - `Member` - any other active user (read access)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Root,
    #[default]
    Member,
}

impl Role {
    /// Check if this role has at least the privileges of the required role.
    pub fn has_privilege(&self, required: Role) -> bool {
        matches!((self, required), (Role::Root, _) | (Role::Member, Role::Member))
    }

    /// Role implied by quorum membership.
    pub fn for_quorum_membership(is_member: bool) -> Role {
        if is_member {
            Role::Root
        } else {
            Role::Member
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Root => write!(f, "root"),
            Role::Member => write!(f, "member"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_has_all_privileges() {
        assert!(Role::Root.has_privilege(Role::Root));
        assert!(Role::Root.has_privilege(Role::Member));
    }

    #[test]
    fn member_is_not_root() {
        assert!(!Role::Member.has_privilege(Role::Root));
        assert!(Role::Member.has_privilege(Role::Member));
    }

    #[test]
    fn roles_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Root).unwrap(), "\"root\"");
        assert_eq!(Role::for_quorum_membership(false), Role::Member);
    }
}
