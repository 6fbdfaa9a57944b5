// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Organizations and their root quorum.
//!
//! The quorum invariant `1 <= threshold <= active member count` is re-checked
//! inside every write transaction that touches members, their active flag or
//! the threshold. An inactive member keeps its row but holds no authority.

use redb::{ReadableTable, WriteTransaction};

use super::users::{insert_auth_method, insert_user};
use crate::models::{AuthMethod, EmailPolicy, Organization, QuorumMember, User};
use crate::storage::database::{
    composite_key, fetch, fetch_for_update, order_key, read_row, scan_page, store, Database,
    Record, StoreError, StoreResult, GLOBAL_SCOPE, ORG_ORDER, QUORUM_MEMBERS,
};
use crate::storage::{Page, PageRequest};

fn member_bounds(organization_id: &str) -> (String, String) {
    (format!("{organization_id}|"), format!("{organization_id}}}"))
}

fn read_members<T>(table: &T, organization_id: &str) -> StoreResult<Vec<QuorumMember>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let (start, end) = member_bounds(organization_id);
    let mut members = Vec::new();
    for entry in table.range(start.as_str()..end.as_str())? {
        let (_, row) = entry?;
        members.push(serde_json::from_slice(row.value())?);
    }
    Ok(members)
}

fn load_org(txn: &WriteTransaction, organization_id: &str) -> StoreResult<Organization> {
    fetch_for_update(txn, organization_id)?
        .ok_or_else(|| StoreError::NotFound("organization not found".into()))
}

/// Root quorum as seen by one write transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveQuorum {
    pub threshold: u32,
    /// Quorum members whose user is active.
    pub members: Vec<String>,
}

impl ActiveQuorum {
    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m == user_id)
    }

    /// Approvals that still carry authority.
    pub fn counted(&self, approvals: &[String]) -> usize {
        approvals.iter().filter(|a| self.is_member(a)).count()
    }

    pub fn is_met_by(&self, approvals: &[String]) -> bool {
        self.counted(approvals) >= self.threshold as usize
    }
}

pub(crate) fn active_quorum(txn: &WriteTransaction, organization_id: &str) -> StoreResult<ActiveQuorum> {
    let org = load_org(txn, organization_id)?;
    let members = {
        let table = txn.open_table(QUORUM_MEMBERS)?;
        read_members(&table, organization_id)?
    };

    let mut active = Vec::with_capacity(members.len());
    for member in members {
        let user: Option<User> = fetch_for_update(txn, &member.user_id)?;
        if user.is_some_and(|u| u.is_active) {
            active.push(member.user_id);
        }
    }
    Ok(ActiveQuorum {
        threshold: org.root_quorum.threshold,
        members: active,
    })
}

/// Reject deactivating `user_id` when its organization's quorum could no longer act.
pub(crate) fn ensure_quorum_survives_deactivation(
    txn: &WriteTransaction,
    organization_id: &str,
    user_id: &str,
) -> StoreResult<()> {
    let quorum = active_quorum(txn, organization_id)?;
    if !quorum.is_member(user_id) {
        return Ok(());
    }
    let remaining = quorum.members.len() - 1;
    if (remaining as u32) < quorum.threshold {
        return Err(StoreError::Conflict(format!(
            "deactivating the member would leave {remaining} active members below threshold {}",
            quorum.threshold
        )));
    }
    Ok(())
}

/// Repository for organizations and quorum membership.
pub struct OrganizationRepository<'a> {
    db: &'a Database,
}

impl<'a> OrganizationRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create an organization together with its first user, who becomes the
    /// only quorum member, and optionally the user's first auth method.
    ///
    /// Returns the stored user (its email may carry a suffix under
    /// [`EmailPolicy::AutoSuffix`]).
    pub fn create_with_root_user(
        &self,
        org: &Organization,
        mut user: User,
        policy: EmailPolicy,
        auth_method: Option<AuthMethod>,
    ) -> StoreResult<(User, Option<AuthMethod>)> {
        if org.root_quorum.threshold != 1 {
            return Err(StoreError::Conflict(format!(
                "threshold {} must be 1 for a single bootstrap member",
                org.root_quorum.threshold
            )));
        }

        let txn = self.db.begin_write()?;
        store(&txn, org)?;
        {
            let mut order = txn.open_table(ORG_ORDER)?;
            let key = order_key(GLOBAL_SCOPE, org.created_at, &org.id);
            order.insert(key.as_slice(), org.id.as_str())?;
        }

        user.organization_id = org.id.clone();
        insert_user(&txn, &mut user, policy)?;

        {
            let member = QuorumMember::new(&org.id, &user.id);
            let row = serde_json::to_vec(&member)?;
            let mut members = txn.open_table(QUORUM_MEMBERS)?;
            members.insert(composite_key(&org.id, &user.id).as_str(), row.as_slice())?;
        }

        if let Some(method) = &auth_method {
            insert_auth_method(&txn, method)?;
        }

        txn.commit()?;
        Ok((user, auth_method))
    }

    pub fn get(&self, organization_id: &str) -> StoreResult<Option<Organization>> {
        let txn = self.db.begin_read()?;
        fetch(&txn, organization_id)
    }

    pub fn list(&self, page: &PageRequest) -> StoreResult<Page<Organization>> {
        let txn = self.db.begin_read()?;
        let index = txn.open_table(ORG_ORDER)?;
        let orgs = txn.open_table(Organization::TABLE)?;
        scan_page(&index, GLOBAL_SCOPE, page, |id| read_row(&orgs, id))
    }

    /// Apply `change` to the organization and bump its version.
    pub fn update<F>(&self, organization_id: &str, change: F) -> StoreResult<Organization>
    where
        F: FnOnce(&mut Organization),
    {
        let txn = self.db.begin_write()?;
        let mut org = load_org(&txn, organization_id)?;
        change(&mut org);
        org.bump_version();
        store(&txn, &org)?;
        txn.commit()?;
        Ok(org)
    }

    // =========================================================================
    // Quorum
    // =========================================================================

    pub fn list_members(&self, organization_id: &str) -> StoreResult<Vec<QuorumMember>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(QUORUM_MEMBERS)?;
        read_members(&table, organization_id)
    }

    pub fn is_member(&self, organization_id: &str, user_id: &str) -> StoreResult<bool> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(QUORUM_MEMBERS)?;
        Ok(table
            .get(composite_key(organization_id, user_id).as_str())?
            .is_some())
    }

    /// Grant root authority to an active user of the organization.
    pub fn add_member(&self, organization_id: &str, user_id: &str) -> StoreResult<Organization> {
        let txn = self.db.begin_write()?;
        let mut org = load_org(&txn, organization_id)?;

        let user: User = fetch_for_update(&txn, user_id)?
            .ok_or_else(|| StoreError::NotFound("user not found".into()))?;
        if user.organization_id != organization_id {
            return Err(StoreError::NotFound("user not found".into()));
        }
        if !user.is_active {
            return Err(StoreError::Conflict("user is not active".into()));
        }

        {
            let mut members = txn.open_table(QUORUM_MEMBERS)?;
            let key = composite_key(organization_id, user_id);
            if members.get(key.as_str())?.is_some() {
                return Err(StoreError::Conflict("user is already a quorum member".into()));
            }
            let row = serde_json::to_vec(&QuorumMember::new(organization_id, user_id))?;
            members.insert(key.as_str(), row.as_slice())?;
        }

        org.bump_version();
        store(&txn, &org)?;
        txn.commit()?;
        Ok(org)
    }

    /// Revoke root authority. Rejected when fewer active members than the
    /// threshold would remain.
    pub fn remove_member(&self, organization_id: &str, user_id: &str) -> StoreResult<Organization> {
        let txn = self.db.begin_write()?;
        let mut org = load_org(&txn, organization_id)?;
        let quorum = active_quorum(&txn, organization_id)?;

        {
            let mut members = txn.open_table(QUORUM_MEMBERS)?;
            let key = composite_key(organization_id, user_id);
            if members.get(key.as_str())?.is_none() {
                return Err(StoreError::NotFound("quorum member not found".into()));
            }

            let remaining = quorum.members.iter().filter(|m| *m != user_id).count();
            if (remaining as u32) < org.root_quorum.threshold {
                return Err(StoreError::Conflict(format!(
                    "removing the member would leave {remaining} active members below threshold {}",
                    org.root_quorum.threshold
                )));
            }
            members.remove(key.as_str())?;
        }

        org.bump_version();
        store(&txn, &org)?;
        txn.commit()?;
        Ok(org)
    }

    /// Set the root quorum threshold; must stay within `1..=active member count`.
    pub fn set_threshold(&self, organization_id: &str, threshold: u32) -> StoreResult<Organization> {
        let txn = self.db.begin_write()?;
        let mut org = load_org(&txn, organization_id)?;

        let count = active_quorum(&txn, organization_id)?.members.len() as u32;
        if threshold == 0 || threshold > count {
            return Err(StoreError::Conflict(format!(
                "threshold {threshold} must be between 1 and the {count} active quorum members"
            )));
        }

        org.root_quorum.threshold = threshold;
        org.bump_version();
        store(&txn, &org)?;
        txn.commit()?;
        Ok(org)
    }
}
