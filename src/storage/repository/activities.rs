// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Activity ledger rows and their proofs.
//!
//! Activities are never deleted. Once a stored activity is terminal, any
//! further write to it is rejected as a conflict.
//!
//! Approval counting reads the organization's [`ActiveQuorum`] in the same
//! write transaction that records the approval, so a threshold or membership
//! change can never interleave with the decision to execute.

use chrono::Utc;
use redb::WriteTransaction;

use super::organizations::{active_quorum, ActiveQuorum};
use crate::models::{Activity, ActivityType, Organization, Proof};
use crate::storage::database::{
    fetch, fetch_for_update, order_key, read_row, scan_all, scan_page, store, Database, Record,
    StoreError, StoreResult, ACTIVITY_BY_ORG, PROOF_BY_ACTIVITY,
};
use crate::storage::{Page, PageRequest};

fn insert_proofs(txn: &WriteTransaction, proofs: &[Proof]) -> StoreResult<()> {
    let mut index = txn.open_table(PROOF_BY_ACTIVITY)?;
    for proof in proofs {
        let key = order_key(&proof.activity_id, proof.created_at, &proof.id);
        index.insert(key.as_slice(), proof.id.as_str())?;
        store(txn, proof)?;
    }
    Ok(())
}

/// Repository for activities and proofs.
pub struct ActivityRepository<'a> {
    db: &'a Database,
}

impl<'a> ActivityRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn insert(txn: &WriteTransaction, activity: &Activity, proofs: &[Proof]) -> StoreResult<()> {
        if fetch_for_update::<Organization>(txn, &activity.organization_id)?.is_none() {
            return Err(StoreError::NotFound("organization not found".into()));
        }
        if fetch_for_update::<Activity>(txn, &activity.id)?.is_some() {
            return Err(StoreError::Conflict(format!("activity {} already exists", activity.id)));
        }

        {
            let mut index = txn.open_table(ACTIVITY_BY_ORG)?;
            let key = order_key(&activity.organization_id, activity.created_at, &activity.id);
            index.insert(key.as_slice(), activity.id.as_str())?;
        }
        store(txn, activity)?;
        insert_proofs(txn, proofs)
    }

    /// Insert a new activity together with its initial proofs.
    pub fn create(&self, activity: &Activity, proofs: &[Proof]) -> StoreResult<()> {
        let txn = self.db.begin_write()?;
        Self::insert(&txn, activity, proofs)?;
        txn.commit()?;
        Ok(())
    }

    /// Insert a new activity carrying its creator's approval, claiming it for
    /// execution when that approval already meets the quorum threshold.
    pub fn create_approved(&self, mut activity: Activity, proofs: &[Proof]) -> StoreResult<Activity> {
        let txn = self.db.begin_write()?;
        let quorum = active_quorum(&txn, &activity.organization_id)?;
        activity.executing = quorum.is_met_by(&activity.approvals);
        Self::insert(&txn, &activity, proofs)?;
        txn.commit()?;
        Ok(activity)
    }

    fn update_in<F>(&self, activity_id: &str, change: F) -> StoreResult<Activity>
    where
        F: FnOnce(&WriteTransaction, &mut Activity) -> StoreResult<Vec<Proof>>,
    {
        let txn = self.db.begin_write()?;
        let mut activity: Activity = fetch_for_update(&txn, activity_id)?
            .ok_or_else(|| StoreError::NotFound("activity not found".into()))?;
        if activity.status.is_terminal() {
            return Err(StoreError::Conflict(format!(
                "activity {} is already {}",
                activity_id,
                activity.status.as_str()
            )));
        }

        let proofs = change(&txn, &mut activity)?;
        activity.id = activity_id.to_string();
        activity.updated_at = Utc::now();
        store(&txn, &activity)?;
        insert_proofs(&txn, &proofs)?;
        txn.commit()?;
        Ok(activity)
    }

    /// Apply `change` to a PENDING activity and append the proofs it returns,
    /// all inside one write transaction.
    pub fn update<F>(&self, activity_id: &str, change: F) -> StoreResult<Activity>
    where
        F: FnOnce(&mut Activity) -> StoreResult<Vec<Proof>>,
    {
        self.update_in(activity_id, |_, activity| change(activity))
    }

    /// Like [`update`](Self::update), with the organization's current quorum.
    pub fn update_with_quorum<F>(&self, activity_id: &str, change: F) -> StoreResult<Activity>
    where
        F: FnOnce(&mut Activity, &ActiveQuorum) -> StoreResult<Vec<Proof>>,
    {
        self.update_in(activity_id, |txn, activity| {
            let quorum = active_quorum(txn, &activity.organization_id)?;
            change(activity, &quorum)
        })
    }

    pub fn get(&self, activity_id: &str) -> StoreResult<Option<Activity>> {
        let txn = self.db.begin_read()?;
        fetch(&txn, activity_id)
    }

    /// Activities of an organization, oldest first, optionally of one type.
    pub fn list_by_org(
        &self,
        organization_id: &str,
        activity_type: Option<ActivityType>,
        page: &PageRequest,
    ) -> StoreResult<Page<Activity>> {
        let txn = self.db.begin_read()?;
        let index = txn.open_table(ACTIVITY_BY_ORG)?;
        let rows = txn.open_table(Activity::TABLE)?;
        scan_page(&index, organization_id, page, |id| {
            Ok(read_row::<Activity, _>(&rows, id)?
                .filter(|a| activity_type.map_or(true, |t| a.activity_type == t)))
        })
    }

    pub fn list_proofs(&self, activity_id: &str) -> StoreResult<Vec<Proof>> {
        let txn = self.db.begin_read()?;
        let index = txn.open_table(PROOF_BY_ACTIVITY)?;
        let rows = txn.open_table(Proof::TABLE)?;

        let mut proofs = Vec::new();
        for id in scan_all(&index, activity_id)? {
            if let Some(proof) = read_row(&rows, &id)? {
                proofs.push(proof);
            }
        }
        Ok(proofs)
    }
}
