// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Activity Ledger
//!
//! Every privileged request becomes an [`Activity`]:
//!
//! ```text
//! PENDING --(success)--> COMPLETED   result + SIGNATURE proof
//! PENDING --(failure)--> FAILED      failure_reason
//! ```
//!
//! Both outcomes are terminal and the store rejects any later write. While
//! PENDING, an activity collects `APPROVAL` proofs from distinct quorum members.
//!
//! Only approvals of currently active quorum members count. The write that
//! brings the count to the threshold also claims the activity (`executing`).
//! A claimed activity cannot be approved or rejected again; its executor
//! alone completes or fails it.
//!
//! ## Proofs
//!
//! | Type | Data |
//! |------|------|
//! | `PROOF_TYPE_APPROVAL` | approving user |
//! | `PROOF_TYPE_ENCLAVE_ATTESTATION` | enclave request id |
//! | `PROOF_TYPE_SIGNATURE` | ledger key signature over id, fingerprint, status and result |

mod intent;
mod signer;

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{ServiceError, ServiceResult};
use crate::models::{Activity, ActivityStatus, ActivityType, Proof, ProofType};
use crate::storage::{ActivityRepository, Database, Page, PageRequest, StoreError};

pub use intent::{canonical_json, fingerprint, intent_for, summarize};
pub use signer::{verify_signature, ProofSigner, SIGNATURE_ALGORITHM};

/// Bytes covered by an activity's `SIGNATURE` proof.
pub fn signing_message(activity: &Activity) -> Vec<u8> {
    let result = activity.result.as_ref().map(canonical_json).unwrap_or_default();
    format!(
        "{}\n{}\n{}\n{}",
        activity.id,
        activity.intent.fingerprint,
        activity.status.as_str(),
        result
    )
    .into_bytes()
}

/// Check a `SIGNATURE` proof against the activity it belongs to.
pub fn verify_activity_signature(activity: &Activity, proof: &Proof) -> bool {
    if proof.proof_type != ProofType::Signature || proof.activity_id != activity.id {
        return false;
    }
    let field = |name: &str| proof.data.get(name).and_then(Value::as_str);
    match (field("public_key"), field("signature")) {
        (Some(public_key), Some(signature)) => {
            verify_signature(public_key, &signing_message(activity), signature)
        }
        _ => false,
    }
}

pub struct ActivityLedger {
    db: Arc<Database>,
    signer: ProofSigner,
}

impl ActivityLedger {
    pub fn new(db: Arc<Database>, signer: ProofSigner) -> Self {
        Self { db, signer }
    }

    fn repo(&self) -> ActivityRepository<'_> {
        ActivityRepository::new(&self.db)
    }

    pub fn signing_public_key(&self) -> String {
        self.signer.public_key_hex()
    }

    fn new_activity(
        organization_id: &str,
        activity_type: ActivityType,
        parameters: Value,
        created_by: &str,
    ) -> Activity {
        let now = chrono::Utc::now();
        Activity {
            id: crate::models::new_id(),
            organization_id: organization_id.to_string(),
            activity_type,
            status: ActivityStatus::Pending,
            intent: intent_for(activity_type, &parameters),
            parameters,
            result: None,
            failure_reason: None,
            created_by: created_by.to_string(),
            approvals: vec![],
            executing: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn approval_proof(activity_id: &str, user_id: &str) -> Proof {
        Proof::new(activity_id, ProofType::Approval, json!({ "user_id": user_id }))
    }

    /// Record a new PENDING activity.
    pub fn create_activity(
        &self,
        organization_id: &str,
        activity_type: ActivityType,
        parameters: Value,
        created_by: &str,
    ) -> ServiceResult<Activity> {
        let activity = Self::new_activity(organization_id, activity_type, parameters, created_by);
        self.repo().create(&activity, &[])?;
        info!(
            organization_id,
            activity_id = %activity.id,
            activity_type = %activity_type,
            fingerprint = %activity.intent.fingerprint,
            "activity created"
        );
        Ok(activity)
    }

    /// Record a new PENDING activity already approved by its creator.
    ///
    /// The activity comes back claimed when that approval alone meets the threshold.
    pub fn create_approved_activity(
        &self,
        organization_id: &str,
        activity_type: ActivityType,
        parameters: Value,
        created_by: &str,
    ) -> ServiceResult<Activity> {
        let mut activity = Self::new_activity(organization_id, activity_type, parameters, created_by);
        activity.approvals.push(created_by.to_string());
        let proof = Self::approval_proof(&activity.id, created_by);
        let activity = self.repo().create_approved(activity, &[proof])?;
        info!(
            organization_id,
            activity_id = %activity.id,
            activity_type = %activity_type,
            fingerprint = %activity.intent.fingerprint,
            executing = activity.executing,
            "activity created"
        );
        Ok(activity)
    }

    /// Add `user_id`'s approval to a PENDING activity.
    ///
    /// The returned activity is `executing` exactly when this call claimed it:
    /// the counted approvals met the threshold in force at this write. A
    /// repeated approval is only accepted if it completes such a claim, which
    /// happens after the threshold was lowered or a stale approver left.
    pub fn record_approval(&self, activity_id: &str, user_id: &str) -> ServiceResult<Activity> {
        let activity = self.repo().update_with_quorum(activity_id, |activity, quorum| {
            if activity.executing {
                return Err(StoreError::Conflict(format!(
                    "activity {activity_id} is already being executed"
                )));
            }

            let mut proofs = vec![];
            if !activity.approvals.iter().any(|a| a == user_id) {
                activity.approvals.push(user_id.to_string());
                proofs.push(Self::approval_proof(&activity.id, user_id));
            }

            if quorum.is_met_by(&activity.approvals) {
                activity.executing = true;
            } else if proofs.is_empty() {
                return Err(StoreError::Conflict(format!(
                    "user {user_id} already approved this activity"
                )));
            }
            Ok(proofs)
        })?;
        info!(
            activity_id,
            user_id,
            approvals = activity.approvals.len(),
            executing = activity.executing,
            "activity approved"
        );
        Ok(activity)
    }

    /// Move a PENDING activity to COMPLETED with its result, extra proofs and
    /// a ledger signature.
    pub fn complete(
        &self,
        activity_id: &str,
        result: Value,
        proofs: Vec<(ProofType, Value)>,
    ) -> ServiceResult<Activity> {
        let activity = self.repo().update(activity_id, |activity| {
            activity.status = ActivityStatus::Completed;
            activity.result = Some(result);

            let mut stored: Vec<Proof> = proofs
                .into_iter()
                .map(|(proof_type, data)| Proof::new(&activity.id, proof_type, data))
                .collect();
            let signature = self.signer.sign(&signing_message(activity));
            stored.push(Proof::new(
                &activity.id,
                ProofType::Signature,
                json!({
                    "algorithm": SIGNATURE_ALGORITHM,
                    "public_key": self.signer.public_key_hex(),
                    "signature": signature,
                }),
            ));
            Ok(stored)
        })?;
        info!(activity_id, activity_type = %activity.activity_type, "activity completed");
        Ok(activity)
    }

    /// Move a PENDING activity that is not being executed to FAILED.
    pub fn reject(&self, activity_id: &str, reason: &str) -> ServiceResult<Activity> {
        let activity = self.repo().update(activity_id, |activity| {
            if activity.executing {
                return Err(StoreError::Conflict(format!(
                    "activity {activity_id} is already being executed"
                )));
            }
            activity.status = ActivityStatus::Failed;
            activity.failure_reason = Some(reason.to_string());
            Ok(vec![])
        })?;
        warn!(activity_id, activity_type = %activity.activity_type, reason, "activity rejected");
        Ok(activity)
    }

    /// Move a PENDING activity to FAILED, keeping the reason on the activity.
    pub fn fail(&self, activity_id: &str, reason: &str) -> ServiceResult<Activity> {
        let activity = self.repo().update(activity_id, |activity| {
            activity.status = ActivityStatus::Failed;
            activity.failure_reason = Some(reason.to_string());
            Ok(vec![])
        })?;
        warn!(activity_id, activity_type = %activity.activity_type, reason, "activity failed");
        Ok(activity)
    }

    /// Activity of the organization.
    pub fn get_activity(&self, organization_id: &str, activity_id: &str) -> ServiceResult<Activity> {
        self.repo()
            .get(activity_id)?
            .filter(|a| a.organization_id == organization_id)
            .ok_or_else(|| ServiceError::not_found("activity not found"))
    }

    pub fn list_activities(
        &self,
        organization_id: &str,
        activity_type: Option<ActivityType>,
        page: &PageRequest,
    ) -> ServiceResult<Page<Activity>> {
        Ok(self.repo().list_by_org(organization_id, activity_type, page)?)
    }

    pub fn list_proofs(&self, organization_id: &str, activity_id: &str) -> ServiceResult<Vec<Proof>> {
        self.get_activity(organization_id, activity_id)?;
        Ok(self.repo().list_proofs(activity_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmailPolicy, Organization, User};
    use crate::storage::{OrganizationRepository, UserRepository};

    struct Fixture {
        ledger: ActivityLedger,
        db: Arc<Database>,
        org: Organization,
        root: User,
        _dir: tempfile::TempDir,
    }

    impl Fixture {
        /// Add an active quorum member.
        fn member(&self, username: &str) -> User {
            let user = UserRepository::new(&self.db)
                .create(
                    User::new(&self.org.id, username, &format!("{username}@acme.com"), "pk", vec![]),
                    EmailPolicy::Reject,
                )
                .unwrap();
            OrganizationRepository::new(&self.db)
                .add_member(&self.org.id, &user.id)
                .unwrap();
            user
        }

        fn set_threshold(&self, threshold: u32) {
            OrganizationRepository::new(&self.db)
                .set_threshold(&self.org.id, threshold)
                .unwrap();
        }
    }

    fn setup() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open(&dir.path().join("test.redb")).unwrap());
        let org = Organization::new("Acme", 1);
        let root = User::new(&org.id, "root", "admin@acme.com", "pk1", vec![]);
        let (root, _) = OrganizationRepository::new(&db)
            .create_with_root_user(&org, root, EmailPolicy::Reject, None)
            .unwrap();
        let signer = ProofSigner::from_bytes(&[0x42; 32]).unwrap();
        Fixture {
            ledger: ActivityLedger::new(db.clone(), signer),
            db,
            org,
            root,
            _dir: dir,
        }
    }

    #[test]
    fn activities_start_pending_with_an_intent() {
        let f = setup();
        let params = json!({ "name": "W1", "accounts": [] });
        let activity = f
            .ledger
            .create_activity(&f.org.id, ActivityType::CreateWallet, params.clone(), "u1")
            .unwrap();

        assert_eq!(activity.status, ActivityStatus::Pending);
        assert_eq!(activity.intent.fingerprint, fingerprint(ActivityType::CreateWallet, &params));
        assert!(activity.result.is_none());
        assert!(activity.approvals.is_empty());
        assert!(!activity.executing);
    }

    #[test]
    fn completion_is_signed_and_terminal() {
        let f = setup();
        let activity = f
            .ledger
            .create_approved_activity(&f.org.id, ActivityType::DeleteWallet, json!({ "wallet_id": "w" }), &f.root.id)
            .unwrap();
        assert!(activity.executing);

        let completed = f
            .ledger
            .complete(
                &activity.id,
                json!({ "deleted": true }),
                vec![(ProofType::EnclaveAttestation, json!({ "request_id": "r1" }))],
            )
            .unwrap();
        assert_eq!(completed.status, ActivityStatus::Completed);
        assert_eq!(completed.result, Some(json!({ "deleted": true })));

        let proofs = f.ledger.list_proofs(&f.org.id, &activity.id).unwrap();
        let types: Vec<_> = proofs.iter().map(|p| p.proof_type).collect();
        assert!(types.contains(&ProofType::Approval));
        assert!(types.contains(&ProofType::EnclaveAttestation));

        let signature = proofs
            .iter()
            .find(|p| p.proof_type == ProofType::Signature)
            .unwrap();
        assert!(verify_activity_signature(&completed, signature));

        let mut tampered = completed.clone();
        tampered.result = Some(json!({ "deleted": false }));
        assert!(!verify_activity_signature(&tampered, signature));

        assert!(matches!(f.ledger.fail(&activity.id, "late"), Err(ServiceError::Conflict(_))));
    }

    #[test]
    fn failure_keeps_the_reason() {
        let f = setup();
        let activity = f
            .ledger
            .create_activity(&f.org.id, ActivityType::CreateWallet, json!({}), "u1")
            .unwrap();

        let failed = f.ledger.fail(&activity.id, "enclave unavailable: timeout").unwrap();
        assert_eq!(failed.status, ActivityStatus::Failed);
        assert!(failed.result.is_none());

        let stored = f.ledger.get_activity(&f.org.id, &activity.id).unwrap();
        assert_eq!(stored.failure_reason.as_deref(), Some("enclave unavailable: timeout"));
        assert!(matches!(
            f.ledger.complete(&activity.id, json!({}), vec![]),
            Err(ServiceError::Conflict(_))
        ));
    }

    #[test]
    fn approvals_are_distinct_and_claim_once() {
        let f = setup();
        let bob = f.member("bob");
        let carol = f.member("carol");
        f.set_threshold(2);

        let activity = f
            .ledger
            .create_approved_activity(&f.org.id, ActivityType::UpdateRootQuorum, json!({ "threshold": 3 }), &f.root.id)
            .unwrap();
        assert!(!activity.executing);

        assert!(matches!(
            f.ledger.record_approval(&activity.id, &f.root.id),
            Err(ServiceError::Conflict(_))
        ));
        let approved = f.ledger.record_approval(&activity.id, &bob.id).unwrap();
        assert_eq!(approved.approvals, vec![f.root.id.clone(), bob.id.clone()]);
        assert!(approved.executing);
        assert_eq!(f.ledger.list_proofs(&f.org.id, &activity.id).unwrap().len(), 2);

        // Claimed: a later approval cannot trigger a second execution.
        assert!(matches!(
            f.ledger.record_approval(&activity.id, &carol.id),
            Err(ServiceError::Conflict(_))
        ));
    }

    #[test]
    fn lowered_threshold_lets_the_next_approval_claim() {
        let f = setup();
        let bob = f.member("bob");
        f.set_threshold(2);

        let first = f
            .ledger
            .create_approved_activity(&f.org.id, ActivityType::CreateWallet, json!({ "n": 1 }), &f.root.id)
            .unwrap();
        let second = f
            .ledger
            .create_approved_activity(&f.org.id, ActivityType::CreateWallet, json!({ "n": 2 }), &f.root.id)
            .unwrap();
        assert!(!first.executing);
        assert!(!second.executing);

        f.set_threshold(1);
        assert!(f.ledger.record_approval(&first.id, &bob.id).unwrap().executing);

        // A repeated approval is accepted when it is the one completing the claim.
        let claimed = f.ledger.record_approval(&second.id, &f.root.id).unwrap();
        assert!(claimed.executing);
        assert_eq!(claimed.approvals, vec![f.root.id.clone()]);
    }

    #[test]
    fn approvals_of_removed_members_do_not_count() {
        let f = setup();
        let bob = f.member("bob");
        let carol = f.member("carol");
        f.set_threshold(2);

        let activity = f
            .ledger
            .create_approved_activity(&f.org.id, ActivityType::CreateWallet, json!({}), &bob.id)
            .unwrap();
        OrganizationRepository::new(&f.db)
            .remove_member(&f.org.id, &bob.id)
            .unwrap();

        // Root plus a departed bob is one counted approval.
        let approved = f.ledger.record_approval(&activity.id, &f.root.id).unwrap();
        assert!(!approved.executing);

        let approved = f.ledger.record_approval(&activity.id, &carol.id).unwrap();
        assert!(approved.executing);
    }

    #[test]
    fn claimed_activities_cannot_be_rejected() {
        let f = setup();
        let pending = f
            .ledger
            .create_activity(&f.org.id, ActivityType::CreateWallet, json!({}), &f.root.id)
            .unwrap();
        let rejected = f.ledger.reject(&pending.id, "rejected by root").unwrap();
        assert_eq!(rejected.status, ActivityStatus::Failed);

        let claimed = f
            .ledger
            .create_approved_activity(&f.org.id, ActivityType::CreateWallet, json!({}), &f.root.id)
            .unwrap();
        assert!(matches!(
            f.ledger.reject(&claimed.id, "too late"),
            Err(ServiceError::Conflict(_))
        ));
        let failed = f.ledger.fail(&claimed.id, "enclave unavailable: timeout").unwrap();
        assert_eq!(failed.status, ActivityStatus::Failed);
    }

    #[test]
    fn reads_are_scoped_to_the_organization() {
        let f = setup();
        let activity = f
            .ledger
            .create_activity(&f.org.id, ActivityType::CreateUser, json!({}), "u1")
            .unwrap();

        assert!(matches!(
            f.ledger.get_activity("other", &activity.id),
            Err(ServiceError::NotFound(_))
        ));
        assert!(f.ledger.list_proofs("other", &activity.id).is_err());
        assert!(f
            .ledger
            .list_activities("other", None, &PageRequest::default())
            .unwrap()
            .items
            .is_empty());
    }
}
