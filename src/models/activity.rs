// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::error::ServiceError;
use crate::storage::{Record, RowTable};

/// Known privileged operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum ActivityType {
    #[serde(rename = "ACTIVITY_TYPE_CREATE_ORGANIZATION")]
    CreateOrganization,
    #[serde(rename = "ACTIVITY_TYPE_UPDATE_ORGANIZATION")]
    UpdateOrganization,
    #[serde(rename = "ACTIVITY_TYPE_CREATE_USER")]
    CreateUser,
    #[serde(rename = "ACTIVITY_TYPE_UPDATE_USER")]
    UpdateUser,
    #[serde(rename = "ACTIVITY_TYPE_CREATE_AUTH_METHOD")]
    CreateAuthMethod,
    #[serde(rename = "ACTIVITY_TYPE_ADD_QUORUM_MEMBER")]
    AddQuorumMember,
    #[serde(rename = "ACTIVITY_TYPE_REMOVE_QUORUM_MEMBER")]
    RemoveQuorumMember,
    #[serde(rename = "ACTIVITY_TYPE_UPDATE_ROOT_QUORUM")]
    UpdateRootQuorum,
    #[serde(rename = "ACTIVITY_TYPE_CREATE_WALLET")]
    CreateWallet,
    #[serde(rename = "ACTIVITY_TYPE_DELETE_WALLET")]
    DeleteWallet,
    #[serde(rename = "ACTIVITY_TYPE_ENROLL_USER")]
    EnrollUser,
}

impl ActivityType {
    pub const ALL: [ActivityType; 11] = [
        ActivityType::CreateOrganization,
        ActivityType::UpdateOrganization,
        ActivityType::CreateUser,
        ActivityType::UpdateUser,
        ActivityType::CreateAuthMethod,
        ActivityType::AddQuorumMember,
        ActivityType::RemoveQuorumMember,
        ActivityType::UpdateRootQuorum,
        ActivityType::CreateWallet,
        ActivityType::DeleteWallet,
        ActivityType::EnrollUser,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::CreateOrganization => "ACTIVITY_TYPE_CREATE_ORGANIZATION",
            ActivityType::UpdateOrganization => "ACTIVITY_TYPE_UPDATE_ORGANIZATION",
            ActivityType::CreateUser => "ACTIVITY_TYPE_CREATE_USER",
            ActivityType::UpdateUser => "ACTIVITY_TYPE_UPDATE_USER",
            ActivityType::CreateAuthMethod => "ACTIVITY_TYPE_CREATE_AUTH_METHOD",
            ActivityType::AddQuorumMember => "ACTIVITY_TYPE_ADD_QUORUM_MEMBER",
            ActivityType::RemoveQuorumMember => "ACTIVITY_TYPE_REMOVE_QUORUM_MEMBER",
            ActivityType::UpdateRootQuorum => "ACTIVITY_TYPE_UPDATE_ROOT_QUORUM",
            ActivityType::CreateWallet => "ACTIVITY_TYPE_CREATE_WALLET",
            ActivityType::DeleteWallet => "ACTIVITY_TYPE_DELETE_WALLET",
            ActivityType::EnrollUser => "ACTIVITY_TYPE_ENROLL_USER",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityType {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActivityType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ServiceError::validation(format!("unknown activity type: {s}")))
    }
}

/// `PENDING -> COMPLETED | FAILED`; both outcomes are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum ActivityStatus {
    #[serde(rename = "ACTIVITY_STATUS_PENDING")]
    Pending,
    #[serde(rename = "ACTIVITY_STATUS_COMPLETED")]
    Completed,
    #[serde(rename = "ACTIVITY_STATUS_FAILED")]
    Failed,
}

impl ActivityStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ActivityStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Pending => "ACTIVITY_STATUS_PENDING",
            ActivityStatus::Completed => "ACTIVITY_STATUS_COMPLETED",
            ActivityStatus::Failed => "ACTIVITY_STATUS_FAILED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Intent {
    /// Hex SHA-256 over the type and canonical parameters.
    pub fingerprint: String,
    pub summary: String,
}

/// Recorded unit of privileged work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Activity {
    pub id: String,
    pub organization_id: String,
    pub activity_type: ActivityType,
    pub status: ActivityStatus,
    #[schema(value_type = Object)]
    pub parameters: Value,
    pub intent: Intent,
    /// Present only once COMPLETED.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_by: String,
    /// Distinct quorum members that approved, in approval order.
    #[serde(default)]
    pub approvals: Vec<String>,
    /// Set in the transaction where approvals met the threshold. From then on
    /// only the executor may move the activity out of PENDING.
    #[serde(default)]
    pub executing: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Activity {
    const TABLE: RowTable = TableDefinition::new("activities");

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum ProofType {
    /// Ledger signature over the terminal state.
    #[serde(rename = "PROOF_TYPE_SIGNATURE")]
    Signature,
    /// A quorum member's approval.
    #[serde(rename = "PROOF_TYPE_APPROVAL")]
    Approval,
    /// Enclave request that minted the key material.
    #[serde(rename = "PROOF_TYPE_ENCLAVE_ATTESTATION")]
    EnclaveAttestation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Proof {
    pub id: String,
    pub activity_id: String,
    pub proof_type: ProofType,
    #[schema(value_type = Object)]
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

impl Proof {
    pub fn new(activity_id: &str, proof_type: ProofType, data: Value) -> Self {
        Self {
            id: super::new_id(),
            activity_id: activity_id.to_string(),
            proof_type,
            data,
            created_at: Utc::now(),
        }
    }
}

impl Record for Proof {
    const TABLE: RowTable = TableDefinition::new("proofs");

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_type_names_round_trip() {
        for t in ActivityType::ALL {
            assert_eq!(t.as_str().parse::<ActivityType>().unwrap(), t);
            assert_eq!(serde_json::to_value(t).unwrap(), Value::String(t.as_str().into()));
        }
        assert!(matches!(
            "ACTIVITY_TYPE_MINT_COINS".parse::<ActivityType>(),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn only_pending_is_open() {
        assert!(!ActivityStatus::Pending.is_terminal());
        assert!(ActivityStatus::Completed.is_terminal());
        assert!(ActivityStatus::Failed.is_terminal());
    }
}
