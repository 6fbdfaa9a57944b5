// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Custody Service
//!
//! Façade composing the authority, wallet engine, activity ledger and session
//! manager behind the operations the HTTP surface invokes.
//!
//! ## Privileged requests
//!
//! 1. The principal must be an active root quorum member.
//! 2. The request is validated before anything is written.
//! 3. A PENDING activity is recorded with the submitter's approval.
//! 4. The approval that brings the active members' count to the threshold
//!    claims the activity and executes it: success completes the activity,
//!    failure moves it to FAILED.
//!
//! Every read is scoped to the principal's organization.

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::auth::Role;
use crate::authority::{
    Authority, IdentityAssertion, NewAuthMethod, NewUser, OrganizationUpdate, UserUpdate,
};
use crate::config::AppConfig;
use crate::derivation::SeedValidation;
use crate::enclave::{EnclaveClient, EnclaveInfo};
use crate::error::{ServiceError, ServiceResult};
use crate::ledger::{ActivityLedger, ProofSigner};
use crate::models::{
    Activity, ActivityType, AuthMethod, EmailPolicy, Organization, Proof, ProofType, QuorumMember,
    User, Wallet, WalletAccount,
};
use crate::session::{CacheStore, IssuedSession, SessionData, SessionManager};
use crate::storage::{Database, Page, PageRequest};
use crate::wallet::{CreateWalletRequest, WalletEngine};

/// Attempts to take the bootstrap lock before giving up.
pub const BOOTSTRAP_LOCK_ATTEMPTS: u32 = 20;
pub const BOOTSTRAP_LOCK_RETRY_DELAY: Duration = Duration::from_millis(50);

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MemberParams {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ThresholdParams {
    pub threshold: u32,
}

/// Target user and the fields to change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UpdateUserParams {
    pub user_id: String,
    #[serde(flatten)]
    pub update: UserUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeleteWalletParams {
    pub wallet_id: String,
    #[serde(default)]
    pub delete_without_export: bool,
}

/// Privileged operation submitted by a quorum member.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityRequest {
    UpdateOrganization(OrganizationUpdate),
    CreateUser(NewUser),
    UpdateUser(UpdateUserParams),
    CreateAuthMethod(NewAuthMethod),
    AddQuorumMember(MemberParams),
    RemoveQuorumMember(MemberParams),
    UpdateRootQuorum(ThresholdParams),
    CreateWallet(CreateWalletRequest),
    DeleteWallet(DeleteWalletParams),
}

fn to_json<T: Serialize>(value: &T) -> ServiceResult<Value> {
    serde_json::to_value(value).map_err(|e| ServiceError::internal(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(parameters: Value) -> ServiceResult<T> {
    serde_json::from_value(parameters)
        .map_err(|e| ServiceError::validation(format!("invalid parameters: {e}")))
}

impl ActivityRequest {
    /// Parse a submitted `(type, parameters)` pair.
    pub fn from_parts(activity_type: ActivityType, parameters: Value) -> ServiceResult<Self> {
        Ok(match activity_type {
            ActivityType::UpdateOrganization => Self::UpdateOrganization(from_json(parameters)?),
            ActivityType::CreateUser => Self::CreateUser(from_json(parameters)?),
            ActivityType::UpdateUser => Self::UpdateUser(from_json(parameters)?),
            ActivityType::CreateAuthMethod => Self::CreateAuthMethod(from_json(parameters)?),
            ActivityType::AddQuorumMember => Self::AddQuorumMember(from_json(parameters)?),
            ActivityType::RemoveQuorumMember => Self::RemoveQuorumMember(from_json(parameters)?),
            ActivityType::UpdateRootQuorum => Self::UpdateRootQuorum(from_json(parameters)?),
            ActivityType::CreateWallet => Self::CreateWallet(from_json(parameters)?),
            ActivityType::DeleteWallet => Self::DeleteWallet(from_json(parameters)?),
            ActivityType::CreateOrganization | ActivityType::EnrollUser => {
                return Err(ServiceError::validation(format!(
                    "{activity_type} cannot be submitted as an activity"
                )))
            }
        })
    }

    pub fn activity_type(&self) -> ActivityType {
        match self {
            Self::UpdateOrganization(_) => ActivityType::UpdateOrganization,
            Self::CreateUser(_) => ActivityType::CreateUser,
            Self::UpdateUser(_) => ActivityType::UpdateUser,
            Self::CreateAuthMethod(_) => ActivityType::CreateAuthMethod,
            Self::AddQuorumMember(_) => ActivityType::AddQuorumMember,
            Self::RemoveQuorumMember(_) => ActivityType::RemoveQuorumMember,
            Self::UpdateRootQuorum(_) => ActivityType::UpdateRootQuorum,
            Self::CreateWallet(_) => ActivityType::CreateWallet,
            Self::DeleteWallet(_) => ActivityType::DeleteWallet,
        }
    }

    pub fn parameters(&self) -> ServiceResult<Value> {
        match self {
            Self::UpdateOrganization(p) => to_json(p),
            Self::CreateUser(p) => to_json(p),
            Self::UpdateUser(p) => to_json(p),
            Self::CreateAuthMethod(p) => to_json(p),
            Self::AddQuorumMember(p) | Self::RemoveQuorumMember(p) => to_json(p),
            Self::UpdateRootQuorum(p) => to_json(p),
            Self::CreateWallet(p) => to_json(p),
            Self::DeleteWallet(p) => to_json(p),
        }
    }

    /// Stateless checks run before any activity is recorded.
    fn validate(&self) -> ServiceResult<()> {
        match self {
            Self::UpdateOrganization(update) => match &update.name {
                Some(name) if name.trim().is_empty() => {
                    Err(ServiceError::validation("organization name must not be empty"))
                }
                _ => Ok(()),
            },
            Self::CreateUser(new_user) => Authority::validate_new_user(new_user),
            Self::UpdateUser(p) => {
                if p.user_id.trim().is_empty() {
                    Err(ServiceError::validation("user_id must not be empty"))
                } else {
                    Ok(())
                }
            }
            Self::CreateAuthMethod(method) => Authority::validate_new_auth_method(method),
            Self::AddQuorumMember(p) | Self::RemoveQuorumMember(p) => {
                if p.user_id.trim().is_empty() {
                    Err(ServiceError::validation("user_id must not be empty"))
                } else {
                    Ok(())
                }
            }
            Self::UpdateRootQuorum(p) => {
                if p.threshold == 0 {
                    Err(ServiceError::validation("threshold must be at least 1"))
                } else {
                    Ok(())
                }
            }
            Self::CreateWallet(request) => request.validate().map(|_| ()),
            Self::DeleteWallet(p) => {
                if p.wallet_id.trim().is_empty() {
                    Err(ServiceError::validation("wallet_id must not be empty"))
                } else {
                    Ok(())
                }
            }
        }
    }
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CreatedOrganization {
    pub organization: Organization,
    pub user: User,
    pub activity: Activity,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoginOutcome {
    pub session: IssuedSession,
    pub organization_id: String,
    pub user: User,
    /// Whether this sign-in provisioned a new organization.
    pub enrolled: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReadinessReport {
    pub store: bool,
    pub cache: bool,
    pub cache_backend: String,
    pub enclave: bool,
}

impl ReadinessReport {
    /// The service can take traffic without the enclave; only wallet creation needs it.
    pub fn is_ready(&self) -> bool {
        self.store && self.cache
    }
}

// =============================================================================
// Service
// =============================================================================

pub struct CustodyService {
    db: Arc<Database>,
    authority: Authority,
    wallets: WalletEngine,
    ledger: ActivityLedger,
    sessions: SessionManager,
    bootstrap_lock_ttl: Duration,
}

impl CustodyService {
    pub fn new(
        config: &AppConfig,
        db: Arc<Database>,
        enclave: Arc<dyn EnclaveClient>,
        cache: Arc<dyn CacheStore>,
    ) -> ServiceResult<Self> {
        let signer = match &config.ledger_signing_key {
            Some(secret) => ProofSigner::from_bytes(secret)?,
            None => {
                warn!("LEDGER_SIGNING_KEY not set, activity signatures use an ephemeral key");
                ProofSigner::random()
            }
        };
        info!(public_key = %signer.public_key_hex(), "ledger signing key loaded");

        Ok(Self {
            authority: Authority::new(db.clone(), config.default_quorum_threshold),
            wallets: WalletEngine::new(
                db.clone(),
                enclave,
                config.enclave_timeout,
                config.address_collision_policy,
            ),
            ledger: ActivityLedger::new(db.clone(), signer),
            sessions: SessionManager::new(cache, config.session_ttl),
            bootstrap_lock_ttl: config.bootstrap_lock_ttl,
            db,
        })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn ledger(&self) -> &ActivityLedger {
        &self.ledger
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    // =========================================================================
    // Bootstrap
    // =========================================================================

    /// Create an organization with its first user and record the bootstrap activity.
    pub fn create_organization(
        &self,
        name: &str,
        initial_user_email: &str,
        initial_user_public_key: &str,
        policy: EmailPolicy,
    ) -> ServiceResult<CreatedOrganization> {
        let (organization, user) = self.authority.create_organization(
            name,
            initial_user_email,
            initial_user_public_key,
            policy,
        )?;

        let activity = self.ledger.create_activity(
            &organization.id,
            ActivityType::CreateOrganization,
            json!({ "name": organization.name, "initial_user_email": user.email }),
            &user.id,
        )?;
        let activity = self.ledger.complete(
            &activity.id,
            json!({ "organization_id": organization.id, "user_id": user.id }),
            vec![],
        )?;

        Ok(CreatedOrganization {
            organization,
            user,
            activity,
        })
    }

    /// Sign in with an external identity, enrolling it on first use.
    pub async fn login_with_identity(
        &self,
        identity: &IdentityAssertion,
        provider: &str,
    ) -> ServiceResult<LoginOutcome> {
        identity.validate()?;
        if let Some(outcome) = self.sign_in_existing(identity, provider).await? {
            return Ok(outcome);
        }

        let lock = format!("bootstrap:{}", identity.email.trim().to_lowercase());
        let Some(held) = self
            .sessions
            .acquire_lock_with_retry(
                &lock,
                self.bootstrap_lock_ttl,
                BOOTSTRAP_LOCK_ATTEMPTS,
                BOOTSTRAP_LOCK_RETRY_DELAY,
            )
            .await?
        else {
            return Err(ServiceError::conflict(
                "another sign-in for this identity is in progress",
            ));
        };

        let outcome = self.enroll_locked(identity, provider).await;
        if let Err(e) = self.sessions.release_lock(&held).await {
            warn!(error = %e, "failed to release bootstrap lock");
        }
        outcome
    }

    async fn sign_in_existing(
        &self,
        identity: &IdentityAssertion,
        provider: &str,
    ) -> ServiceResult<Option<LoginOutcome>> {
        let Some(method) = self
            .authority
            .find_auth_method_by_subject(provider, &identity.subject_id)?
        else {
            return Ok(None);
        };

        let user = self.authority.get_user(&method.organization_id, &method.user_id)?;
        if !user.is_active {
            return Err(ServiceError::permission_denied("user is deactivated"));
        }
        let session = self.issue_session(&user, &method, provider).await?;
        Ok(Some(LoginOutcome {
            session,
            organization_id: user.organization_id.clone(),
            user,
            enrolled: false,
        }))
    }

    async fn enroll_locked(&self, identity: &IdentityAssertion, provider: &str) -> ServiceResult<LoginOutcome> {
        // A concurrent sign-in may have enrolled the subject while we waited.
        if let Some(outcome) = self.sign_in_existing(identity, provider).await? {
            return Ok(outcome);
        }

        let (organization, user, method) = self.authority.enroll_from_identity(identity, provider)?;
        let activity = self.ledger.create_activity(
            &organization.id,
            ActivityType::EnrollUser,
            json!({ "email": identity.email, "provider": provider, "subject_id": identity.subject_id }),
            &user.id,
        )?;
        self.ledger.complete(
            &activity.id,
            json!({
                "organization_id": organization.id,
                "user_id": user.id,
                "auth_method_id": method.id,
            }),
            vec![],
        )?;

        let session = self.issue_session(&user, &method, provider).await?;
        Ok(LoginOutcome {
            session,
            organization_id: organization.id,
            user,
            enrolled: true,
        })
    }

    async fn issue_session(&self, user: &User, method: &AuthMethod, provider: &str) -> ServiceResult<IssuedSession> {
        let is_member = self
            .authority
            .is_quorum_member(&user.organization_id, &user.id)?;
        self.sessions
            .create_session(
                user,
                Some(method),
                Some(provider),
                Role::for_quorum_membership(is_member),
            )
            .await
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    pub async fn validate_session(&self, token: &str) -> ServiceResult<SessionData> {
        self.sessions.validate(token).await
    }

    pub async fn refresh_session(&self, token: &str, ttl: Option<Duration>) -> ServiceResult<SessionData> {
        self.sessions.refresh(token, ttl).await
    }

    pub async fn logout(&self, token: &str) -> ServiceResult<()> {
        self.sessions.destroy(token).await
    }

    // =========================================================================
    // Privileged requests
    // =========================================================================

    /// Record a privileged request and execute it once approved by the quorum.
    ///
    /// Returns the activity as recorded: COMPLETED when the submitter's own
    /// approval meets the threshold, PENDING otherwise. An execution failure
    /// leaves the activity FAILED and is returned as the error.
    pub async fn submit(&self, principal: &SessionData, request: ActivityRequest) -> ServiceResult<Activity> {
        let organization_id = &principal.organization_id;
        self.authority
            .require_quorum_member(organization_id, &principal.user_id)?;
        request.validate()?;
        if let ActivityRequest::DeleteWallet(p) = &request {
            self.wallets
                .check_delete(organization_id, &p.wallet_id, p.delete_without_export)?;
        }

        let activity = self.ledger.create_approved_activity(
            organization_id,
            request.activity_type(),
            request.parameters()?,
            &principal.user_id,
        )?;

        if !activity.executing {
            info!(activity_id = %activity.id, "activity awaiting approvals");
            return Ok(activity);
        }
        self.execute(&activity, request).await
    }

    /// Add the principal's approval; executes the activity when it meets the threshold.
    pub async fn approve_activity(&self, principal: &SessionData, activity_id: &str) -> ServiceResult<Activity> {
        let organization_id = &principal.organization_id;
        self.authority
            .require_quorum_member(organization_id, &principal.user_id)?;
        let activity = self.ledger.get_activity(organization_id, activity_id)?;
        let request = ActivityRequest::from_parts(activity.activity_type, activity.parameters.clone())?;

        let activity = self.ledger.record_approval(activity_id, &principal.user_id)?;
        if !activity.executing {
            return Ok(activity);
        }
        self.execute(&activity, request).await
    }

    /// Move a pending activity to FAILED on a quorum member's behalf.
    ///
    /// An activity already claimed for execution is a conflict.
    pub fn reject_activity(
        &self,
        principal: &SessionData,
        activity_id: &str,
        reason: Option<&str>,
    ) -> ServiceResult<Activity> {
        let organization_id = &principal.organization_id;
        self.authority
            .require_quorum_member(organization_id, &principal.user_id)?;
        self.ledger.get_activity(organization_id, activity_id)?;

        let reason = match reason.map(str::trim).filter(|r| !r.is_empty()) {
            Some(r) => format!("rejected by {}: {r}", principal.user_id),
            None => format!("rejected by {}", principal.user_id),
        };
        self.ledger.reject(activity_id, &reason)
    }

    async fn execute(&self, activity: &Activity, request: ActivityRequest) -> ServiceResult<Activity> {
        match self.perform(activity, request).await {
            Ok((result, proofs)) => self.ledger.complete(&activity.id, result, proofs),
            Err(e) => {
                if let Err(fail_err) = self.ledger.fail(&activity.id, &e.to_string()) {
                    warn!(activity_id = %activity.id, error = %fail_err, "could not mark activity failed");
                }
                Err(e)
            }
        }
    }

    async fn perform(
        &self,
        activity: &Activity,
        request: ActivityRequest,
    ) -> ServiceResult<(Value, Vec<(ProofType, Value)>)> {
        let org = activity.organization_id.as_str();
        Ok(match request {
            ActivityRequest::UpdateOrganization(update) => {
                let organization = self.authority.update_organization(org, &update)?;
                (json!({ "organization": to_json(&organization)? }), vec![])
            }
            ActivityRequest::CreateUser(new_user) => {
                let user = self.authority.create_user(org, &new_user)?;
                (json!({ "user": to_json(&user)? }), vec![])
            }
            ActivityRequest::UpdateUser(p) => {
                let user = self.authority.update_user(org, &p.user_id, &p.update)?;
                (json!({ "user": to_json(&user)? }), vec![])
            }
            ActivityRequest::CreateAuthMethod(method) => {
                let method = self.authority.create_auth_method(org, &method)?;
                (json!({ "auth_method_id": method.id, "user_id": method.user_id }), vec![])
            }
            ActivityRequest::AddQuorumMember(p) => {
                let organization = self.authority.add_quorum_member(org, &p.user_id)?;
                (json!({ "organization_version": organization.version }), vec![])
            }
            ActivityRequest::RemoveQuorumMember(p) => {
                let organization = self.authority.remove_quorum_member(org, &p.user_id)?;
                (json!({ "organization_version": organization.version }), vec![])
            }
            ActivityRequest::UpdateRootQuorum(p) => {
                let organization = self.authority.update_root_quorum(org, p.threshold)?;
                (
                    json!({
                        "organization_version": organization.version,
                        "threshold": organization.root_quorum.threshold,
                    }),
                    vec![],
                )
            }
            ActivityRequest::CreateWallet(request) => {
                let created = self
                    .wallets
                    .create_wallet(org, &activity.created_by, &request)
                    .await?;
                (
                    json!({
                        "wallet_id": created.wallet.id,
                        "addresses": created.addresses,
                        "account_ids": created.accounts.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(),
                    }),
                    vec![(
                        ProofType::EnclaveAttestation,
                        json!({ "request_id": created.enclave_request_id }),
                    )],
                )
            }
            ActivityRequest::DeleteWallet(p) => {
                let deleted = self
                    .wallets
                    .delete_wallet(org, &p.wallet_id, p.delete_without_export)?;
                (
                    json!({ "wallet_id": p.wallet_id, "deleted": deleted.is_some() }),
                    vec![],
                )
            }
        })
    }

    // =========================================================================
    // Scoped reads
    // =========================================================================

    fn own_organization(principal: &SessionData, organization_id: &str) -> ServiceResult<()> {
        if principal.organization_id == organization_id {
            Ok(())
        } else {
            Err(ServiceError::not_found("organization not found"))
        }
    }

    pub fn get_organization(&self, principal: &SessionData, organization_id: &str) -> ServiceResult<Organization> {
        Self::own_organization(principal, organization_id)?;
        self.authority.get_organization(organization_id)
    }

    pub fn list_users(
        &self,
        principal: &SessionData,
        organization_id: &str,
        page: &PageRequest,
    ) -> ServiceResult<Page<User>> {
        Self::own_organization(principal, organization_id)?;
        self.authority.list_users(organization_id, page)
    }

    pub fn get_user(&self, principal: &SessionData, user_id: &str) -> ServiceResult<User> {
        self.authority.get_user(&principal.organization_id, user_id)
    }

    /// Change a user's tags or active flag through an `UPDATE_USER` activity.
    pub async fn update_user(
        &self,
        principal: &SessionData,
        user_id: &str,
        update: UserUpdate,
    ) -> ServiceResult<Activity> {
        self.authority.get_user(&principal.organization_id, user_id)?;
        self.submit(
            principal,
            ActivityRequest::UpdateUser(UpdateUserParams {
                user_id: user_id.to_string(),
                update,
            }),
        )
        .await
    }

    pub fn list_auth_methods(&self, principal: &SessionData, user_id: &str) -> ServiceResult<Vec<AuthMethod>> {
        self.authority
            .list_auth_methods(&principal.organization_id, user_id)
    }

    /// Deactivate a credential. Users may deactivate their own; root members any.
    pub fn deactivate_auth_method(&self, principal: &SessionData, auth_method_id: &str) -> ServiceResult<AuthMethod> {
        let method = self.authority.get_auth_method(auth_method_id)?;
        if method.user_id != principal.user_id {
            self.authority
                .require_quorum_member(&principal.organization_id, &principal.user_id)?;
        }
        self.authority
            .deactivate_auth_method(&principal.organization_id, auth_method_id)
    }

    pub fn list_quorum_members(&self, principal: &SessionData) -> ServiceResult<Vec<QuorumMember>> {
        self.authority.list_quorum_members(&principal.organization_id)
    }

    pub fn get_activity(&self, principal: &SessionData, activity_id: &str) -> ServiceResult<Activity> {
        self.ledger.get_activity(&principal.organization_id, activity_id)
    }

    pub fn list_activities(
        &self,
        principal: &SessionData,
        activity_type: Option<&str>,
        page: &PageRequest,
    ) -> ServiceResult<Page<Activity>> {
        let activity_type = activity_type
            .filter(|t| !t.is_empty())
            .map(str::parse::<ActivityType>)
            .transpose()?;
        self.ledger
            .list_activities(&principal.organization_id, activity_type, page)
    }

    pub fn list_proofs(&self, principal: &SessionData, activity_id: &str) -> ServiceResult<Vec<Proof>> {
        self.ledger.list_proofs(&principal.organization_id, activity_id)
    }

    pub fn get_wallet(&self, principal: &SessionData, wallet_id: &str) -> ServiceResult<Wallet> {
        self.wallets.get_wallet(&principal.organization_id, wallet_id)
    }

    pub fn list_wallets(&self, principal: &SessionData, page: &PageRequest) -> ServiceResult<Page<Wallet>> {
        self.wallets.list_wallets(&principal.organization_id, page)
    }

    pub fn list_accounts(&self, principal: &SessionData, wallet_id: &str) -> ServiceResult<Vec<WalletAccount>> {
        self.wallets.list_accounts(&principal.organization_id, wallet_id)
    }

    // =========================================================================
    // Enclave & health
    // =========================================================================

    pub async fn validate_seed(&self, seed_phrase: &str) -> ServiceResult<SeedValidation> {
        self.wallets.validate_seed(seed_phrase).await
    }

    pub async fn enclave_info(&self) -> ServiceResult<EnclaveInfo> {
        self.wallets.enclave_info().await
    }

    pub async fn readiness(&self) -> ReadinessReport {
        let store = self.db.ping().is_ok();
        let cache = self.sessions.cache().ping().await.is_ok();
        let enclave = self.wallets.enclave_info().await.is_ok();
        ReadinessReport {
            store,
            cache,
            cache_backend: self.sessions.cache().backend().to_string(),
            enclave,
        }
    }
}
