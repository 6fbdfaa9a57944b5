// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Quorum & Organization Authority
//!
//! Owns tenants, their users and credentials, and the root quorum that
//! decides which principals may request privileged operations.
//!
//! ## Invariants
//!
//! - An organization is created atomically with its first user, who is the
//!   sole member of a threshold-1 root quorum.
//! - `1 <= threshold <= quorum member count` holds after every operation.
//! - Usernames are unique per organization, emails globally.
//!
//! Reads are scoped: an entity of another organization is reported as not found.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::error::{ServiceError, ServiceResult};
use crate::models::{
    normalize_tags, AuthMethod, AuthMethodType, EmailPolicy, Organization, QuorumMember, User,
};
use crate::storage::{Database, OrganizationRepository, Page, PageRequest, UserRepository};

/// Username of users provisioned from an identity assertion.
pub const ROOT_USERNAME: &str = "Root user";

/// Identity asserted by an external provider (e.g. an OAuth profile).
#[derive(Clone, Serialize, Deserialize, ToSchema)]
pub struct IdentityAssertion {
    pub subject_id: String,
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for IdentityAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityAssertion")
            .field("subject_id", &self.subject_id)
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl IdentityAssertion {
    pub fn validate(&self) -> ServiceResult<()> {
        if self.subject_id.trim().is_empty() {
            return Err(ServiceError::validation("identity subject is required"));
        }
        validate_email(&self.email)
    }

    fn organization_name(&self) -> String {
        let display = self.display_name.trim();
        let display = if display.is_empty() {
            self.email.split('@').next().unwrap_or(&self.email)
        } else {
            display
        };
        format!("{display}'s Organization")
    }
}

/// Partial organization update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OrganizationUpdate {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub public_key: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial user update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserUpdate {
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NewAuthMethod {
    pub user_id: String,
    pub method_type: AuthMethodType,
    pub name: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: Value,
}

fn validate_email(email: &str) -> ServiceResult<()> {
    match email.trim().split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(ServiceError::validation("a valid email is required")),
    }
}

fn require_non_empty(value: &str, what: &str) -> ServiceResult<()> {
    if value.trim().is_empty() {
        Err(ServiceError::validation(format!("{what} must not be empty")))
    } else {
        Ok(())
    }
}

pub struct Authority {
    db: Arc<Database>,
    default_threshold: u32,
}

impl Authority {
    pub fn new(db: Arc<Database>, default_threshold: u32) -> Self {
        Self {
            db,
            default_threshold: default_threshold.max(1),
        }
    }

    fn orgs(&self) -> OrganizationRepository<'_> {
        OrganizationRepository::new(&self.db)
    }

    fn users(&self) -> UserRepository<'_> {
        UserRepository::new(&self.db)
    }

    /// Threshold of a freshly bootstrapped quorum. It can never exceed the
    /// single initial member.
    fn bootstrap_threshold(&self) -> u32 {
        if self.default_threshold > 1 {
            warn!(
                configured = self.default_threshold,
                "default quorum threshold exceeds the bootstrap member count, using 1"
            );
        }
        1
    }

    // =========================================================================
    // Organizations
    // =========================================================================

    pub fn create_organization(
        &self,
        name: &str,
        initial_user_email: &str,
        initial_user_public_key: &str,
        policy: EmailPolicy,
    ) -> ServiceResult<(Organization, User)> {
        require_non_empty(name, "organization name")?;
        require_non_empty(initial_user_public_key, "public key")?;
        validate_email(initial_user_email)?;

        let org = Organization::new(name.trim(), self.bootstrap_threshold());
        let user = User::new(
            &org.id,
            ROOT_USERNAME,
            initial_user_email.trim(),
            initial_user_public_key.trim(),
            vec![],
        );
        let (user, _) = self.orgs().create_with_root_user(&org, user, policy, None)?;

        info!(organization_id = %org.id, user_id = %user.id, "organization created");
        Ok((org, user))
    }

    pub fn get_organization(&self, organization_id: &str) -> ServiceResult<Organization> {
        self.orgs()
            .get(organization_id)?
            .ok_or_else(|| ServiceError::not_found("organization not found"))
    }

    pub fn update_organization(
        &self,
        organization_id: &str,
        update: &OrganizationUpdate,
    ) -> ServiceResult<Organization> {
        if let Some(name) = &update.name {
            require_non_empty(name, "organization name")?;
        }
        let org = self.orgs().update(organization_id, |org| {
            if let Some(name) = &update.name {
                org.name = name.trim().to_string();
            }
        })?;
        info!(organization_id, version = %org.version, "organization updated");
        Ok(org)
    }

    pub fn list_organizations(&self, page: &PageRequest) -> ServiceResult<Page<Organization>> {
        Ok(self.orgs().list(page)?)
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub fn validate_new_user(new_user: &NewUser) -> ServiceResult<()> {
        require_non_empty(&new_user.username, "username")?;
        require_non_empty(&new_user.public_key, "public key")?;
        validate_email(&new_user.email)
    }

    pub fn create_user(&self, organization_id: &str, new_user: &NewUser) -> ServiceResult<User> {
        Self::validate_new_user(new_user)?;
        let user = User::new(
            organization_id,
            new_user.username.trim(),
            new_user.email.trim(),
            new_user.public_key.trim(),
            new_user.tags.clone(),
        );
        let user = self.users().create(user, EmailPolicy::Reject)?;
        info!(organization_id, user_id = %user.id, "user created");
        Ok(user)
    }

    pub fn get_user(&self, organization_id: &str, user_id: &str) -> ServiceResult<User> {
        self.users()
            .get(user_id)?
            .filter(|u| u.organization_id == organization_id)
            .ok_or_else(|| ServiceError::not_found("user not found"))
    }

    pub fn list_users(&self, organization_id: &str, page: &PageRequest) -> ServiceResult<Page<User>> {
        Ok(self.users().list_by_org(organization_id, page)?)
    }

    pub fn update_user(
        &self,
        organization_id: &str,
        user_id: &str,
        update: &UserUpdate,
    ) -> ServiceResult<User> {
        self.get_user(organization_id, user_id)?;
        let user = self.users().update(user_id, |user| {
            if let Some(tags) = &update.tags {
                user.tags = normalize_tags(tags.clone());
            }
            if let Some(active) = update.is_active {
                user.is_active = active;
            }
            Ok(())
        })?;
        Ok(user)
    }

    // =========================================================================
    // Auth methods
    // =========================================================================

    pub fn validate_new_auth_method(method: &NewAuthMethod) -> ServiceResult<()> {
        require_non_empty(&method.name, "auth method name")?;
        if method.method_type == AuthMethodType::Oauth {
            let has = |field: &str| {
                method
                    .data
                    .get(field)
                    .and_then(Value::as_str)
                    .is_some_and(|v| !v.is_empty())
            };
            if !has("provider") || !has("subject") {
                return Err(ServiceError::validation(
                    "oauth auth methods need a provider and a subject",
                ));
            }
        }
        Ok(())
    }

    pub fn create_auth_method(
        &self,
        organization_id: &str,
        method: &NewAuthMethod,
    ) -> ServiceResult<AuthMethod> {
        Self::validate_new_auth_method(method)?;
        let user = self.get_user(organization_id, &method.user_id)?;
        let created = self.users().create_auth_method(AuthMethod::new(
            &user,
            method.method_type,
            method.name.trim(),
            method.data.clone(),
        ))?;
        info!(organization_id, user_id = %user.id, auth_method_id = %created.id, "auth method created");
        Ok(created)
    }

    pub fn list_auth_methods(&self, organization_id: &str, user_id: &str) -> ServiceResult<Vec<AuthMethod>> {
        self.get_user(organization_id, user_id)?;
        Ok(self.users().list_auth_methods(user_id)?)
    }

    pub fn get_auth_method(&self, auth_method_id: &str) -> ServiceResult<AuthMethod> {
        self.users()
            .get_auth_method(auth_method_id)?
            .ok_or_else(|| ServiceError::not_found("auth method not found"))
    }

    pub fn deactivate_auth_method(
        &self,
        organization_id: &str,
        auth_method_id: &str,
    ) -> ServiceResult<AuthMethod> {
        let method = self.get_auth_method(auth_method_id)?;
        if method.organization_id != organization_id {
            return Err(ServiceError::not_found("auth method not found"));
        }
        Ok(self.users().deactivate_auth_method(auth_method_id)?)
    }

    pub fn find_auth_method_by_subject(
        &self,
        provider: &str,
        subject: &str,
    ) -> ServiceResult<Option<AuthMethod>> {
        Ok(self
            .users()
            .find_auth_method_by_subject(provider, subject)?
            .filter(|m| m.is_active))
    }

    // =========================================================================
    // Quorum
    // =========================================================================

    pub fn list_quorum_members(&self, organization_id: &str) -> ServiceResult<Vec<QuorumMember>> {
        self.get_organization(organization_id)?;
        Ok(self.orgs().list_members(organization_id)?)
    }

    pub fn is_quorum_member(&self, organization_id: &str, user_id: &str) -> ServiceResult<bool> {
        Ok(self.orgs().is_member(organization_id, user_id)?)
    }

    /// Fail with `PermissionDenied` unless `user_id` is an active root quorum member.
    pub fn require_quorum_member(&self, organization_id: &str, user_id: &str) -> ServiceResult<User> {
        let user = self
            .get_user(organization_id, user_id)
            .map_err(|_| ServiceError::permission_denied("principal is not a quorum member"))?;
        if !user.is_active || !self.is_quorum_member(organization_id, user_id)? {
            return Err(ServiceError::permission_denied(
                "principal is not a quorum member",
            ));
        }
        Ok(user)
    }

    pub fn add_quorum_member(&self, organization_id: &str, user_id: &str) -> ServiceResult<Organization> {
        let org = self.orgs().add_member(organization_id, user_id)?;
        info!(organization_id, user_id, "quorum member added");
        Ok(org)
    }

    pub fn remove_quorum_member(&self, organization_id: &str, user_id: &str) -> ServiceResult<Organization> {
        let org = self.orgs().remove_member(organization_id, user_id)?;
        info!(organization_id, user_id, "quorum member removed");
        Ok(org)
    }

    pub fn update_root_quorum(&self, organization_id: &str, threshold: u32) -> ServiceResult<Organization> {
        if threshold == 0 {
            return Err(ServiceError::validation("threshold must be at least 1"));
        }
        let org = self.orgs().set_threshold(organization_id, threshold)?;
        info!(organization_id, threshold, "root quorum updated");
        Ok(org)
    }

    // =========================================================================
    // Enrollment
    // =========================================================================

    /// Provision a new organization for an external identity.
    ///
    /// The organization is named `"<display name>'s Organization"`, its root
    /// user `"Root user"`. A taken email is suffixed (`local+N@domain`) rather
    /// than rejected.
    pub fn enroll_from_identity(
        &self,
        identity: &IdentityAssertion,
        provider: &str,
    ) -> ServiceResult<(Organization, User, AuthMethod)> {
        identity.validate()?;
        require_non_empty(provider, "identity provider")?;

        let org = Organization::new(identity.organization_name(), self.bootstrap_threshold());
        let user = User::new(&org.id, ROOT_USERNAME, identity.email.trim(), "", vec![]);
        let method = AuthMethod::new(
            &user,
            AuthMethodType::Oauth,
            provider,
            json!({
                "provider": provider,
                "subject": identity.subject_id,
                "email": identity.email,
                "picture": identity.picture,
                "token_expires_at": identity.expires_at,
            }),
        );

        let (user, method) =
            self.orgs()
                .create_with_root_user(&org, user, EmailPolicy::AutoSuffix, Some(method))?;
        let method = method.ok_or_else(|| ServiceError::internal("auth method was not stored"))?;

        info!(
            organization_id = %org.id,
            user_id = %user.id,
            provider,
            suffixed = user.email != identity.email.trim(),
            "identity enrolled"
        );
        Ok((org, user, method))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority() -> (Authority, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.redb")).unwrap();
        (Authority::new(Arc::new(db), 1), dir)
    }

    fn identity(subject: &str, email: &str) -> IdentityAssertion {
        IdentityAssertion {
            subject_id: subject.into(),
            email: email.into(),
            display_name: "Ada".into(),
            picture: None,
            access_token: Some("secret-access".into()),
            refresh_token: None,
            expires_at: None,
        }
    }

    #[test]
    fn acme_scenario() {
        let (authority, _dir) = authority();
        let (org, user) = authority
            .create_organization("Acme", "admin@acme.com", "pk1", EmailPolicy::Reject)
            .unwrap();
        assert_eq!(org.root_quorum.threshold, 1);
        assert_eq!(authority.list_quorum_members(&org.id).unwrap().len(), 1);
        assert_eq!(user.email, "admin@acme.com");

        assert_eq!(authority.get_organization(&org.id).unwrap().name, "Acme");
        authority
            .update_organization(&org.id, &OrganizationUpdate { name: Some("Acme Inc".into()) })
            .unwrap();
        assert_eq!(authority.get_organization(&org.id).unwrap().name, "Acme Inc");

        // Absent fields are unchanged.
        let unchanged = authority
            .update_organization(&org.id, &OrganizationUpdate::default())
            .unwrap();
        assert_eq!(unchanged.name, "Acme Inc");
    }

    #[test]
    fn create_organization_validates_first() {
        let (authority, _dir) = authority();
        for (name, email, pk) in [("", "a@b.c", "pk"), ("Acme", "a@b.c", " "), ("Acme", "nope", "pk")] {
            assert!(matches!(
                authority.create_organization(name, email, pk, EmailPolicy::Reject),
                Err(ServiceError::Validation(_))
            ));
        }
        assert!(authority.list_organizations(&PageRequest::default()).unwrap().items.is_empty());
    }

    #[test]
    fn duplicate_email_conflicts_unless_suffixing() {
        let (authority, _dir) = authority();
        authority
            .create_organization("Acme", "admin@acme.com", "pk1", EmailPolicy::Reject)
            .unwrap();

        assert!(matches!(
            authority.create_organization("Other", "admin@acme.com", "pk2", EmailPolicy::Reject),
            Err(ServiceError::Conflict(_))
        ));

        let (_, user) = authority
            .create_organization("Other", "admin@acme.com", "pk2", EmailPolicy::AutoSuffix)
            .unwrap();
        assert_eq!(user.email, "admin+1@acme.com");
    }

    #[test]
    fn enrollment_with_used_email_suffixes() {
        let (authority, _dir) = authority();
        let (org1, user1, _) = authority
            .enroll_from_identity(&identity("s1", "ada@example.com"), "google")
            .unwrap();
        assert_eq!(org1.name, "Ada's Organization");
        assert_eq!(user1.username, ROOT_USERNAME);

        let (org2, user2, method) = authority
            .enroll_from_identity(&identity("s2", "ada@example.com"), "google")
            .unwrap();
        assert_ne!(user1.id, user2.id);
        assert_ne!(org1.id, org2.id);
        assert_eq!(user2.email, "ada+1@example.com");
        assert_eq!(user2.username, ROOT_USERNAME);
        assert!(authority.is_quorum_member(&org2.id, &user2.id).unwrap());

        let found = authority.find_auth_method_by_subject("google", "s2").unwrap().unwrap();
        assert_eq!(found.id, method.id);
        assert!(!method.data.to_string().contains("secret-access"));
    }

    #[test]
    fn same_subject_cannot_enroll_twice() {
        let (authority, _dir) = authority();
        authority
            .enroll_from_identity(&identity("s1", "ada@example.com"), "google")
            .unwrap();
        assert!(matches!(
            authority.enroll_from_identity(&identity("s1", "other@example.com"), "google"),
            Err(ServiceError::Conflict(_))
        ));
    }

    #[test]
    fn reads_are_scoped_to_the_organization() {
        let (authority, _dir) = authority();
        let (acme, acme_root) = authority
            .create_organization("Acme", "admin@acme.com", "pk1", EmailPolicy::Reject)
            .unwrap();
        let (globex, _) = authority
            .create_organization("Globex", "admin@globex.com", "pk2", EmailPolicy::Reject)
            .unwrap();

        assert!(authority.get_user(&acme.id, &acme_root.id).is_ok());
        assert!(matches!(
            authority.get_user(&globex.id, &acme_root.id),
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            authority.require_quorum_member(&globex.id, &acme_root.id),
            Err(ServiceError::PermissionDenied(_))
        ));
    }

    #[test]
    fn quorum_management() {
        let (authority, _dir) = authority();
        let (org, root) = authority
            .create_organization("Acme", "admin@acme.com", "pk1", EmailPolicy::Reject)
            .unwrap();
        let bob = authority
            .create_user(
                &org.id,
                &NewUser {
                    username: "bob".into(),
                    email: "bob@acme.com".into(),
                    public_key: "pk2".into(),
                    tags: vec!["ops".into()],
                },
            )
            .unwrap();

        assert!(matches!(
            authority.require_quorum_member(&org.id, &bob.id),
            Err(ServiceError::PermissionDenied(_))
        ));
        authority.add_quorum_member(&org.id, &bob.id).unwrap();
        authority.require_quorum_member(&org.id, &bob.id).unwrap();

        assert!(matches!(
            authority.update_root_quorum(&org.id, 0),
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            authority.update_root_quorum(&org.id, 3),
            Err(ServiceError::Conflict(_))
        ));
        let org = authority.update_root_quorum(&org.id, 2).unwrap();
        assert_eq!(org.root_quorum.threshold, 2);

        assert!(matches!(
            authority.remove_quorum_member(&org.id, &root.id),
            Err(ServiceError::Conflict(_))
        ));

        // A 2-of-2 quorum cannot lose a member to deactivation.
        let deactivate = UserUpdate { tags: None, is_active: Some(false) };
        assert!(matches!(
            authority.update_user(&org.id, &bob.id, &deactivate),
            Err(ServiceError::Conflict(_))
        ));
        authority.require_quorum_member(&org.id, &bob.id).unwrap();

        // Deactivated users lose their authority.
        authority.update_root_quorum(&org.id, 1).unwrap();
        authority.update_user(&org.id, &bob.id, &deactivate).unwrap();
        assert!(authority.require_quorum_member(&org.id, &bob.id).is_err());
        assert!(matches!(
            authority.update_user(&org.id, &root.id, &deactivate),
            Err(ServiceError::Conflict(_))
        ));
    }

    #[test]
    fn auth_method_lifecycle() {
        let (authority, _dir) = authority();
        let (org, root) = authority
            .create_organization("Acme", "admin@acme.com", "pk1", EmailPolicy::Reject)
            .unwrap();

        let bad = NewAuthMethod {
            user_id: root.id.clone(),
            method_type: AuthMethodType::Oauth,
            name: "google".into(),
            data: json!({ "provider": "google" }),
        };
        assert!(matches!(
            authority.create_auth_method(&org.id, &bad),
            Err(ServiceError::Validation(_))
        ));

        let key = authority
            .create_auth_method(
                &org.id,
                &NewAuthMethod {
                    user_id: root.id.clone(),
                    method_type: AuthMethodType::ApiKey,
                    name: "ci".into(),
                    data: json!({ "public_key": "02ab" }),
                },
            )
            .unwrap();
        assert_eq!(authority.list_auth_methods(&org.id, &root.id).unwrap().len(), 1);

        let deactivated = authority.deactivate_auth_method(&org.id, &key.id).unwrap();
        assert!(!deactivated.is_active);
    }
}
