// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Users and their auth methods.
//!
//! ## Indexes
//!
//! - `user_email`: lowercased email → user id (global uniqueness)
//! - `user_name`: `organization_id|username` → user id
//! - `auth_subject`: `provider|subject` → auth method id (active OAuth methods only)

use chrono::Utc;
use redb::{ReadableTable, WriteTransaction};

use super::organizations::ensure_quorum_survives_deactivation;
use crate::models::{user::suffixed_email, AuthMethod, EmailPolicy, Organization, User};
use crate::storage::database::{
    composite_key, fetch, fetch_for_update, order_key, read_row, scan_all, scan_page, store,
    Database, Record, StoreError, StoreResult, AUTH_METHOD_BY_USER, AUTH_SUBJECT, USER_BY_ORG,
    USER_EMAIL, USER_NAME,
};
use crate::storage::{Page, PageRequest};

/// Highest `+N` suffix tried before giving up on an email.
const MAX_EMAIL_SUFFIX: u32 = 1000;

/// Insert a user and its index entries. Under [`EmailPolicy::AutoSuffix`] a
/// taken email is replaced by the first free `local+N@domain`.
pub(crate) fn insert_user(
    txn: &WriteTransaction,
    user: &mut User,
    policy: EmailPolicy,
) -> StoreResult<()> {
    let mut emails = txn.open_table(USER_EMAIL)?;

    if emails.get(user.email.to_lowercase().as_str())?.is_some() {
        if policy == EmailPolicy::Reject {
            return Err(StoreError::Conflict(format!(
                "email {} already exists",
                user.email
            )));
        }

        let base = user.email.clone();
        let mut n = 1;
        loop {
            let candidate = suffixed_email(&base, n);
            if emails.get(candidate.to_lowercase().as_str())?.is_none() {
                user.email = candidate;
                break;
            }
            n += 1;
            if n > MAX_EMAIL_SUFFIX {
                return Err(StoreError::Conflict(format!(
                    "no free suffix for email {base}"
                )));
            }
        }
    }

    let mut names = txn.open_table(USER_NAME)?;
    let name_key = composite_key(&user.organization_id, &user.username);
    if names.get(name_key.as_str())?.is_some() {
        return Err(StoreError::Conflict(format!(
            "username {} already exists in organization",
            user.username
        )));
    }

    emails.insert(user.email.to_lowercase().as_str(), user.id.as_str())?;
    names.insert(name_key.as_str(), user.id.as_str())?;

    let mut by_org = txn.open_table(USER_BY_ORG)?;
    let key = order_key(&user.organization_id, user.created_at, &user.id);
    by_org.insert(key.as_slice(), user.id.as_str())?;

    store(txn, &*user)
}

/// Insert an auth method; an OAuth subject may back only one active method.
pub(crate) fn insert_auth_method(txn: &WriteTransaction, method: &AuthMethod) -> StoreResult<()> {
    if let Some((provider, subject)) = method.oauth_subject() {
        let mut subjects = txn.open_table(AUTH_SUBJECT)?;
        let key = composite_key(&provider, &subject);
        if subjects.get(key.as_str())?.is_some() {
            return Err(StoreError::Conflict(format!(
                "{provider} identity is already linked to a user"
            )));
        }
        subjects.insert(key.as_str(), method.id.as_str())?;
    }

    let mut by_user = txn.open_table(AUTH_METHOD_BY_USER)?;
    let key = order_key(&method.user_id, method.created_at, &method.id);
    by_user.insert(key.as_slice(), method.id.as_str())?;

    store(txn, method)
}

/// Repository for users and auth methods.
pub struct UserRepository<'a> {
    db: &'a Database,
}

impl<'a> UserRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create a user in an existing organization.
    pub fn create(&self, mut user: User, policy: EmailPolicy) -> StoreResult<User> {
        let txn = self.db.begin_write()?;
        if fetch_for_update::<Organization>(&txn, &user.organization_id)?.is_none() {
            return Err(StoreError::NotFound("organization not found".into()));
        }
        insert_user(&txn, &mut user, policy)?;
        txn.commit()?;
        Ok(user)
    }

    pub fn get(&self, user_id: &str) -> StoreResult<Option<User>> {
        let txn = self.db.begin_read()?;
        fetch(&txn, user_id)
    }

    pub fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let txn = self.db.begin_read()?;
        let emails = txn.open_table(USER_EMAIL)?;
        let Some(id) = emails.get(email.to_lowercase().as_str())? else {
            return Ok(None);
        };
        let id = id.value().to_string();
        fetch(&txn, &id)
    }

    pub fn list_by_org(&self, organization_id: &str, page: &PageRequest) -> StoreResult<Page<User>> {
        let txn = self.db.begin_read()?;
        let index = txn.open_table(USER_BY_ORG)?;
        let users = txn.open_table(User::TABLE)?;
        scan_page(&index, organization_id, page, |id| read_row(&users, id))
    }

    /// Apply `change` to a stored user. Identity fields (`id`, organization,
    /// username, email) are restored after `change` runs.
    ///
    /// Deactivating a root quorum member is rejected when the remaining active
    /// members could no longer meet the threshold.
    pub fn update<F>(&self, user_id: &str, change: F) -> StoreResult<User>
    where
        F: FnOnce(&mut User) -> StoreResult<()>,
    {
        let txn = self.db.begin_write()?;
        let original: User = fetch_for_update(&txn, user_id)?
            .ok_or_else(|| StoreError::NotFound("user not found".into()))?;

        let mut user = original.clone();
        change(&mut user)?;
        user.id = original.id;
        user.organization_id = original.organization_id;
        user.username = original.username;
        user.email = original.email;
        user.created_at = original.created_at;
        user.updated_at = Utc::now();

        if original.is_active && !user.is_active {
            ensure_quorum_survives_deactivation(&txn, &user.organization_id, &user.id)?;
        }

        store(&txn, &user)?;
        txn.commit()?;
        Ok(user)
    }

    // =========================================================================
    // Auth methods
    // =========================================================================

    pub fn create_auth_method(&self, method: AuthMethod) -> StoreResult<AuthMethod> {
        let txn = self.db.begin_write()?;
        let user: User = fetch_for_update(&txn, &method.user_id)?
            .ok_or_else(|| StoreError::NotFound("user not found".into()))?;
        if user.organization_id != method.organization_id {
            return Err(StoreError::Conflict(
                "auth method organization does not match its user".into(),
            ));
        }
        insert_auth_method(&txn, &method)?;
        txn.commit()?;
        Ok(method)
    }

    pub fn get_auth_method(&self, id: &str) -> StoreResult<Option<AuthMethod>> {
        let txn = self.db.begin_read()?;
        fetch(&txn, id)
    }

    pub fn list_auth_methods(&self, user_id: &str) -> StoreResult<Vec<AuthMethod>> {
        let txn = self.db.begin_read()?;
        let index = txn.open_table(AUTH_METHOD_BY_USER)?;
        let methods = txn.open_table(AuthMethod::TABLE)?;

        let mut out = Vec::new();
        for id in scan_all(&index, user_id)? {
            if let Some(method) = read_row(&methods, &id)? {
                out.push(method);
            }
        }
        Ok(out)
    }

    /// Mark an auth method inactive and release its OAuth subject.
    pub fn deactivate_auth_method(&self, id: &str) -> StoreResult<AuthMethod> {
        let txn = self.db.begin_write()?;
        let mut method: AuthMethod = fetch_for_update(&txn, id)?
            .ok_or_else(|| StoreError::NotFound("auth method not found".into()))?;

        if method.is_active {
            if let Some((provider, subject)) = method.oauth_subject() {
                let mut subjects = txn.open_table(AUTH_SUBJECT)?;
                subjects.remove(composite_key(&provider, &subject).as_str())?;
            }
            method.is_active = false;
            store(&txn, &method)?;
        }
        txn.commit()?;
        Ok(method)
    }

    pub fn find_auth_method_by_subject(
        &self,
        provider: &str,
        subject: &str,
    ) -> StoreResult<Option<AuthMethod>> {
        let txn = self.db.begin_read()?;
        let subjects = txn.open_table(AUTH_SUBJECT)?;
        let Some(id) = subjects.get(composite_key(provider, subject).as_str())? else {
            return Ok(None);
        };
        let id = id.value().to_string();
        fetch(&txn, &id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuthMethodType;
    use crate::storage::OrganizationRepository;
    use serde_json::json;

    fn temp_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    fn seed_org(db: &Database) -> (Organization, User) {
        let org = Organization::new("Acme", 1);
        let root = User::new(&org.id, "root", "admin@acme.com", "pk1", vec![]);
        let (root, _) = OrganizationRepository::new(db)
            .create_with_root_user(&org, root, EmailPolicy::Reject, None)
            .unwrap();
        (org, root)
    }

    #[test]
    fn email_is_globally_unique_and_case_insensitive() {
        let (db, _dir) = temp_db();
        let (org, _) = seed_org(&db);
        let repo = UserRepository::new(&db);

        let dup = User::new(&org.id, "bob", "ADMIN@acme.com", "pk2", vec![]);
        let err = repo.create(dup, EmailPolicy::Reject).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let suffixed = repo
            .create(User::new(&org.id, "bob", "admin@acme.com", "pk2", vec![]), EmailPolicy::AutoSuffix)
            .unwrap();
        assert_eq!(suffixed.email, "admin+1@acme.com");

        let again = repo
            .create(User::new(&org.id, "carol", "admin@acme.com", "pk3", vec![]), EmailPolicy::AutoSuffix)
            .unwrap();
        assert_eq!(again.email, "admin+2@acme.com");
    }

    #[test]
    fn username_is_unique_per_organization_only() {
        let (db, _dir) = temp_db();
        let (org, _) = seed_org(&db);
        let repo = UserRepository::new(&db);

        let err = repo
            .create(User::new(&org.id, "root", "other@acme.com", "pk", vec![]), EmailPolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let other_org = Organization::new("Globex", 1);
        let other_root = User::new(&other_org.id, "root", "root@globex.com", "pk", vec![]);
        assert!(OrganizationRepository::new(&db)
            .create_with_root_user(&other_org, other_root, EmailPolicy::Reject, None)
            .is_ok());
    }

    #[test]
    fn failed_insert_leaves_no_index_entries() {
        let (db, _dir) = temp_db();
        let (org, _) = seed_org(&db);
        let repo = UserRepository::new(&db);

        // Email is free, username is taken: nothing may be written.
        let err = repo
            .create(User::new(&org.id, "root", "fresh@acme.com", "pk", vec![]), EmailPolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(repo.find_by_email("fresh@acme.com").unwrap().is_none());
    }

    #[test]
    fn update_keeps_identity_fields() {
        let (db, _dir) = temp_db();
        let (_, root) = seed_org(&db);
        let repo = UserRepository::new(&db);

        let updated = repo
            .update(&root.id, |u| {
                u.tags = vec!["ops".into()];
                u.email = "hijack@evil.com".into();
                Ok(())
            })
            .unwrap();
        assert_eq!(updated.tags, vec!["ops".to_string()]);
        assert_eq!(updated.email, "admin@acme.com");
    }

    #[test]
    fn oauth_subjects_are_exclusive_until_deactivated() {
        let (db, _dir) = temp_db();
        let (_, root) = seed_org(&db);
        let repo = UserRepository::new(&db);
        let payload = json!({ "provider": "google", "subject": "sub-1" });

        let method = repo
            .create_auth_method(AuthMethod::new(&root, AuthMethodType::Oauth, "google", payload.clone()))
            .unwrap();
        assert_eq!(
            repo.find_auth_method_by_subject("google", "sub-1").unwrap().unwrap().id,
            method.id
        );

        let err = repo
            .create_auth_method(AuthMethod::new(&root, AuthMethodType::Oauth, "google", payload.clone()))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        repo.deactivate_auth_method(&method.id).unwrap();
        assert!(repo.find_auth_method_by_subject("google", "sub-1").unwrap().is_none());
        assert!(repo
            .create_auth_method(AuthMethod::new(&root, AuthMethodType::Oauth, "google", payload))
            .is_ok());
        assert_eq!(repo.list_auth_methods(&root.id).unwrap().len(), 2);
    }

    #[test]
    fn list_by_org_pages_through_users() {
        let (db, _dir) = temp_db();
        let (org, _) = seed_org(&db);
        let repo = UserRepository::new(&db);
        for i in 0..4 {
            repo.create(
                User::new(&org.id, format!("user-{i}"), format!("u{i}@acme.com"), "pk", vec![]),
                EmailPolicy::Reject,
            )
            .unwrap();
        }

        let first = repo.list_by_org(&org.id, &PageRequest::first(3)).unwrap();
        assert_eq!(first.items.len(), 3);
        let second = repo
            .list_by_org(&org.id, &PageRequest::new(Some(3), first.next_page_token))
            .unwrap();
        assert_eq!(second.items.len(), 2);
        assert!(second.next_page_token.is_none());
    }
}
