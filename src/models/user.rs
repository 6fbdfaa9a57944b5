// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use chrono::{DateTime, Utc};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::storage::{Record, RowTable};

/// Member of exactly one organization. Never hard-deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: String,
    pub organization_id: String,
    /// Unique within the organization.
    pub username: String,
    /// Globally unique, compared case-insensitively.
    pub email: String,
    pub public_key: String,
    pub tags: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        organization_id: &str,
        username: impl Into<String>,
        email: impl Into<String>,
        public_key: impl Into<String>,
        tags: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: super::new_id(),
            organization_id: organization_id.to_string(),
            username: username.into(),
            email: email.into(),
            public_key: public_key.into(),
            tags: super::normalize_tags(tags),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for User {
    const TABLE: RowTable = TableDefinition::new("users");

    fn id(&self) -> &str {
        &self.id
    }
}

/// What to do when a new user's email is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmailPolicy {
    /// Fail with a conflict.
    #[default]
    Reject,
    /// Use the first free `local+N@domain`.
    AutoSuffix,
}

/// `local+n@domain`, or `email+n` when the address has no `@`.
pub fn suffixed_email(email: &str, n: u32) -> String {
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{local}+{n}@{domain}"),
        None => format!("{email}+{n}"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum AuthMethodType {
    #[serde(rename = "AUTH_METHOD_TYPE_OAUTH")]
    Oauth,
    #[serde(rename = "AUTH_METHOD_TYPE_API_KEY")]
    ApiKey,
    #[serde(rename = "AUTH_METHOD_TYPE_PASSKEY")]
    Passkey,
}

/// Credential of one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AuthMethod {
    pub id: String,
    pub user_id: String,
    pub organization_id: String,
    pub method_type: AuthMethodType,
    pub name: String,
    /// Opaque provider payload.
    #[schema(value_type = Object)]
    pub data: Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl AuthMethod {
    pub fn new(
        user: &User,
        method_type: AuthMethodType,
        name: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            id: super::new_id(),
            user_id: user.id.clone(),
            organization_id: user.organization_id.clone(),
            method_type,
            name: name.into(),
            data,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// `(provider, subject)` of an OAuth method, read from its payload.
    pub fn oauth_subject(&self) -> Option<(String, String)> {
        if self.method_type != AuthMethodType::Oauth {
            return None;
        }
        let provider = self.data.get("provider")?.as_str()?;
        let subject = self.data.get("subject")?.as_str()?;
        Some((provider.to_string(), subject.to_string()))
    }
}

impl Record for AuthMethod {
    const TABLE: RowTable = TableDefinition::new("auth_methods");

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn suffixes_local_part() {
        assert_eq!(suffixed_email("admin@acme.com", 1), "admin+1@acme.com");
        assert_eq!(suffixed_email("a@b@c.io", 2), "a@b+2@c.io");
        assert_eq!(suffixed_email("nodomain", 3), "nodomain+3");
    }

    #[test]
    fn oauth_subject_comes_from_payload() {
        let user = User::new("org", "Root user", "a@b.c", "pk", vec![]);
        let method = AuthMethod::new(
            &user,
            AuthMethodType::Oauth,
            "google",
            json!({ "provider": "google", "subject": "123" }),
        );
        assert_eq!(
            method.oauth_subject(),
            Some(("google".to_string(), "123".to_string()))
        );

        let key = AuthMethod::new(&user, AuthMethodType::ApiKey, "ci", json!({ "provider": "x", "subject": "y" }));
        assert_eq!(key.oauth_subject(), None);
    }
}
