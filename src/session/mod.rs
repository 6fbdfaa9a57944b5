// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Session Manager
//!
//! Short-lived bearer sessions and a distributed lock, both kept in the
//! shared [`CacheStore`].
//!
//! ## Keys
//!
//! - `session:<token>` → JSON [`SessionData`], expiring with the session
//! - `lock:<key>` → random holder token, expiring after the lock TTL
//!
//! Tokens are 32 random bytes, base64url encoded. They never appear in logs.
//!
//! Only session creation writes unconditionally. Later writes use
//! `SET .. XX`, so a session destroyed concurrently stays destroyed. A lock is
//! released by compare-and-delete against its holder token.

mod cache;

use std::{sync::Arc, time::Duration};

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::auth::Role;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{AuthMethod, User};

pub use cache::{CacheError, CacheStore, MemoryCache, RedisCache};

pub const SESSION_KEY_PREFIX: &str = "session:";
pub const LOCK_KEY_PREFIX: &str = "lock:";

const TOKEN_BYTES: usize = 32;

/// Cached state of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SessionData {
    pub user_id: String,
    pub organization_id: String,
    pub auth_method_id: Option<String>,
    pub oauth_provider: Option<String>,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionData {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// A freshly issued session.
#[derive(Clone, Serialize, ToSchema)]
pub struct IssuedSession {
    pub token: String,
    pub session: SessionData,
}

impl std::fmt::Debug for IssuedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedSession")
            .field("token", &"<redacted>")
            .field("session", &self.session)
            .finish()
    }
}

/// Proof of holding `lock:<key>`, required to release it.
#[derive(Clone, PartialEq, Eq)]
pub struct HeldLock {
    key: String,
    holder: String,
}

impl HeldLock {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Debug for HeldLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeldLock").field("key", &self.key).finish_non_exhaustive()
    }
}

fn session_key(token: &str) -> String {
    format!("{SESSION_KEY_PREFIX}{token}")
}

fn lock_key(key: &str) -> String {
    format!("{LOCK_KEY_PREFIX}{key}")
}

fn to_chrono(ttl: Duration) -> ServiceResult<chrono::Duration> {
    chrono::Duration::from_std(ttl).map_err(|_| ServiceError::validation("session ttl out of range"))
}

pub struct SessionManager {
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
    rng: SystemRandom,
}

impl SessionManager {
    pub fn new(cache: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            cache,
            ttl,
            rng: SystemRandom::new(),
        }
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    fn new_token(&self) -> ServiceResult<String> {
        let mut bytes = [0u8; TOKEN_BYTES];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| ServiceError::internal("system RNG unavailable"))?;
        Ok(Base64UrlUnpadded::encode_string(&bytes))
    }

    fn encode(session: &SessionData, now: DateTime<Utc>) -> ServiceResult<(String, Duration)> {
        let remaining = (session.expires_at - now)
            .to_std()
            .map_err(|_| ServiceError::Expired("session expired".into()))?;
        let value = serde_json::to_string(session).map_err(|e| ServiceError::internal(e.to_string()))?;
        Ok((value, remaining))
    }

    /// Overwrite an existing session. A session revoked since it was read is not recreated.
    async fn write_back(&self, token: &str, session: &SessionData, now: DateTime<Utc>) -> ServiceResult<()> {
        let (value, remaining) = Self::encode(session, now)?;
        if !self.cache.set_xx_ex(&session_key(token), &value, remaining).await? {
            return Err(ServiceError::Expired("session expired or revoked".into()));
        }
        Ok(())
    }

    async fn read(&self, token: &str) -> ServiceResult<SessionData> {
        if token.is_empty() {
            return Err(ServiceError::Expired("session expired or revoked".into()));
        }
        let raw = self
            .cache
            .get(&session_key(token))
            .await?
            .ok_or_else(|| ServiceError::Expired("session expired or revoked".into()))?;
        serde_json::from_str(&raw).map_err(|e| ServiceError::internal(format!("corrupt session: {e}")))
    }

    /// Issue a new session for `user`.
    pub async fn create_session(
        &self,
        user: &User,
        auth_method: Option<&AuthMethod>,
        oauth_provider: Option<&str>,
        role: Role,
    ) -> ServiceResult<IssuedSession> {
        let now = Utc::now();
        let session = SessionData {
            user_id: user.id.clone(),
            organization_id: user.organization_id.clone(),
            auth_method_id: auth_method.map(|m| m.id.clone()),
            oauth_provider: oauth_provider.map(str::to_string),
            email: user.email.clone(),
            role,
            created_at: now,
            last_activity: now,
            expires_at: now + to_chrono(self.ttl)?,
        };

        let token = self.new_token()?;
        let (value, remaining) = Self::encode(&session, now)?;
        self.cache.set_ex(&session_key(&token), &value, remaining).await?;
        info!(user_id = %user.id, organization_id = %user.organization_id, %role, "session created");
        Ok(IssuedSession { token, session })
    }

    /// Resolve a bearer token and record the access.
    pub async fn validate(&self, token: &str) -> ServiceResult<SessionData> {
        let mut session = self.read(token).await?;
        let now = Utc::now();
        if session.is_expired_at(now) {
            self.cache.delete(&session_key(token)).await?;
            return Err(ServiceError::Expired("session expired".into()));
        }

        session.last_activity = now;
        self.write_back(token, &session, now).await?;
        Ok(session)
    }

    /// Push the expiry to `now + ttl` (the configured TTL when `None`).
    pub async fn refresh(&self, token: &str, ttl: Option<Duration>) -> ServiceResult<SessionData> {
        let mut session = self.validate(token).await?;
        let now = Utc::now();
        session.expires_at = now + to_chrono(ttl.unwrap_or(self.ttl))?;
        session.last_activity = now;
        self.write_back(token, &session, now).await?;
        debug!(user_id = %session.user_id, expires_at = %session.expires_at, "session refreshed");
        Ok(session)
    }

    /// Revoke a session. Unknown tokens succeed.
    pub async fn destroy(&self, token: &str) -> ServiceResult<()> {
        self.cache.delete(&session_key(token)).await?;
        Ok(())
    }

    // =========================================================================
    // Distributed lock
    // =========================================================================

    /// Take `lock:<key>` if nobody holds it. Never blocks.
    pub async fn acquire_lock(&self, key: &str, ttl: Duration) -> ServiceResult<Option<HeldLock>> {
        let holder = self.new_token()?;
        let acquired = self.cache.set_nx_ex(&lock_key(key), &holder, ttl).await?;
        debug!(key, acquired, "lock acquire");
        Ok(acquired.then(|| HeldLock {
            key: key.to_string(),
            holder,
        }))
    }

    /// Release a lock taken by [`acquire_lock`](Self::acquire_lock).
    ///
    /// Idempotent. A lock that expired and was taken by another holder is left alone.
    pub async fn release_lock(&self, lock: &HeldLock) -> ServiceResult<()> {
        let released = self
            .cache
            .delete_if_eq(&lock_key(&lock.key), &lock.holder)
            .await?;
        if !released {
            debug!(key = %lock.key, "lock already expired or taken over");
        }
        Ok(())
    }

    /// Retry [`acquire_lock`](Self::acquire_lock) up to `attempts` times,
    /// sleeping `delay` between tries.
    pub async fn acquire_lock_with_retry(
        &self,
        key: &str,
        ttl: Duration,
        attempts: u32,
        delay: Duration,
    ) -> ServiceResult<Option<HeldLock>> {
        for attempt in 0..attempts {
            if let Some(lock) = self.acquire_lock(key, ttl).await? {
                return Ok(Some(lock));
            }
            if attempt + 1 < attempts {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(None)
    }
}
