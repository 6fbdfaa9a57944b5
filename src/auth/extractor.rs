// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated sessions.
//!
//! ```rust,ignore
//! async fn my_handler(Auth(session): Auth) -> impl IntoResponse {
//!     // session is SessionData
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::{AuthError, Role};
use crate::session::SessionData;
use crate::state::AppState;

/// Raw bearer token from the `Authorization` header, not yet validated.
pub struct BearerToken(pub String);

impl<S: Send + Sync> FromRequestParts<S> for BearerToken {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::InvalidAuthHeader)?;

        Ok(BearerToken(token.to_string()))
    }
}

/// Extractor for a live session.
///
/// Validation records the access on the session, so every authenticated
/// request refreshes `last_activity`.
///
/// ```rust,ignore
/// async fn list_wallets(
///     Auth(session): Auth,
///     State(state): State<AppState>,
/// ) -> Result<Json<WalletListResponse>, ApiError> {
///     // session.organization_id scopes every read
/// }
/// ```
pub struct Auth(pub SessionData);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<SessionData>().cloned() {
            return Ok(Auth(session));
        }

        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;
        let session = state.service().validate_session(&token).await?;

        parts.extensions.insert(session.clone());
        Ok(Auth(session))
    }
}

/// Extractor that requires a root quorum session.
pub struct RootOnly(pub SessionData);

impl FromRequestParts<AppState> for RootOnly {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Auth(session) = Auth::from_request_parts(parts, state).await?;

        if !session.role.has_privilege(Role::Root) {
            return Err(AuthError::InsufficientPermissions);
        }

        Ok(RootOnly(session))
    }
}
