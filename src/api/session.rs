// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session endpoints: sign-in with an identity assertion, introspection,
//! refresh and logout.

use std::{fmt, time::Duration};

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::{Auth, AuthError, BearerToken},
    error::ApiError,
    service::LoginOutcome,
    session::SessionData,
    state::AppState,
};

/// Sign-in request carrying an identity assertion from the OAuth front end.
#[derive(Clone, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// HS256 JWT with `sub`, `email`, `provider`, `iss`, `aud`, `iat` and `exp` claims.
    pub assertion: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("assertion", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RefreshRequest {
    /// New lifetime in seconds; the configured session TTL when absent.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LogoutResponse {
    pub message: String,
}

/// Sign in, enrolling a new organization on the identity's first use.
#[utoipa::path(
    post,
    path = "/v1/session/login",
    tag = "Session",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = LoginOutcome),
        (status = 201, description = "Enrolled and signed in", body = LoginOutcome),
        (status = 400, description = "Identity lacks a subject or email"),
        (status = 401, description = "Assertion unsigned, forged, expired or sign-in disabled"),
        (status = 403, description = "User is deactivated"),
        (status = 409, description = "Concurrent enrollment in progress")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<(StatusCode, Json<LoginOutcome>), ApiError> {
    let verifier = state.identity_verifier().ok_or(AuthError::SignInDisabled)?;
    let (provider, identity) = verifier.verify(&request.assertion)?;
    let outcome = state
        .service()
        .login_with_identity(&identity, &provider)
        .await?;
    let status = if outcome.enrolled {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)))
}

/// Describe the current session.
#[utoipa::path(
    get,
    path = "/v1/session",
    tag = "Session",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current session", body = SessionData),
        (status = 401, description = "Session expired or revoked")
    )
)]
pub async fn get_session(Auth(session): Auth) -> Json<SessionData> {
    Json(session)
}

/// Extend the current session.
#[utoipa::path(
    post,
    path = "/v1/session/refresh",
    tag = "Session",
    security(("bearer_auth" = [])),
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Session refreshed", body = SessionData),
        (status = 401, description = "Session expired or revoked")
    )
)]
pub async fn refresh_session(
    BearerToken(token): BearerToken,
    State(state): State<AppState>,
    request: Option<Json<RefreshRequest>>,
) -> Result<Json<SessionData>, ApiError> {
    let ttl = request
        .and_then(|Json(r)| r.ttl_secs)
        .map(Duration::from_secs);
    let session = state.service().refresh_session(&token, ttl).await?;
    Ok(Json(session))
}

/// Revoke the current session. Revoking an unknown token succeeds.
#[utoipa::path(
    delete,
    path = "/v1/session",
    tag = "Session",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Session revoked", body = LogoutResponse),
        (status = 401, description = "Missing bearer token")
    )
)]
pub async fn logout(
    BearerToken(token): BearerToken,
    State(state): State<AppState>,
) -> Result<Json<LogoutResponse>, ApiError> {
    state.service().logout(&token).await?;
    Ok(Json(LogoutResponse {
        message: "Session revoked".to_string(),
    }))
}
