// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User and credential endpoints within the caller's organization.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    auth::{Auth, RootOnly},
    authority::UserUpdate,
    error::ApiError,
    models::{Activity, AuthMethod, User},
    state::AppState,
};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthMethodListResponse {
    pub auth_methods: Vec<AuthMethod>,
}

/// Get the authenticated user's own profile.
#[utoipa::path(
    get,
    path = "/v1/users/me",
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn get_current_user(
    Auth(session): Auth,
    State(state): State<AppState>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.service().get_user(&session, &session.user_id)?))
}

#[utoipa::path(
    get,
    path = "/v1/users/{user_id}",
    tag = "Users",
    security(("bearer_auth" = [])),
    params(("user_id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "User", body = User),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    Auth(session): Auth,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.service().get_user(&session, &user_id)?))
}

/// Change a user's tags or active flag.
///
/// Recorded as an `ACTIVITY_TYPE_UPDATE_USER` activity, so it needs the root
/// quorum's approval like any other privileged request.
#[utoipa::path(
    patch,
    path = "/v1/users/{user_id}",
    tag = "Users",
    security(("bearer_auth" = [])),
    params(("user_id" = String, Path, description = "User ID")),
    request_body = UserUpdate,
    responses(
        (status = 200, description = "Update executed", body = Activity),
        (status = 202, description = "Update awaiting approvals", body = Activity),
        (status = 403, description = "Not a quorum member"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Deactivation would break the root quorum")
    )
)]
pub async fn update_user(
    RootOnly(session): RootOnly,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(update): Json<UserUpdate>,
) -> Result<(StatusCode, Json<Activity>), ApiError> {
    let activity = state
        .service()
        .update_user(&session, &user_id, update)
        .await?;
    Ok((super::activities::activity_status(&activity), Json(activity)))
}

#[utoipa::path(
    get,
    path = "/v1/users/{user_id}/auth-methods",
    tag = "Users",
    security(("bearer_auth" = [])),
    params(("user_id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "Credentials of the user", body = AuthMethodListResponse),
        (status = 404, description = "User not found")
    )
)]
pub async fn list_auth_methods(
    Auth(session): Auth,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<AuthMethodListResponse>, ApiError> {
    let auth_methods = state.service().list_auth_methods(&session, &user_id)?;
    Ok(Json(AuthMethodListResponse { auth_methods }))
}

/// Deactivate a credential. Users may deactivate their own; root members any.
#[utoipa::path(
    delete,
    path = "/v1/auth-methods/{auth_method_id}",
    tag = "Users",
    security(("bearer_auth" = [])),
    params(("auth_method_id" = String, Path, description = "Auth method ID")),
    responses(
        (status = 200, description = "Deactivated credential", body = AuthMethod),
        (status = 403, description = "Not allowed"),
        (status = 404, description = "Auth method not found")
    )
)]
pub async fn deactivate_auth_method(
    Auth(session): Auth,
    State(state): State<AppState>,
    Path(auth_method_id): Path<String>,
) -> Result<Json<AuthMethod>, ApiError> {
    Ok(Json(
        state
            .service()
            .deactivate_auth_method(&session, &auth_method_id)?,
    ))
}
