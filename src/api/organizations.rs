// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Organization endpoints.
//!
//! Creating an organization is the bootstrap path and needs no session; the
//! response carries a root session for the initial user. Every other
//! endpoint is scoped to the caller's own organization.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::{Auth, Role},
    authority::OrganizationUpdate,
    error::ApiError,
    models::{Activity, EmailPolicy, Organization, QuorumMember, User},
    service::{ActivityRequest, CreatedOrganization},
    session::IssuedSession,
    state::AppState,
    storage::PageRequest,
};

use super::activities::activity_status;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateOrganizationRequest {
    pub name: String,
    pub initial_user_email: String,
    pub initial_user_public_key: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CreateOrganizationResponse {
    #[serde(flatten)]
    pub created: CreatedOrganization,
    /// Root session for the initial user.
    pub session: IssuedSession,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserListResponse {
    pub users: Vec<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuorumResponse {
    pub threshold: u32,
    pub members: Vec<QuorumMember>,
}

/// Bootstrap a new organization with its initial root user.
#[utoipa::path(
    post,
    path = "/v1/organizations",
    tag = "Organizations",
    request_body = CreateOrganizationRequest,
    responses(
        (status = 201, description = "Organization created", body = CreateOrganizationResponse),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn create_organization(
    State(state): State<AppState>,
    Json(request): Json<CreateOrganizationRequest>,
) -> Result<(StatusCode, Json<CreateOrganizationResponse>), ApiError> {
    let service = state.service();
    let created = service.create_organization(
        &request.name,
        &request.initial_user_email,
        &request.initial_user_public_key,
        EmailPolicy::Reject,
    )?;
    let session = service
        .sessions()
        .create_session(&created.user, None, None, Role::Root)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateOrganizationResponse { created, session }),
    ))
}

#[utoipa::path(
    get,
    path = "/v1/organizations/{organization_id}",
    tag = "Organizations",
    security(("bearer_auth" = [])),
    params(("organization_id" = String, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Organization", body = Organization),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Organization not found")
    )
)]
pub async fn get_organization(
    Auth(session): Auth,
    State(state): State<AppState>,
    Path(organization_id): Path<String>,
) -> Result<Json<Organization>, ApiError> {
    Ok(Json(
        state.service().get_organization(&session, &organization_id)?,
    ))
}

/// Rename the organization. Submitted as an activity and subject to the root quorum.
#[utoipa::path(
    patch,
    path = "/v1/organizations/{organization_id}",
    tag = "Organizations",
    security(("bearer_auth" = [])),
    params(("organization_id" = String, Path, description = "Organization ID")),
    request_body = OrganizationUpdate,
    responses(
        (status = 200, description = "Update executed", body = Activity),
        (status = 202, description = "Update awaiting approvals", body = Activity),
        (status = 403, description = "Not a quorum member"),
        (status = 404, description = "Organization not found")
    )
)]
pub async fn update_organization(
    Auth(session): Auth,
    State(state): State<AppState>,
    Path(organization_id): Path<String>,
    Json(update): Json<OrganizationUpdate>,
) -> Result<(StatusCode, Json<Activity>), ApiError> {
    let service = state.service();
    service.get_organization(&session, &organization_id)?;
    let activity = service
        .submit(&session, ActivityRequest::UpdateOrganization(update))
        .await?;
    Ok((activity_status(&activity), Json(activity)))
}

#[utoipa::path(
    get,
    path = "/v1/organizations/{organization_id}/users",
    tag = "Organizations",
    security(("bearer_auth" = [])),
    params(
        ("organization_id" = String, Path, description = "Organization ID"),
        PageRequest
    ),
    responses(
        (status = 200, description = "Users of the organization", body = UserListResponse),
        (status = 404, description = "Organization not found")
    )
)]
pub async fn list_users(
    Auth(session): Auth,
    State(state): State<AppState>,
    Path(organization_id): Path<String>,
    Query(page): Query<PageRequest>,
) -> Result<Json<UserListResponse>, ApiError> {
    let page = state
        .service()
        .list_users(&session, &organization_id, &page)?;
    Ok(Json(UserListResponse {
        users: page.items,
        next_page_token: page.next_page_token,
    }))
}

#[utoipa::path(
    get,
    path = "/v1/organizations/{organization_id}/quorum",
    tag = "Organizations",
    security(("bearer_auth" = [])),
    params(("organization_id" = String, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Root quorum", body = QuorumResponse),
        (status = 404, description = "Organization not found")
    )
)]
pub async fn get_quorum(
    Auth(session): Auth,
    State(state): State<AppState>,
    Path(organization_id): Path<String>,
) -> Result<Json<QuorumResponse>, ApiError> {
    let service = state.service();
    let organization = service.get_organization(&session, &organization_id)?;
    let members = service.list_quorum_members(&session)?;
    Ok(Json(QuorumResponse {
        threshold: organization.root_quorum.threshold,
        members,
    }))
}
