// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Activity endpoints.
//!
//! Every privileged request goes through `POST /v1/activities`. The response
//! is `200` when the request executed and `202` while it waits for more quorum
//! approvals.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::Auth,
    error::ApiError,
    models::{Activity, ActivityStatus, ActivityType, Proof},
    service::ActivityRequest,
    state::AppState,
    storage::PageRequest,
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SubmitActivityRequest {
    /// One of the `ACTIVITY_TYPE_*` names.
    #[serde(rename = "type")]
    pub activity_type: String,
    #[serde(default)]
    pub parameters: Value,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RejectActivityRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ActivityFilter {
    /// Only activities of this `ACTIVITY_TYPE_*`.
    #[serde(default, rename = "type")]
    pub activity_type: Option<String>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ActivityListResponse {
    pub activities: Vec<Activity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProofListResponse {
    pub proofs: Vec<Proof>,
}

pub(crate) fn activity_status(activity: &Activity) -> StatusCode {
    match activity.status {
        ActivityStatus::Pending => StatusCode::ACCEPTED,
        ActivityStatus::Completed | ActivityStatus::Failed => StatusCode::OK,
    }
}

/// Submit a privileged request.
#[utoipa::path(
    post,
    path = "/v1/activities",
    tag = "Activities",
    security(("bearer_auth" = [])),
    request_body = SubmitActivityRequest,
    responses(
        (status = 200, description = "Request executed", body = Activity),
        (status = 202, description = "Request awaiting approvals", body = Activity),
        (status = 400, description = "Invalid request"),
        (status = 403, description = "Not a quorum member"),
        (status = 409, description = "Conflict"),
        (status = 412, description = "Wallet must be exported before deletion"),
        (status = 503, description = "Enclave unavailable, retry later")
    )
)]
pub async fn submit_activity(
    Auth(session): Auth,
    State(state): State<AppState>,
    Json(request): Json<SubmitActivityRequest>,
) -> Result<(StatusCode, Json<Activity>), ApiError> {
    let activity_type: ActivityType = request.activity_type.parse()?;
    let request = ActivityRequest::from_parts(activity_type, request.parameters)?;
    let activity = state.service().submit(&session, request).await?;
    Ok((activity_status(&activity), Json(activity)))
}

#[utoipa::path(
    get,
    path = "/v1/activities",
    tag = "Activities",
    security(("bearer_auth" = [])),
    params(ActivityFilter),
    responses(
        (status = 200, description = "Activities, newest first", body = ActivityListResponse),
        (status = 400, description = "Unknown activity type or page token")
    )
)]
pub async fn list_activities(
    Auth(session): Auth,
    State(state): State<AppState>,
    Query(filter): Query<ActivityFilter>,
) -> Result<Json<ActivityListResponse>, ApiError> {
    let page = PageRequest::new(filter.page_size, filter.page_token);
    let page = state
        .service()
        .list_activities(&session, filter.activity_type.as_deref(), &page)?;
    Ok(Json(ActivityListResponse {
        activities: page.items,
        next_page_token: page.next_page_token,
    }))
}

#[utoipa::path(
    get,
    path = "/v1/activities/{activity_id}",
    tag = "Activities",
    security(("bearer_auth" = [])),
    params(("activity_id" = String, Path, description = "Activity ID")),
    responses(
        (status = 200, description = "Activity", body = Activity),
        (status = 404, description = "Activity not found")
    )
)]
pub async fn get_activity(
    Auth(session): Auth,
    State(state): State<AppState>,
    Path(activity_id): Path<String>,
) -> Result<Json<Activity>, ApiError> {
    Ok(Json(state.service().get_activity(&session, &activity_id)?))
}

/// Approve a pending activity; executes it once the threshold is met.
#[utoipa::path(
    post,
    path = "/v1/activities/{activity_id}/approve",
    tag = "Activities",
    security(("bearer_auth" = [])),
    params(("activity_id" = String, Path, description = "Activity ID")),
    responses(
        (status = 200, description = "Approved and executed", body = Activity),
        (status = 202, description = "Approved, awaiting more approvals", body = Activity),
        (status = 403, description = "Not a quorum member"),
        (status = 409, description = "Already approved or no longer pending")
    )
)]
pub async fn approve_activity(
    Auth(session): Auth,
    State(state): State<AppState>,
    Path(activity_id): Path<String>,
) -> Result<(StatusCode, Json<Activity>), ApiError> {
    let activity = state
        .service()
        .approve_activity(&session, &activity_id)
        .await?;
    Ok((activity_status(&activity), Json(activity)))
}

#[utoipa::path(
    post,
    path = "/v1/activities/{activity_id}/reject",
    tag = "Activities",
    security(("bearer_auth" = [])),
    params(("activity_id" = String, Path, description = "Activity ID")),
    request_body = RejectActivityRequest,
    responses(
        (status = 200, description = "Activity failed", body = Activity),
        (status = 403, description = "Not a quorum member"),
        (status = 409, description = "No longer pending")
    )
)]
pub async fn reject_activity(
    Auth(session): Auth,
    State(state): State<AppState>,
    Path(activity_id): Path<String>,
    request: Option<Json<RejectActivityRequest>>,
) -> Result<Json<Activity>, ApiError> {
    let reason = request.and_then(|Json(r)| r.reason);
    let activity = state
        .service()
        .reject_activity(&session, &activity_id, reason.as_deref())?;
    Ok(Json(activity))
}

#[utoipa::path(
    get,
    path = "/v1/activities/{activity_id}/proofs",
    tag = "Activities",
    security(("bearer_auth" = [])),
    params(("activity_id" = String, Path, description = "Activity ID")),
    responses(
        (status = 200, description = "Proofs attached to the activity", body = ProofListResponse),
        (status = 404, description = "Activity not found")
    )
)]
pub async fn list_proofs(
    Auth(session): Auth,
    State(state): State<AppState>,
    Path(activity_id): Path<String>,
) -> Result<Json<ProofListResponse>, ApiError> {
    let proofs = state.service().list_proofs(&session, &activity_id)?;
    Ok(Json(ProofListResponse { proofs }))
}
