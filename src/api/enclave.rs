// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    auth::Auth, derivation::SeedValidation, enclave::EnclaveInfo, error::ApiError,
    state::AppState,
};

#[derive(Deserialize, ToSchema)]
pub struct ValidateSeedRequest {
    pub seed_phrase: String,
}

// Seed phrases must never reach the logs.
impl std::fmt::Debug for ValidateSeedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidateSeedRequest")
            .field("seed_phrase", &"<redacted>")
            .finish()
    }
}

/// Check a mnemonic's word count, wordlist membership and checksum.
#[utoipa::path(
    post,
    path = "/v1/seeds/validate",
    tag = "Enclave",
    security(("bearer_auth" = [])),
    request_body = ValidateSeedRequest,
    responses(
        (status = 200, description = "Validation outcome", body = SeedValidation),
        (status = 503, description = "Enclave unavailable")
    )
)]
pub async fn validate_seed(
    Auth(_session): Auth,
    State(state): State<AppState>,
    Json(request): Json<ValidateSeedRequest>,
) -> Result<Json<SeedValidation>, ApiError> {
    Ok(Json(state.service().validate_seed(&request.seed_phrase).await?))
}

#[utoipa::path(
    get,
    path = "/v1/enclave/info",
    tag = "Enclave",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Enclave version and capabilities", body = EnclaveInfo),
        (status = 503, description = "Enclave unavailable")
    )
)]
pub async fn enclave_info(
    Auth(_session): Auth,
    State(state): State<AppState>,
) -> Result<Json<EnclaveInfo>, ApiError> {
    Ok(Json(state.service().enclave_info().await?))
}
