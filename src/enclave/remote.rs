// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP/JSON client for the secure enclave service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use super::{EnclaveClient, EnclaveError, EnclaveInfo, GeneratedSeed};
use crate::derivation::SeedValidation;

const GENERATE_PATH: &str = "v1/seeds/generate";
const VALIDATE_PATH: &str = "v1/seeds/validate";
const INFO_PATH: &str = "v1/info";

#[derive(Serialize)]
struct GenerateSeedRequest<'a> {
    organization_id: &'a str,
    user_id: &'a str,
    strength: u32,
}

#[derive(Serialize)]
struct ValidateSeedRequest<'a> {
    seed_phrase: &'a str,
}

#[derive(Deserialize)]
struct EnclaveErrorBody {
    #[serde(alias = "message")]
    error: String,
}

#[derive(Debug, Clone)]
pub struct RemoteEnclaveClient {
    base_url: Url,
    http: Client,
}

impl RemoteEnclaveClient {
    /// Client for the enclave listening on `host:port`. Every request carries `timeout`.
    pub fn new(host: &str, port: u16, timeout: Duration) -> Result<Self, EnclaveError> {
        let base_url = Url::parse(&format!("http://{host}:{port}/"))
            .map_err(|e| EnclaveError::InvalidRequest(format!("invalid enclave address: {e}")))?;
        Self::with_base_url(base_url, timeout)
    }

    pub fn with_base_url(base_url: Url, timeout: Duration) -> Result<Self, EnclaveError> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| EnclaveError::Protocol(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, EnclaveError> {
        self.base_url
            .join(path)
            .map_err(|e| EnclaveError::Protocol(format!("invalid enclave endpoint {path}: {e}")))
    }

    async fn decode<T: DeserializeOwned>(
        endpoint: &Url,
        response: reqwest::Response,
    ) -> Result<T, EnclaveError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| EnclaveError::Protocol(format!("malformed enclave response: {e}")));
        }

        let message = response
            .json::<EnclaveErrorBody>()
            .await
            .map(|body| body.error)
            .unwrap_or_else(|_| format!("HTTP {status}"));

        warn!(endpoint = %endpoint, status = %status, "enclave request failed");
        Err(match status {
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                EnclaveError::InvalidRequest(message)
            }
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
                EnclaveError::Unavailable(message)
            }
            _ => EnclaveError::Protocol(format!("unexpected enclave status {status}: {message}")),
        })
    }
}

fn transport_error(endpoint: &Url, e: reqwest::Error) -> EnclaveError {
    if e.is_timeout() {
        warn!(endpoint = %endpoint, "enclave request timed out");
        EnclaveError::Unavailable(format!("enclave request timed out: {endpoint}"))
    } else if e.is_connect() || e.is_request() {
        warn!(endpoint = %endpoint, error = %e, "enclave unreachable");
        EnclaveError::Unavailable(format!("enclave unreachable: {e}"))
    } else {
        EnclaveError::Protocol(e.to_string())
    }
}

#[async_trait]
impl EnclaveClient for RemoteEnclaveClient {
    async fn generate_seed(
        &self,
        organization_id: &str,
        user_id: &str,
        strength: u32,
    ) -> Result<GeneratedSeed, EnclaveError> {
        let endpoint = self.endpoint(GENERATE_PATH)?;
        debug!(organization_id, strength, "requesting seed from enclave");

        let response = self
            .http
            .post(endpoint.clone())
            .json(&GenerateSeedRequest {
                organization_id,
                user_id,
                strength,
            })
            .send()
            .await
            .map_err(|e| transport_error(&endpoint, e))?;

        let seed: GeneratedSeed = Self::decode(&endpoint, response).await?;
        if seed.strength != strength {
            return Err(EnclaveError::Protocol(format!(
                "enclave returned {} bits, requested {strength}",
                seed.strength
            )));
        }
        Ok(seed)
    }

    async fn validate_seed(&self, seed_phrase: &str) -> Result<SeedValidation, EnclaveError> {
        let endpoint = self.endpoint(VALIDATE_PATH)?;
        let response = self
            .http
            .post(endpoint.clone())
            .json(&ValidateSeedRequest { seed_phrase })
            .send()
            .await
            .map_err(|e| transport_error(&endpoint, e))?;

        Self::decode(&endpoint, response).await
    }

    async fn enclave_info(&self) -> Result<EnclaveInfo, EnclaveError> {
        let endpoint = self.endpoint(INFO_PATH)?;
        let response = self
            .http
            .get(endpoint.clone())
            .send()
            .await
            .map_err(|e| transport_error(&endpoint, e))?;

        Self::decode(&endpoint, response).await
    }
}
