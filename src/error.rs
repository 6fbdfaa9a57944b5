// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error taxonomy of the custody core and its HTTP rendering.
//!
//! Every component reports failures with its own error type; the façade
//! folds them into [`ServiceError`], which the router turns into an
//! [`ApiError`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::{
    derivation::DerivationError, enclave::EnclaveError, session::CacheError, storage::StoreError,
};

/// Errors surfaced by the custody core.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// Malformed input, caught before any side effect.
    #[error("{0}")]
    Validation(String),
    /// Uniqueness violation or invalid state transition.
    #[error("{0}")]
    Conflict(String),
    /// Missing entity.
    #[error("{0}")]
    NotFound(String),
    /// The secure enclave could not be reached in time. Retryable.
    #[error("enclave unavailable: {0}")]
    EnclaveUnavailable(String),
    /// Session or other time-bound credential expired.
    #[error("{0}")]
    Expired(String),
    /// The principal is not allowed to perform the operation.
    #[error("{0}")]
    PermissionDenied(String),
    /// Deleting the wallet would destroy key material that was not exported.
    #[error("{0}")]
    ExportRequired(String),
    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ServiceError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ServiceError::Conflict(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ServiceError::Internal(message.into())
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        ServiceError::PermissionDenied(message.into())
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::EnclaveUnavailable(_))
    }

    /// Stable machine-readable code.
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation_error",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::EnclaveUnavailable(_) => "enclave_unavailable",
            ServiceError::Expired(_) => "expired",
            ServiceError::PermissionDenied(_) => "permission_denied",
            ServiceError::ExportRequired(_) => "export_required",
            ServiceError::Internal(_) => "internal_error",
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            StoreError::NotFound(msg) => ServiceError::NotFound(msg),
            StoreError::InvalidCursor => ServiceError::Validation("invalid page token".to_string()),
            other => {
                tracing::error!(error = %other, "relational store failure");
                ServiceError::Internal(other.to_string())
            }
        }
    }
}

impl From<EnclaveError> for ServiceError {
    fn from(e: EnclaveError) -> Self {
        match e {
            EnclaveError::Unavailable(msg) => ServiceError::EnclaveUnavailable(msg),
            EnclaveError::InvalidRequest(msg) => ServiceError::Validation(msg),
            EnclaveError::Protocol(msg) => {
                tracing::error!(error = %msg, "enclave protocol violation");
                ServiceError::Internal(format!("enclave protocol error: {msg}"))
            }
        }
    }
}

impl From<DerivationError> for ServiceError {
    fn from(e: DerivationError) -> Self {
        match e {
            DerivationError::Key(msg) => ServiceError::Internal(format!("key derivation failed: {msg}")),
            // Mnemonics and entropy come from the enclave, never from the caller.
            enclave @ (DerivationError::InvalidMnemonic(_) | DerivationError::InvalidStrength(_)) => {
                ServiceError::Internal(format!("enclave protocol error: {enclave}"))
            }
            other => ServiceError::Validation(other.to_string()),
        }
    }
}

impl From<CacheError> for ServiceError {
    fn from(e: CacheError) -> Self {
        tracing::error!(error = %e, "cache store failure");
        ServiceError::Internal(e.to_string())
    }
}

// =============================================================================
// HTTP rendering
// =============================================================================

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub error_code: &'static str,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_code: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            error_code: "error",
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::from(ServiceError::NotFound(message.into()))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::from(ServiceError::Validation(message.into()))
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        let status = match &e {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::EnclaveUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Expired(_) => StatusCode::UNAUTHORIZED,
            ServiceError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ServiceError::ExportRequired(_) => StatusCode::PRECONDITION_FAILED,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            error_code: e.error_code(),
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.error_code.to_string(),
        });
        (self.status, body).into_response()
    }
}
