// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::{ApiError, ServiceError};

#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    /// No authorization header present
    MissingAuthHeader,
    /// Invalid authorization header format
    InvalidAuthHeader,
    /// Unknown, revoked or expired session
    SessionExpired,
    /// Session store unreachable or corrupt
    InternalError(String),
    /// Session role too low for the endpoint
    InsufficientPermissions,
    /// Sign-in assertion failed signature or claim checks
    InvalidAssertion(String),
    /// Sign-in assertion past its `exp`
    AssertionExpired,
    /// No assertion secret configured, so nobody can sign in
    SignInDisabled,
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::SessionExpired => "session_expired",
            AuthError::InternalError(_) => "internal_error",
            AuthError::InsufficientPermissions => "insufficient_permissions",
            AuthError::InvalidAssertion(_) => "invalid_assertion",
            AuthError::AssertionExpired => "assertion_expired",
            AuthError::SignInDisabled => "sign_in_disabled",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::SessionExpired
            | AuthError::InvalidAssertion(_)
            | AuthError::AssertionExpired
            | AuthError::SignInDisabled => StatusCode::UNAUTHORIZED,
            AuthError::InsufficientPermissions => StatusCode::FORBIDDEN,
            AuthError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingAuthHeader => write!(f, "Authorization header is required"),
            AuthError::InvalidAuthHeader => {
                write!(f, "Invalid authorization header format (expected 'Bearer <token>')")
            }
            AuthError::SessionExpired => write!(f, "Session expired or revoked"),
            AuthError::InternalError(msg) => write!(f, "Internal authentication error: {msg}"),
            AuthError::InsufficientPermissions => {
                write!(f, "Insufficient permissions for this operation")
            }
            AuthError::InvalidAssertion(reason) => write!(f, "Invalid identity assertion: {reason}"),
            AuthError::AssertionExpired => write!(f, "Identity assertion expired"),
            AuthError::SignInDisabled => write!(f, "Identity sign-in is not configured"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<ServiceError> for AuthError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Expired(_) | ServiceError::NotFound(_) => AuthError::SessionExpired,
            ServiceError::PermissionDenied(_) => AuthError::InsufficientPermissions,
            other => AuthError::InternalError(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError {
            status: e.status_code(),
            message: e.to_string(),
            error_code: e.error_code(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
