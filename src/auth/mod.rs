// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer session authentication for the custody API.
//!
//! ## Auth Flow
//!
//! 1. A client signs in at `POST /v1/session/login` with an identity assertion,
//!    a short-lived HS256 JWT checked by [`IdentityVerifier`]
//! 2. The server issues an opaque session token backed by the cache store
//! 3. Clients send `Authorization: Bearer <token>` on every other request
//! 4. The [`Auth`] extractor resolves the token to its [`SessionData`](crate::session::SessionData)
//!
//! ## Security
//!
//! - All non-health endpoints except sign-in require a session
//! - Sign-in trusts only assertions signed with the configured secret
//! - Tokens are never logged
//! - Root-only operations are gated again by the service, not just by [`Role`]

pub mod assertion;
pub mod error;
pub mod extractor;
pub mod roles;

pub use assertion::{IdentityClaims, IdentityVerifier, ASSERTION_AUDIENCE};
pub use error::AuthError;
pub use extractor::{Auth, BearerToken, RootOnly};
pub use roles::Role;
