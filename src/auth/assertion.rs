// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Verification of identity assertions presented at sign-in.
//!
//! The OAuth front end that talks to the identity provider hands the client a
//! short-lived HS256 JWT over the profile it received. Only assertions signed
//! with the shared `IDENTITY_ASSERTION_SECRET`, issued by the configured
//! issuer and addressed to [`ASSERTION_AUDIENCE`] are accepted.

use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use super::AuthError;
use crate::authority::IdentityAssertion;

/// Audience every sign-in assertion must name.
pub const ASSERTION_AUDIENCE: &str = "quorum-custody-server";

/// Longest accepted `exp - iat`, in seconds.
pub const MAX_ASSERTION_LIFETIME_SECS: u64 = 300;

/// Clock skew tolerance (seconds)
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Claims of a sign-in assertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Subject id at the provider.
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    /// Provider name, e.g. `google`.
    pub provider: String,
    pub iss: String,
    pub aud: String,
    pub iat: u64,
    pub exp: u64,
}

impl IdentityClaims {
    fn into_identity(self) -> (String, IdentityAssertion) {
        let identity = IdentityAssertion {
            subject_id: self.sub,
            email: self.email,
            display_name: self.name.unwrap_or_default(),
            picture: self.picture,
            access_token: None,
            refresh_token: None,
            expires_at: None,
        };
        (self.provider, identity)
    }
}

pub struct IdentityVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl IdentityVerifier {
    pub fn new(secret: &[u8], issuer: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[ASSERTION_AUDIENCE]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Check the signature and claims of `token`; returns the provider name and identity.
    pub fn verify(&self, token: &str) -> Result<(String, IdentityAssertion), AuthError> {
        let claims = decode::<IdentityClaims>(token.trim(), &self.key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::AssertionExpired,
                ErrorKind::InvalidSignature => AuthError::InvalidAssertion("invalid signature".into()),
                ErrorKind::InvalidIssuer => AuthError::InvalidAssertion("untrusted issuer".into()),
                ErrorKind::InvalidAudience => AuthError::InvalidAssertion("wrong audience".into()),
                ErrorKind::ImmatureSignature => AuthError::InvalidAssertion("not yet valid".into()),
                _ => AuthError::InvalidAssertion("malformed assertion".into()),
            })?
            .claims;

        if claims.exp.saturating_sub(claims.iat) > MAX_ASSERTION_LIFETIME_SECS {
            return Err(AuthError::InvalidAssertion("lifetime too long".into()));
        }
        if claims.provider.trim().is_empty() {
            return Err(AuthError::InvalidAssertion("provider is required".into()));
        }
        Ok(claims.into_identity())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use base64ct::{Base64UrlUnpadded, Encoding};

    fn verifier() -> IdentityVerifier {
        IdentityVerifier::new(SECRET, ISSUER)
    }

    #[test]
    fn signed_assertions_yield_the_identity() {
        let (provider, identity) = verifier().verify(&sign(&claims("sub-1", "ada@example.com"))).unwrap();
        assert_eq!(provider, "google");
        assert_eq!(identity.subject_id, "sub-1");
        assert_eq!(identity.email, "ada@example.com");
        assert_eq!(identity.display_name, "Ada Lovelace");
    }

    #[test]
    fn forged_signatures_are_rejected() {
        let token = sign_with(b"some-other-secret-of-sufficient-length!!", &claims("sub-1", "ada@example.com"));
        assert_eq!(
            verifier().verify(&token).unwrap_err(),
            AuthError::InvalidAssertion("invalid signature".into())
        );
    }

    #[test]
    fn unsigned_assertions_are_rejected() {
        let header = Base64UrlUnpadded::encode_string(br#"{"alg":"none","typ":"JWT"}"#);
        let body = serde_json::to_vec(&claims("sub-1", "ada@example.com")).unwrap();
        let token = format!("{header}.{}.", Base64UrlUnpadded::encode_string(&body));

        assert!(matches!(
            verifier().verify(&token),
            Err(AuthError::InvalidAssertion(_))
        ));
        assert!(matches!(
            verifier().verify("not-a-jwt"),
            Err(AuthError::InvalidAssertion(_))
        ));
    }

    #[test]
    fn stale_or_foreign_assertions_are_rejected() {
        let mut expired = claims("sub-1", "ada@example.com");
        expired.iat = now() - 700;
        expired.exp = now() - 600;
        assert_eq!(verifier().verify(&sign(&expired)).unwrap_err(), AuthError::AssertionExpired);

        let mut foreign = claims("sub-1", "ada@example.com");
        foreign.iss = "someone-else".into();
        assert_eq!(
            verifier().verify(&sign(&foreign)).unwrap_err(),
            AuthError::InvalidAssertion("untrusted issuer".into())
        );

        let mut misaddressed = claims("sub-1", "ada@example.com");
        misaddressed.aud = "another-service".into();
        assert_eq!(
            verifier().verify(&sign(&misaddressed)).unwrap_err(),
            AuthError::InvalidAssertion("wrong audience".into())
        );

        let mut long_lived = claims("sub-1", "ada@example.com");
        long_lived.exp = long_lived.iat + 3600;
        assert_eq!(
            verifier().verify(&sign(&long_lived)).unwrap_err(),
            AuthError::InvalidAssertion("lifetime too long".into())
        );
    }
}
