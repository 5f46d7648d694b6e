//! Caller identity resolved from bearer credentials.
//!
//! Credential issuance lives with an external identity provider; this module
//! only verifies presented tokens and exposes the resulting principal.

use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for directory accounts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Identifier wrapper for hospital centres.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CentreId(pub String);

/// Directory roles the workflow distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Doctor,
    Staff,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Staff => "staff",
        }
    }
}

/// The authenticated principal attached to a workflow request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: UserId,
    pub role: Role,
    pub centre_id: Option<CentreId>,
}

/// Token verification seam, implemented against the deployment's identity
/// provider.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Option<CallerIdentity>;
}

/// Credential failures surfaced before any workflow logic runs.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("authorization credential missing")]
    Missing,
    #[error("authorization credential rejected")]
    Invalid,
}

/// Resolves the caller from an `Authorization: Bearer` header. An absent or
/// malformed header is reported separately from a rejected token.
pub fn authenticate(
    verifier: &dyn CredentialVerifier,
    headers: &HeaderMap,
) -> Result<CallerIdentity, IdentityError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(IdentityError::Missing)?;

    verifier.verify(token).ok_or(IdentityError::Invalid)
}
