//! # Authentication Module
//!
//! Resolves every request to exactly one owner.
//!
//! ## Configuration
//!
//! Accounts are configured in the `[[accounts]]` section of the config file:
//! each bearer token maps to one owner id. With no accounts configured the
//! server runs in development mode and every request acts as `dev_owner`.
//!
//! ## Usage
//!
//! Send the token in the Authorization header:
//! ```text
//! Authorization: Bearer <your-token>
//! ```

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use waypoint_core::OwnerId;

use crate::config::Account;

/// The authenticated owner, placed in request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner(pub OwnerId);

// =============================================================================
// ACCOUNTS
// =============================================================================

/// Token table used by the auth middleware.
#[derive(Clone)]
pub struct Accounts {
    tokens: Vec<(Vec<u8>, OwnerId)>,
    dev_owner: OwnerId,
}

impl std::fmt::Debug for Accounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accounts")
            .field("accounts", &self.tokens.len())
            .field("dev_owner", &self.dev_owner)
            .finish()
    }
}

impl Accounts {
    #[must_use]
    pub fn new(accounts: &[Account], dev_owner: OwnerId) -> Self {
        Self {
            tokens: accounts
                .iter()
                .map(|a| (a.token.as_bytes().to_vec(), OwnerId(a.owner)))
                .collect(),
            dev_owner,
        }
    }

    /// Development mode: every request is `owner`.
    #[must_use]
    pub fn development(owner: OwnerId) -> Self {
        Self::new(&[], owner)
    }

    #[must_use]
    pub fn dev_owner(&self) -> OwnerId {
        self.dev_owner
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Owner for a presented token, compared in constant time.
    ///
    /// Every configured token is checked so the time taken does not reveal
    /// which entry matched.
    #[must_use]
    pub fn resolve(&self, provided: &str) -> Option<OwnerId> {
        let provided = provided.as_bytes();
        let mut found = None;
        for (expected, owner) in &self.tokens {
            if constant_time_eq(provided, expected) && found.is_none() {
                found = Some(*owner);
            }
        }
        found
    }
}

/// Compare two byte strings without leaking where they differ.
///
/// Both sides are padded to the same length so `ct_eq` always runs over the
/// same number of bytes.
fn constant_time_eq(provided: &[u8], expected: &[u8]) -> bool {
    let max_len = provided.len().max(expected.len());
    let mut padded_provided = vec![0u8; max_len];
    let mut padded_expected = vec![0u8; max_len];
    padded_provided[..provided.len()].copy_from_slice(provided);
    padded_expected[..expected.len()].copy_from_slice(expected);

    let bytes_match: bool = padded_provided.ct_eq(&padded_expected).into();
    bytes_match && provided.len() == expected.len()
}

// =============================================================================
// MIDDLEWARE
// =============================================================================

/// Owner resolution middleware.
///
/// - `/health` is always allowed and carries no owner
/// - In development mode every request gets `dev_owner`
/// - Otherwise `Authorization: Bearer <token>` must match an account
pub async fn owner_auth_middleware(
    State(accounts): State<Arc<Accounts>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    if accounts.is_development() {
        request.extensions_mut().insert(Owner(accounts.dev_owner));
        return Ok(next.run(request).await);
    }

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let Some(header_value) = auth_header else {
        tracing::warn!(
            event = "auth_failure",
            reason = "missing_authorization_header",
            "Missing Authorization header"
        );
        return Err((StatusCode::UNAUTHORIZED, "Unauthorized"));
    };

    let provided = header_value.strip_prefix("Bearer ").unwrap_or(header_value);
    match accounts.resolve(provided) {
        Some(owner) => {
            request.extensions_mut().insert(Owner(owner));
            Ok(next.run(request).await)
        }
        None => {
            tracing::warn!(
                event = "auth_failure",
                reason = "invalid_token",
                "Authentication failed: invalid token"
            );
            Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
