use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use uuid::Uuid;

use crate::{authz::CapabilitySet, error::ApiError, tokens::TokenStore};

/// Principal
///
/// The resolved identity of an authenticated request: who the caller is and
/// what they may do. This is the only identity value route logic ever sees;
/// the password digest stays behind the repository boundary, and the raw
/// token string is dropped as soon as it has been resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// The unique identifier of the user, mapped to `users.id`.
    pub id: Uuid,
    pub username: String,
    /// The caller's granted capabilities, used for every authorization check.
    pub capabilities: CapabilitySet,
}

/// MaybeUser Extractor
///
/// The per-request authentication state machine. Three terminal states:
///
/// - No `Authorization` header at all → `MaybeUser(None)`; the request
///   proceeds anonymously (plenty of endpoints are public-readable).
/// - Header present but not a well-formed `Bearer <token>` → 401.
/// - Bearer token that the token store cannot resolve (unknown, expired, or
///   owned by a deleted account) → 401.
///
/// The asymmetry is deliberate and must not erode: a caller who *attempts*
/// authentication and fails is always rejected, never downgraded to
/// anonymous.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Principal>);

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
    // Allows the extractor to pull the TokenStore from the app state.
    TokenStore: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let tokens = TokenStore::from_ref(state);

        // Absence of a credential is not an error.
        let Some(value) = parts.headers.get(header::AUTHORIZATION) else {
            return Ok(MaybeUser(None));
        };

        // From here on, every failure is a hard 401.
        let value = value.to_str().map_err(|_| ApiError::Unauthorized)?;
        let token = value
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthorized)?;

        match tokens.resolve(token).await? {
            Some(principal) => Ok(MaybeUser(Some(principal))),
            None => Err(ApiError::Unauthorized),
        }
    }
}

/// AuthUser Extractor
///
/// Authentication-required variant: delegates to `MaybeUser` and turns the
/// anonymous case into a 401. Handlers on protected routes take this as an
/// argument, which both gates the request and hands the principal to the
/// business logic as an explicit value.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Principal);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenStore: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match MaybeUser::from_request_parts(parts, state).await? {
            MaybeUser(Some(principal)) => Ok(AuthUser(principal)),
            MaybeUser(None) => Err(ApiError::Unauthorized),
        }
    }
}
