//! Request extractors.
//!
//! Identity is asserted by the upstream identity provider through trusted
//! headers; this service never sees credentials.
//!
//! - `X-User-Id`: caller's UUID (required)
//! - `X-User-Email`: caller's email (required)
//! - `X-User-Role`: `admin` unlocks the catalog admin routes

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

use super::error::ApiError;
use crate::types::{UserId, UserIdentity};

/// Header carrying the caller's id
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the caller's email
pub const USER_EMAIL_HEADER: &str = "x-user-email";
/// Header carrying the caller's role
pub const USER_ROLE_HEADER: &str = "x-user-role";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn identity_from(headers: &HeaderMap) -> Result<UserIdentity, ApiError> {
    let user_id = header(headers, USER_ID_HEADER)
        .ok_or_else(|| ApiError::unauthenticated("missing X-User-Id"))?
        .parse::<UserId>()
        .map_err(|_| ApiError::unauthenticated("malformed X-User-Id"))?;
    let email = header(headers, USER_EMAIL_HEADER).ok_or_else(|| ApiError::unauthenticated("missing X-User-Email"))?;
    Ok(UserIdentity::new(user_id, email))
}

/// Authenticated caller.
#[derive(Debug, Clone)]
pub struct Identity(pub UserIdentity);

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        identity_from(&parts.headers).map(Self)
    }
}

/// Authenticated caller holding the admin role.
#[derive(Debug, Clone)]
pub struct Admin(pub UserIdentity);

#[async_trait]
impl<S> FromRequestParts<S> for Admin
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = identity_from(&parts.headers)?;
        if !header(&parts.headers, USER_ROLE_HEADER).is_some_and(|role| role.eq_ignore_ascii_case("admin")) {
            tracing::warn!(user_id = %identity.user_id, "Admin route refused");
            return Err(ApiError::forbidden("admin role required"));
        }
        Ok(Self(identity))
    }
}
