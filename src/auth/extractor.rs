// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

//! Axum extractor for authenticated users.
//!
//! Use the `Auth` extractor in handlers to require authentication:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user is AuthenticatedUser
//! }
//! ```

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::debug;

use super::codec::TokenCodec;
use super::{AuthError, AuthenticatedUser};

/// Extractor for authenticated users.
///
/// Reuses the user placed in request extensions by
/// [`super::middleware::authenticate`] when present; otherwise verifies the
/// bearer token itself.
pub struct Auth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for Auth
where
    Arc<TokenCodec>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>().cloned() {
            return Ok(Auth(user));
        }

        let codec = Arc::<TokenCodec>::from_ref(state);
        let user = authenticate_headers(&parts.headers, &codec)?;
        Ok(Auth(user))
    }
}

/// Pull the bearer token out of `Authorization`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or(AuthError::InvalidAuthHeader)?;

    if token.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }
    Ok(token)
}

/// Verify the request's bearer token and build the caller identity.
pub fn authenticate_headers(headers: &HeaderMap, codec: &TokenCodec) -> Result<AuthenticatedUser, AuthError> {
    let token = bearer_token(headers)?;
    let claims = codec.verify_access_token(token).map_err(|e| {
        debug!(reason = e.kind(), "Access token rejected");
        AuthError::InvalidToken(e)
    })?;
    Ok(AuthenticatedUser::from_claims(claims))
}
