// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

//! User endpoints.

use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::{Auth, AuthenticatedUser};

/// Response for GET /api/v1/users/me
#[derive(Debug, Serialize, ToSchema)]
pub struct UserMeResponse {
    pub user_id: String,
    /// Login email
    pub username: String,
    pub role: String,
    /// Permission snapshot carried by the access token
    pub permissions: Vec<String>,
    /// Access token expiry (Unix seconds)
    pub expires_at: i64,
}

impl From<AuthenticatedUser> for UserMeResponse {
    fn from(user: AuthenticatedUser) -> Self {
        Self {
            user_id: user.user_id,
            username: user.username,
            role: user.role,
            permissions: user.permissions,
            expires_at: user.expires_at,
        }
    }
}

/// Get the current authenticated user's identity and permissions.
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "User information", body = UserMeResponse),
        (status = 401, description = "Unauthorized - invalid or missing token"),
    )
)]
pub async fn get_current_user(Auth(user): Auth) -> Json<UserMeResponse> {
    Json(user.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_me_response_from_authenticated_user() {
        let user = AuthenticatedUser {
            user_id: "42".to_string(),
            username: "a@x.com".to_string(),
            role: "user".to_string(),
            permissions: vec!["ping:read".to_string()],
            issuer: "chattycathy".to_string(),
            expires_at: 1_700_000_900,
        };

        let response: UserMeResponse = user.into();
        assert_eq!(response.user_id, "42");
        assert_eq!(response.username, "a@x.com");
        assert_eq!(response.permissions, vec!["ping:read"]);
        assert_eq!(response.expires_at, 1_700_000_900);
    }
}
