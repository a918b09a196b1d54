// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

//! Authentication and authorization errors.
//!
//! Every 401 carries the same message regardless of why verification failed;
//! the specific reason only goes to the log.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::codec::TokenError;
use super::Permission;

#[derive(Debug)]
pub enum AuthError {
    /// No authorization header present
    MissingAuthHeader,
    /// Header is not `Bearer <token>`
    InvalidAuthHeader,
    /// Token failed verification
    InvalidToken(TokenError),
    /// Handler reached without the authenticate step
    NotAuthenticated,
    /// Caller holds none of the accepted roles
    RoleRequired,
    /// Caller holds none of the listed permissions
    PermissionRequired { required: Vec<Permission> },
    /// Caller lacks some of the listed permissions
    PermissionsMissing { missing: Vec<Permission> },
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    required: Option<Vec<Permission>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    missing: Option<Vec<Permission>>,
}

impl AuthError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::InvalidToken(_) => "invalid_token",
            AuthError::NotAuthenticated => "not_authenticated",
            AuthError::RoleRequired => "insufficient_role",
            AuthError::PermissionRequired { .. } | AuthError::PermissionsMissing { .. } => {
                "insufficient_permissions"
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::InvalidToken(_)
            | AuthError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            AuthError::RoleRequired
            | AuthError::PermissionRequired { .. }
            | AuthError::PermissionsMissing { .. } => StatusCode::FORBIDDEN,
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
            AuthError::InvalidToken(_) => write!(f, "Invalid or expired token"),
            AuthError::NotAuthenticated => write!(f, "Not authenticated"),
            AuthError::RoleRequired => write!(f, "Insufficient role"),
            AuthError::PermissionRequired { .. } | AuthError::PermissionsMissing { .. } => {
                write!(f, "Insufficient permissions")
            }
        }
    }
}

impl std::error::Error for AuthError {}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        AuthError::InvalidToken(e)
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error = self.to_string();
        let error_code = self.error_code();
        let (required, missing) = match self {
            AuthError::PermissionRequired { required } => (Some(required), None),
            AuthError::PermissionsMissing { missing } => (None, Some(missing)),
            _ => (None, None),
        };
        let body = Json(AuthErrorBody {
            error,
            error_code,
            required,
            missing,
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(err: AuthError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn missing_auth_returns_401() {
        let (status, body) = body_of(AuthError::MissingAuthHeader).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error_code"], "missing_auth_header");
    }

    #[tokio::test]
    async fn token_failures_share_one_body() {
        let (_, expired) = body_of(AuthError::InvalidToken(TokenError::Expired)).await;
        let (_, forged) = body_of(AuthError::InvalidToken(TokenError::InvalidSignature)).await;
        let (status, malformed) =
            body_of(AuthError::InvalidToken(TokenError::Malformed("x".into()))).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(expired, forged);
        assert_eq!(forged, malformed);
    }

    #[tokio::test]
    async fn role_required_does_not_enumerate_roles() {
        let (status, body) = body_of(AuthError::RoleRequired).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body.get("required").is_none());
        assert!(body.get("missing").is_none());
    }

    #[tokio::test]
    async fn permission_required_lists_required() {
        let (status, body) = body_of(AuthError::PermissionRequired {
            required: vec![Permission::NewsDelete],
        })
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["required"], serde_json::json!(["news:delete"]));
    }

    #[tokio::test]
    async fn permissions_missing_lists_missing() {
        let (_, body) = body_of(AuthError::PermissionsMissing {
            missing: vec![Permission::RolesRead, Permission::RolesUpdate],
        })
        .await;
        assert_eq!(body["missing"], serde_json::json!(["roles:read", "roles:update"]));
        assert!(body.get("required").is_none());
    }
}
