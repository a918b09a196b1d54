// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

use crate::identity::IdentityError;
use crate::rbac::RbacError;
use crate::session::{SessionError, StoreError};

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_code: &'static str,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.code,
        });
        (self.status, body).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::InvalidOrExpired => ApiError::unauthorized("invalid or expired refresh token"),
            SessionError::StoreUnavailable(msg) => {
                warn!(error = %msg, "Session store unavailable");
                ApiError::unavailable("session store unavailable")
            }
            SessionError::Token(e) => {
                error!(error = %e, "Token issuance failed");
                ApiError::internal("failed to issue tokens")
            }
            SessionError::Internal(msg) => {
                error!(error = %msg, "Session error");
                ApiError::internal("session error")
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        SessionError::from(e).into()
    }
}

impl From<RbacError> for ApiError {
    fn from(e: RbacError) -> Self {
        match e {
            RbacError::NotFound(what) => ApiError::not_found(format!("{what} not found")),
            RbacError::Conflict(what) => {
                ApiError::new(StatusCode::CONFLICT, "conflict", format!("{what} already exists"))
            }
            RbacError::SystemRole(name) => ApiError::new(
                StatusCode::FORBIDDEN,
                "system_role",
                format!("system role '{name}' cannot be modified"),
            ),
            RbacError::InvalidUserId(id) => ApiError::bad_request(format!("invalid user id '{id}'")),
            other => {
                error!(error = %other, "RBAC store error");
                ApiError::internal("database error")
            }
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::Provider(msg) => {
                warn!(error = %msg, "Identity provider rejected sign-in");
                ApiError::unauthorized("invalid Google credentials")
            }
            IdentityError::Store(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn domain_errors_map_to_status() {
        assert_eq!(
            ApiError::from(SessionError::InvalidOrExpired).status,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(StoreError::Unavailable("down".into())).status,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(RbacError::Conflict("role 'x'".into())).status,
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(RbacError::SystemRole("admin".into())).status,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(IdentityError::Provider("HTTP 401".into())).status,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(IdentityError::Store(RbacError::NotFound("user 1".into()))).status,
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn provider_detail_is_not_echoed() {
        let err = ApiError::from(IdentityError::Provider("HTTP 401 from userinfo endpoint".into()));
        assert_eq!(err.message, "invalid Google credentials");
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data","error_code":"bad_request"}"#);
    }
}
