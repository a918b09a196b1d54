// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

//! Access token claims and the authenticated user representation.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::Permission;

/// Claims carried by an RS256 access token.
///
/// `sub` always equals `user_id`; `user_id` is kept as its own claim so
/// downstream services reading the token do not need to know that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub user_id: String,
    pub username: String,
    pub role: String,
    /// Permission snapshot at issue time, `resource:action` strings
    #[serde(default)]
    pub permissions: Vec<String>,

    /// Issuer
    pub iss: String,
    /// Subject (user ID)
    pub sub: String,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Not before (Unix seconds)
    pub nbf: i64,
    /// Expiration (Unix seconds)
    pub exp: i64,
}

/// Identity and permission snapshot a token is issued for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSubject {
    pub user_id: String,
    pub username: String,
    pub role: String,
    pub permissions: Vec<String>,
}

/// Authenticated user information extracted from a verified access token.
///
/// This is the primary type handlers and guards use to represent the caller.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub username: String,
    /// Legacy single-role label
    pub role: String,
    pub permissions: Vec<String>,

    #[serde(skip)]
    pub issuer: String,

    /// Token expiration (Unix timestamp)
    #[serde(skip)]
    pub expires_at: i64,
}

impl AuthenticatedUser {
    pub fn from_claims(claims: AccessTokenClaims) -> Self {
        Self {
            user_id: claims.user_id,
            username: claims.username,
            role: claims.role,
            permissions: claims.permissions,
            issuer: claims.iss,
            expires_at: claims.exp,
        }
    }

    /// Exact, case-sensitive role comparison.
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.iter().any(|p| p == permission.as_str())
    }
}
