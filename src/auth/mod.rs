// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

//! # Authentication Module
//!
//! Self-issued RS256 access tokens and the request-time access gate.
//!
//! ## Auth Flow
//!
//! 1. Client signs in with Google and receives an access/refresh token pair
//! 2. Client sends `Authorization: Bearer <access token>`
//! 3. Server:
//!    - Verifies signature (RS256 only), expiry, not-before, issuer
//!    - Extracts `user_id`, `username`, `role` and the permission snapshot
//!    - Applies role/permission requirements for the route
//!
//! ## Security
//!
//! - No clock skew leeway
//! - Every 401 has the same body; the failure reason is only logged
//! - Permissions are a closed enum, so requirements cannot be misspelled

pub mod claims;
pub mod codec;
pub mod error;
pub mod extractor;
pub mod guard;
pub mod keys;
pub mod middleware;
pub mod permissions;
pub mod roles;

pub use claims::{AccessTokenClaims, AuthenticatedUser, TokenSubject};
pub use codec::{TokenCodec, TokenError};
pub use error::AuthError;
pub use extractor::Auth;
pub use guard::{require_all_permissions, require_permission, require_role, Requirement};
pub use keys::{KeyConfig, KeyError, KeyOrigin, SigningKeys};
pub use permissions::Permission;
pub use roles::BuiltinRole;
