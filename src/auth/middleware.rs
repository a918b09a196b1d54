// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

//! Router-level authentication and authorization middleware.
//!
//! ```rust,ignore
//! let admin = Router::new()
//!     .route("/roles", get(list_roles))
//!     .route_layer(from_fn_with_state(
//!         Requirement::AnyRole(vec!["admin".into()]),
//!         enforce,
//!     ))
//!     .route_layer(from_fn_with_state(codec.clone(), authenticate));
//! ```
//!
//! Layers run outermost first, so `authenticate` must be added last.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::codec::TokenCodec;
use super::extractor::authenticate_headers;
use super::guard::Requirement;
use super::{AuthError, AuthenticatedUser};

/// Verify the bearer token and attach the [`AuthenticatedUser`].
pub async fn authenticate(State(codec): State<Arc<TokenCodec>>, mut request: Request, next: Next) -> Response {
    match authenticate_headers(request.headers(), &codec) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Reject requests whose user does not satisfy `requirement`.
pub async fn enforce(State(requirement): State<Requirement>, request: Request, next: Next) -> Response {
    let Some(user) = request.extensions().get::<AuthenticatedUser>() else {
        return AuthError::NotAuthenticated.into_response();
    };

    if let Err(e) = requirement.check(user) {
        debug!(user_id = %user.user_id, ?requirement, "Access denied");
        return e.into_response();
    }

    next.run(request).await
}
