// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth::TokenCodec;
use crate::identity::IdentityProvider;
use crate::rbac::RbacStore;
use crate::session::SessionManager;

/// Refresh cookie attributes.
#[derive(Debug, Clone, Default)]
pub struct CookieSettings {
    pub secure: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub codec: Arc<TokenCodec>,
    pub sessions: SessionManager,
    pub rbac: RbacStore,
    pub identity: Arc<dyn IdentityProvider>,
    pub cookie: CookieSettings,
}

impl AppState {
    pub fn new(
        codec: Arc<TokenCodec>,
        sessions: SessionManager,
        rbac: RbacStore,
        identity: Arc<dyn IdentityProvider>,
        cookie: CookieSettings,
    ) -> Self {
        Self {
            codec,
            sessions,
            rbac,
            identity,
            cookie,
        }
    }
}

impl FromRef<AppState> for Arc<TokenCodec> {
    fn from_ref(state: &AppState) -> Self {
        state.codec.clone()
    }
}
