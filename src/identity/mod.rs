// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

//! External identity providers and the sign-in flow.
//!
//! ## Sign-in
//!
//! 1. Match the provider subject against `external_id` and refresh the profile
//! 2. Otherwise link to an account with the same (verified) email
//! 3. Otherwise create the account and give it the `user` role

pub mod google;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::auth::BuiltinRole;
use crate::rbac::{NewUser, RbacError, RbacStore, User};

pub use google::{GoogleConfig, GoogleIdentityProvider};

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// Credential rejected, provider unreachable, or unusable profile
    #[error("identity provider error: {0}")]
    Provider(String),

    #[error("user store error: {0}")]
    Store(#[from] RbacError),
}

/// Profile returned by a provider for a verified credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub external_id: String,
    pub email: String,
    pub verified_email: bool,
    pub name: String,
    pub avatar_url: Option<String>,
}

/// What the client presented.
#[derive(Debug, Clone)]
pub enum ProviderCredential {
    /// Token from the implicit flow
    AccessToken(String),
    /// Authorization code to exchange
    Code(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, credential: &ProviderCredential) -> Result<ExternalIdentity, IdentityError>;

    /// Public settings the frontend needs to start a sign-in.
    fn client_config(&self) -> google::ClientConfig;
}

/// Find, link or create the local account for `identity`.
pub fn sign_in(rbac: &RbacStore, identity: &ExternalIdentity) -> Result<User, IdentityError> {
    if identity.external_id.is_empty() || identity.email.is_empty() {
        return Err(IdentityError::Provider("profile lacks id or email".to_string()));
    }
    let now = Utc::now();

    if let Some(mut user) = rbac.find_user_by_external_id(&identity.external_id)? {
        user.email = identity.email.clone();
        user.name = identity.name.clone();
        user.avatar_url = identity.avatar_url.clone();
        user.last_login_at = Some(now);
        let user = rbac.save_user(&user)?;
        info!(user_id = user.id, email = %user.email, "User logged in");
        return Ok(user);
    }

    if let Some(mut user) = rbac.find_user_by_email(&identity.email)? {
        if !identity.verified_email {
            return Err(IdentityError::Provider(
                "email not verified, refusing to link existing account".to_string(),
            ));
        }
        user.external_id = Some(identity.external_id.clone());
        user.name = identity.name.clone();
        user.avatar_url = identity.avatar_url.clone();
        user.last_login_at = Some(now);
        let user = rbac.save_user(&user)?;
        info!(user_id = user.id, email = %user.email, "Linked external account to existing user");
        return Ok(user);
    }

    let default_role = BuiltinRole::default().name();
    let mut user = rbac.create_user(NewUser {
        external_id: Some(identity.external_id.clone()),
        email: identity.email.clone(),
        name: identity.name.clone(),
        avatar_url: identity.avatar_url.clone(),
        role: default_role.to_string(),
    })?;
    user.last_login_at = Some(now);
    let user = rbac.save_user(&user)?;

    if let Err(e) = assign_by_name(rbac, user.id, default_role) {
        warn!(user_id = user.id, error = %e, "Failed to assign default role");
    }

    info!(user_id = user.id, email = %user.email, "New user created via external sign-in");
    Ok(user)
}

fn assign_by_name(rbac: &RbacStore, user_id: u64, role: &str) -> Result<(), RbacError> {
    let role = rbac
        .find_role_by_name(role)?
        .ok_or_else(|| RbacError::NotFound(format!("role '{role}'")))?;
    rbac.assign_role(user_id, role.id)
}
