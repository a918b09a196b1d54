// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

//! Authorization predicates.
//!
//! Pure functions over an [`AuthenticatedUser`]; usable directly in handlers
//! or attached to a router through [`Requirement`] and
//! [`super::middleware::enforce`].

use super::{AuthError, AuthenticatedUser, Permission};

/// Allow if the user's role is any of `one_of` (exact match).
pub fn require_role(user: &AuthenticatedUser, one_of: &[&str]) -> Result<(), AuthError> {
    if one_of.iter().any(|role| user.has_role(role)) {
        Ok(())
    } else {
        Err(AuthError::RoleRequired)
    }
}

/// Allow if the user holds any of `one_of`.
pub fn require_permission(user: &AuthenticatedUser, one_of: &[Permission]) -> Result<(), AuthError> {
    if one_of.iter().any(|p| user.has_permission(*p)) {
        Ok(())
    } else {
        Err(AuthError::PermissionRequired {
            required: one_of.to_vec(),
        })
    }
}

/// Allow only if the user holds every permission in `all_of`.
pub fn require_all_permissions(user: &AuthenticatedUser, all_of: &[Permission]) -> Result<(), AuthError> {
    let missing: Vec<Permission> = all_of
        .iter()
        .copied()
        .filter(|p| !user.has_permission(*p))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AuthError::PermissionsMissing { missing })
    }
}

/// A requirement attached to a route group.
#[derive(Debug, Clone)]
pub enum Requirement {
    AnyRole(Vec<String>),
    AnyPermission(Vec<Permission>),
    AllPermissions(Vec<Permission>),
}

impl Requirement {
    pub fn check(&self, user: &AuthenticatedUser) -> Result<(), AuthError> {
        match self {
            Requirement::AnyRole(roles) => {
                let roles: Vec<&str> = roles.iter().map(String::as_str).collect();
                require_role(user, &roles)
            }
            Requirement::AnyPermission(permissions) => require_permission(user, permissions),
            Requirement::AllPermissions(permissions) => require_all_permissions(user, permissions),
        }
    }
}
