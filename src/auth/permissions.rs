// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

//! The permission catalog.
//!
//! Permissions are a closed set. Tokens carry them as `resource:action`
//! strings, but every requirement checked by the gate is expressed with this
//! enum so a typo fails to compile instead of silently denying forever.
//! The catalog is seeded into the RBAC store at startup and checked with
//! [`crate::rbac::RbacStore::verify_catalog`].

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A single `resource:action` permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub enum Permission {
    #[serde(rename = "ping:read")]
    PingRead,
    #[serde(rename = "news:read")]
    NewsRead,
    #[serde(rename = "news:create")]
    NewsCreate,
    #[serde(rename = "news:update")]
    NewsUpdate,
    #[serde(rename = "news:delete")]
    NewsDelete,
    #[serde(rename = "users:read")]
    UsersRead,
    #[serde(rename = "users:update")]
    UsersUpdate,
    #[serde(rename = "users:delete")]
    UsersDelete,
    #[serde(rename = "users:manage_roles")]
    UsersManageRoles,
    #[serde(rename = "roles:read")]
    RolesRead,
    #[serde(rename = "roles:create")]
    RolesCreate,
    #[serde(rename = "roles:update")]
    RolesUpdate,
    #[serde(rename = "roles:delete")]
    RolesDelete,
}

impl Permission {
    /// Every permission, in catalog (seeding) order.
    pub const ALL: [Permission; 13] = [
        Permission::PingRead,
        Permission::NewsRead,
        Permission::NewsCreate,
        Permission::NewsUpdate,
        Permission::NewsDelete,
        Permission::UsersRead,
        Permission::UsersUpdate,
        Permission::UsersDelete,
        Permission::UsersManageRoles,
        Permission::RolesRead,
        Permission::RolesCreate,
        Permission::RolesUpdate,
        Permission::RolesDelete,
    ];

    /// Wire name, e.g. `news:read`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::PingRead => "ping:read",
            Permission::NewsRead => "news:read",
            Permission::NewsCreate => "news:create",
            Permission::NewsUpdate => "news:update",
            Permission::NewsDelete => "news:delete",
            Permission::UsersRead => "users:read",
            Permission::UsersUpdate => "users:update",
            Permission::UsersDelete => "users:delete",
            Permission::UsersManageRoles => "users:manage_roles",
            Permission::RolesRead => "roles:read",
            Permission::RolesCreate => "roles:create",
            Permission::RolesUpdate => "roles:update",
            Permission::RolesDelete => "roles:delete",
        }
    }

    /// Resource half of the name.
    pub fn resource(&self) -> &'static str {
        self.split().0
    }

    /// Action half of the name.
    pub fn action(&self) -> &'static str {
        self.split().1
    }

    fn split(&self) -> (&'static str, &'static str) {
        // Every catalog name contains exactly one ':'
        self.as_str().split_once(':').unwrap_or((self.as_str(), ""))
    }

    /// Human-readable description stored alongside the seeded row.
    pub fn description(&self) -> &'static str {
        match self {
            Permission::PingRead => "Can ping the API",
            Permission::NewsRead => "Can read news articles",
            Permission::NewsCreate => "Can create news articles",
            Permission::NewsUpdate => "Can update news articles",
            Permission::NewsDelete => "Can delete news articles",
            Permission::UsersRead => "Can view users",
            Permission::UsersUpdate => "Can update users",
            Permission::UsersDelete => "Can delete users",
            Permission::UsersManageRoles => "Can manage user roles",
            Permission::RolesRead => "Can view roles",
            Permission::RolesCreate => "Can create roles",
            Permission::RolesUpdate => "Can update roles",
            Permission::RolesDelete => "Can delete roles",
        }
    }

    /// Parse a wire name. Exact match only.
    pub fn from_name(name: &str) -> Option<Permission> {
        Permission::ALL.into_iter().find(|p| p.as_str() == name)
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
