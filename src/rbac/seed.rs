// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

//! Startup seeding of the permission catalog and built-in roles.
//!
//! Both functions are idempotent and safe to run on every start. Rows that
//! already exist are left alone, including role descriptions and permission
//! sets an administrator may have changed.

use tracing::{info, warn};

use super::store::{RbacResult, RbacStore};
use crate::auth::{BuiltinRole, Permission};

/// What a seeding run created.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub permissions_created: usize,
    pub roles_created: usize,
}

pub fn seed_defaults(store: &RbacStore) -> RbacResult<SeedReport> {
    let mut report = SeedReport::default();

    for permission in Permission::ALL {
        let (_, created) = store.ensure_permission(permission)?;
        if created {
            report.permissions_created += 1;
        }
    }

    for builtin in BuiltinRole::ALL {
        if store.find_role_by_name(builtin.name())?.is_some() {
            continue;
        }

        let mut ids = Vec::new();
        for permission in builtin.default_permissions() {
            if let Some(record) = store.find_permission_by_name(permission.as_str())? {
                ids.push(record.id);
            }
        }
        // Role and grants commit together; an existing role is never regranted.
        store.create_role_with_permissions(builtin.name(), builtin.description(), builtin.is_system(), &ids)?;
        report.roles_created += 1;
    }

    info!(
        permissions_created = report.permissions_created,
        roles_created = report.roles_created,
        "RBAC defaults seeded"
    );
    Ok(report)
}

/// Give the `user` role to every account that has no role at all.
/// Returns how many users were updated.
pub fn assign_default_role_to_unassigned(store: &RbacStore) -> RbacResult<usize> {
    let Some(default_role) = store.find_role_by_name(BuiltinRole::default().name())? else {
        warn!("Default role missing, skipping role assignment");
        return Ok(0);
    };

    let users = store.list_users_without_roles()?;
    for user in &users {
        store.assign_role(user.id, default_role.id)?;
    }

    if !users.is_empty() {
        info!(count = users.len(), role = %default_role.name, "Assigned default role to users");
    }
    Ok(users.len())
}
