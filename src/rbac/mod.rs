// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

//! Role-based access control.
//!
//! A user's effective permissions are the union of the permissions of every
//! role assigned to them. Roles are free-form rows; permissions come from the
//! closed [`crate::auth::Permission`] catalog.

pub mod models;
pub mod resolver;
pub mod seed;
pub mod store;

pub use models::{NewUser, PermissionRecord, Role, RoleUpdate, RoleWithPermissions, User};
pub use resolver::PermissionSource;
pub use seed::{assign_default_role_to_unassigned, seed_defaults, SeedReport};
pub use store::{RbacError, RbacResult, RbacStore};
