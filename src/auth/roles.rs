// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

//! Built-in roles.
//!
//! Role names are free-form in the RBAC store; these are the ones the
//! service seeds and relies on.
//!
//! ## Built-in Roles
//!
//! - `admin` - every permission (system role)
//! - `user` - default for new accounts (system role)
//! - `editor` - news management, editable by admins

use super::Permission;

/// Roles seeded at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinRole {
    /// Full administrative access
    Admin,
    /// Regular signed-in user
    User,
    /// News editor
    Editor,
}

impl BuiltinRole {
    pub const ALL: [BuiltinRole; 3] = [BuiltinRole::Admin, BuiltinRole::User, BuiltinRole::Editor];

    pub fn name(&self) -> &'static str {
        match self {
            BuiltinRole::Admin => "admin",
            BuiltinRole::User => "user",
            BuiltinRole::Editor => "editor",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            BuiltinRole::Admin => "Administrator with full access",
            BuiltinRole::User => "Regular user with basic access",
            BuiltinRole::Editor => "Editor with news management access",
        }
    }

    /// System roles cannot be renamed or deleted.
    pub fn is_system(&self) -> bool {
        !matches!(self, BuiltinRole::Editor)
    }

    /// Permissions granted when the role is first seeded.
    pub fn default_permissions(&self) -> Vec<Permission> {
        match self {
            BuiltinRole::Admin => Permission::ALL.to_vec(),
            BuiltinRole::User => vec![Permission::PingRead, Permission::NewsRead],
            BuiltinRole::Editor => vec![
                Permission::PingRead,
                Permission::NewsRead,
                Permission::NewsCreate,
                Permission::NewsUpdate,
            ],
        }
    }

    /// Parse role from string (case-insensitive).
    pub fn from_name(s: &str) -> Option<BuiltinRole> {
        match s.to_lowercase().as_str() {
            "admin" => Some(BuiltinRole::Admin),
            "user" => Some(BuiltinRole::User),
            "editor" => Some(BuiltinRole::Editor),
            _ => None,
        }
    }
}

impl Default for BuiltinRole {
    /// New accounts get the least-privileged role.
    fn default() -> Self {
        BuiltinRole::User
    }
}

impl std::fmt::Display for BuiltinRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_has_every_permission() {
        assert_eq!(
            BuiltinRole::Admin.default_permissions().len(),
            Permission::ALL.len()
        );
    }

    #[test]
    fn user_gets_minimal_read_set() {
        assert_eq!(
            BuiltinRole::User.default_permissions(),
            vec![Permission::PingRead, Permission::NewsRead]
        );
    }

    #[test]
    fn only_editor_is_mutable() {
        assert!(BuiltinRole::Admin.is_system());
        assert!(BuiltinRole::User.is_system());
        assert!(!BuiltinRole::Editor.is_system());
    }

    #[test]
    fn from_name_parses_correctly() {
        assert_eq!(BuiltinRole::from_name("admin"), Some(BuiltinRole::Admin));
        assert_eq!(BuiltinRole::from_name("ADMIN"), Some(BuiltinRole::Admin));
        assert_eq!(BuiltinRole::from_name("Editor"), Some(BuiltinRole::Editor));
        assert_eq!(BuiltinRole::from_name("auditor"), None);
    }

    #[test]
    fn default_role_is_user() {
        assert_eq!(BuiltinRole::default(), BuiltinRole::User);
        assert_eq!(BuiltinRole::default().to_string(), "user");
    }
}
