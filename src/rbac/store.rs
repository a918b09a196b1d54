// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

//! Embedded RBAC database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `users`: id → JSON User, with `users_by_external_id` / `users_by_email`
//! - `roles`: id → JSON Role, with `roles_by_name`
//! - `permissions`: id → JSON PermissionRecord, with `permissions_by_name`
//! - `role_permissions`: (role_id, permission_id) → ()
//! - `user_roles`: (user_id, role_id) → ()
//! - `sequences`: table name → last issued id
//!
//! Assignment tables use composite keys so all rows of one owner are a
//! single range scan.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;

use super::models::{NewUser, PermissionRecord, Role, RoleUpdate, User};
use crate::auth::Permission;

// =============================================================================
// Table Definitions
// =============================================================================

pub(super) const USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("users");
const USERS_BY_EXTERNAL_ID: TableDefinition<&str, u64> = TableDefinition::new("users_by_external_id");
const USERS_BY_EMAIL: TableDefinition<&str, u64> = TableDefinition::new("users_by_email");

pub(super) const ROLES: TableDefinition<u64, &[u8]> = TableDefinition::new("roles");
const ROLES_BY_NAME: TableDefinition<&str, u64> = TableDefinition::new("roles_by_name");

pub(super) const PERMISSIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("permissions");
const PERMISSIONS_BY_NAME: TableDefinition<&str, u64> = TableDefinition::new("permissions_by_name");

pub(super) const ROLE_PERMISSIONS: TableDefinition<(u64, u64), ()> = TableDefinition::new("role_permissions");
pub(super) const USER_ROLES: TableDefinition<(u64, u64), ()> = TableDefinition::new("user_roles");

const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RbacError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    Conflict(String),

    #[error("system role cannot be modified: {0}")]
    SystemRole(String),

    #[error("invalid user id: {0}")]
    InvalidUserId(String),

    #[error("permission catalog mismatch, missing: {}", .0.join(", "))]
    CatalogMismatch(Vec<String>),

    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RbacResult<T> = Result<T, RbacError>;

// =============================================================================
// Row Helpers
// =============================================================================

pub(super) fn load<T: DeserializeOwned>(
    table: &impl ReadableTable<u64, &'static [u8]>,
    id: u64,
) -> RbacResult<Option<T>> {
    match table.get(id)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

fn load_all<T: DeserializeOwned>(table: &impl ReadableTable<u64, &'static [u8]>) -> RbacResult<Vec<T>> {
    let mut rows = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        rows.push(serde_json::from_slice(value.value())?);
    }
    Ok(rows)
}

/// Second halves of every `(owner, _)` key.
pub(super) fn children_of(table: &impl ReadableTable<(u64, u64), ()>, owner: u64) -> RbacResult<Vec<u64>> {
    let mut ids = Vec::new();
    for entry in table.range((owner, 0)..=(owner, u64::MAX))? {
        let (key, _) = entry?;
        ids.push(key.value().1);
    }
    Ok(ids)
}

fn lookup(table: &impl ReadableTable<&'static str, u64>, key: &str) -> RbacResult<Option<u64>> {
    Ok(table.get(key)?.map(|v| v.value()))
}

fn next_id(txn: &WriteTransaction, sequence: &str) -> RbacResult<u64> {
    let mut table = txn.open_table(SEQUENCES)?;
    let next = table.get(sequence)?.map(|v| v.value()).unwrap_or(0) + 1;
    table.insert(sequence, next)?;
    Ok(next)
}

fn insert_role(txn: &WriteTransaction, name: &str, description: &str, is_system: bool) -> RbacResult<Role> {
    let mut by_name = txn.open_table(ROLES_BY_NAME)?;
    if lookup(&by_name, name)?.is_some() {
        return Err(RbacError::Conflict(format!("role '{name}'")));
    }

    let id = next_id(txn, "roles")?;
    let now = Utc::now();
    let role = Role {
        id,
        name: name.to_string(),
        description: description.to_string(),
        is_system,
        created_at: now,
        updated_at: now,
    };
    let json = serde_json::to_vec(&role)?;
    txn.open_table(ROLES)?.insert(id, json.as_slice())?;
    by_name.insert(name, id)?;
    Ok(role)
}

/// Unknown role or permission ids fail before anything is written.
fn replace_grants(txn: &WriteTransaction, role_id: u64, permission_ids: &[u64]) -> RbacResult<()> {
    if load::<Role>(&txn.open_table(ROLES)?, role_id)?.is_none() {
        return Err(RbacError::NotFound(format!("role {role_id}")));
    }
    let permissions = txn.open_table(PERMISSIONS)?;
    for pid in permission_ids {
        if permissions.get(*pid)?.is_none() {
            return Err(RbacError::NotFound(format!("permission {pid}")));
        }
    }

    let mut grants = txn.open_table(ROLE_PERMISSIONS)?;
    for existing in children_of(&grants, role_id)? {
        grants.remove((role_id, existing))?;
    }
    for pid in permission_ids {
        grants.insert((role_id, *pid), ())?;
    }
    Ok(())
}

// =============================================================================
// RbacStore
// =============================================================================

/// Users, roles, permissions and their assignments.
#[derive(Clone)]
pub struct RbacStore {
    db: Arc<Database>,
}

impl RbacStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> RbacResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USERS_BY_EXTERNAL_ID)?;
            let _ = write_txn.open_table(USERS_BY_EMAIL)?;
            let _ = write_txn.open_table(ROLES)?;
            let _ = write_txn.open_table(ROLES_BY_NAME)?;
            let _ = write_txn.open_table(PERMISSIONS)?;
            let _ = write_txn.open_table(PERMISSIONS_BY_NAME)?;
            let _ = write_txn.open_table(ROLE_PERMISSIONS)?;
            let _ = write_txn.open_table(USER_ROLES)?;
            let _ = write_txn.open_table(SEQUENCES)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    pub(super) fn db(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // Permissions
    // =========================================================================

    /// Insert a catalog permission unless a row with its name exists.
    /// Returns the row and whether it was created.
    pub fn ensure_permission(&self, permission: Permission) -> RbacResult<(PermissionRecord, bool)> {
        if let Some(existing) = self.find_permission_by_name(permission.as_str())? {
            return Ok((existing, false));
        }

        let write_txn = self.db.begin_write()?;
        let record = {
            let id = next_id(&write_txn, "permissions")?;
            let record = PermissionRecord {
                id,
                name: permission.as_str().to_string(),
                description: permission.description().to_string(),
                resource: permission.resource().to_string(),
                action: permission.action().to_string(),
                created_at: Utc::now(),
            };
            let json = serde_json::to_vec(&record)?;
            write_txn.open_table(PERMISSIONS)?.insert(id, json.as_slice())?;
            write_txn
                .open_table(PERMISSIONS_BY_NAME)?
                .insert(record.name.as_str(), id)?;
            record
        };
        write_txn.commit()?;
        Ok((record, true))
    }

    pub fn find_permission_by_name(&self, name: &str) -> RbacResult<Option<PermissionRecord>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(PERMISSIONS_BY_NAME)?;
        let Some(id) = lookup(&index, name)? else {
            return Ok(None);
        };
        load(&read_txn.open_table(PERMISSIONS)?, id)
    }

    /// All permissions in id (catalog) order.
    pub fn list_permissions(&self) -> RbacResult<Vec<PermissionRecord>> {
        let read_txn = self.db.begin_read()?;
        load_all(&read_txn.open_table(PERMISSIONS)?)
    }

    /// Every compile-time permission must exist in the store.
    pub fn verify_catalog(&self) -> RbacResult<()> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(PERMISSIONS_BY_NAME)?;
        let mut missing = Vec::new();
        for permission in Permission::ALL {
            if lookup(&index, permission.as_str())?.is_none() {
                missing.push(permission.as_str().to_string());
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(RbacError::CatalogMismatch(missing))
        }
    }

    // =========================================================================
    // Roles
    // =========================================================================

    pub fn create_role(&self, name: &str, description: &str, is_system: bool) -> RbacResult<Role> {
        let write_txn = self.db.begin_write()?;
        let role = insert_role(&write_txn, name, description, is_system)?;
        write_txn.commit()?;
        Ok(role)
    }

    /// Create a role together with its permission set. Either both are
    /// written or neither is.
    pub fn create_role_with_permissions(
        &self,
        name: &str,
        description: &str,
        is_system: bool,
        permission_ids: &[u64],
    ) -> RbacResult<Role> {
        let write_txn = self.db.begin_write()?;
        let role = insert_role(&write_txn, name, description, is_system)?;
        replace_grants(&write_txn, role.id, permission_ids)?;
        write_txn.commit()?;
        Ok(role)
    }

    pub fn get_role(&self, id: u64) -> RbacResult<Option<Role>> {
        let read_txn = self.db.begin_read()?;
        load(&read_txn.open_table(ROLES)?, id)
    }

    pub fn find_role_by_name(&self, name: &str) -> RbacResult<Option<Role>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(ROLES_BY_NAME)?;
        let Some(id) = lookup(&index, name)? else {
            return Ok(None);
        };
        load(&read_txn.open_table(ROLES)?, id)
    }

    pub fn list_roles(&self) -> RbacResult<Vec<Role>> {
        let read_txn = self.db.begin_read()?;
        load_all(&read_txn.open_table(ROLES)?)
    }

    /// Rename and/or re-describe a role. System roles keep their name.
    pub fn update_role(&self, id: u64, update: RoleUpdate) -> RbacResult<Role> {
        let write_txn = self.db.begin_write()?;
        let role = {
            let mut roles = write_txn.open_table(ROLES)?;
            let mut role: Role =
                load(&roles, id)?.ok_or_else(|| RbacError::NotFound(format!("role {id}")))?;

            if let Some(new_name) = update.name.filter(|n| *n != role.name) {
                if role.is_system {
                    return Err(RbacError::SystemRole(role.name));
                }
                let mut by_name = write_txn.open_table(ROLES_BY_NAME)?;
                if lookup(&by_name, &new_name)?.is_some() {
                    return Err(RbacError::Conflict(format!("role '{new_name}'")));
                }
                by_name.remove(role.name.as_str())?;
                by_name.insert(new_name.as_str(), id)?;
                role.name = new_name;
            }
            if let Some(description) = update.description {
                role.description = description;
            }
            role.updated_at = Utc::now();

            let json = serde_json::to_vec(&role)?;
            roles.insert(id, json.as_slice())?;
            role
        };
        write_txn.commit()?;
        Ok(role)
    }

    /// Delete a non-system role along with its assignments.
    pub fn delete_role(&self, id: u64) -> RbacResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut roles = write_txn.open_table(ROLES)?;
            let role: Role = load(&roles, id)?.ok_or_else(|| RbacError::NotFound(format!("role {id}")))?;
            if role.is_system {
                return Err(RbacError::SystemRole(role.name));
            }
            roles.remove(id)?;
            write_txn.open_table(ROLES_BY_NAME)?.remove(role.name.as_str())?;

            let mut grants = write_txn.open_table(ROLE_PERMISSIONS)?;
            for permission_id in children_of(&grants, id)? {
                grants.remove((id, permission_id))?;
            }

            let mut user_roles = write_txn.open_table(USER_ROLES)?;
            let mut holders = Vec::new();
            for entry in user_roles.iter()? {
                let (key, _) = entry?;
                let (user_id, role_id) = key.value();
                if role_id == id {
                    holders.push(user_id);
                }
            }
            for user_id in holders {
                user_roles.remove((user_id, id))?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Replace a role's permission set.
    pub fn set_role_permissions(&self, role_id: u64, permission_ids: &[u64]) -> RbacResult<()> {
        let write_txn = self.db.begin_write()?;
        replace_grants(&write_txn, role_id, permission_ids)?;
        write_txn.commit()?;
        Ok(())
    }

    /// Permissions granted by one role, in id order.
    pub fn role_permissions(&self, role_id: u64) -> RbacResult<Vec<PermissionRecord>> {
        let read_txn = self.db.begin_read()?;
        let grants = read_txn.open_table(ROLE_PERMISSIONS)?;
        let permissions = read_txn.open_table(PERMISSIONS)?;
        let mut records = Vec::new();
        for pid in children_of(&grants, role_id)? {
            if let Some(record) = load(&permissions, pid)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    // =========================================================================
    // User ↔ Role
    // =========================================================================

    /// Give a user a role. Assigning twice is a no-op.
    pub fn assign_role(&self, user_id: u64, role_id: u64) -> RbacResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            if write_txn.open_table(USERS)?.get(user_id)?.is_none() {
                return Err(RbacError::NotFound(format!("user {user_id}")));
            }
            if write_txn.open_table(ROLES)?.get(role_id)?.is_none() {
                return Err(RbacError::NotFound(format!("role {role_id}")));
            }
            write_txn.open_table(USER_ROLES)?.insert((user_id, role_id), ())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Take a role away. Returns whether the user had it.
    pub fn remove_role(&self, user_id: u64, role_id: u64) -> RbacResult<bool> {
        let write_txn = self.db.begin_write()?;
        let removed = write_txn
            .open_table(USER_ROLES)?
            .remove((user_id, role_id))?
            .is_some();
        write_txn.commit()?;
        Ok(removed)
    }

    pub fn roles_for_user(&self, user_id: u64) -> RbacResult<Vec<Role>> {
        let read_txn = self.db.begin_read()?;
        let user_roles = read_txn.open_table(USER_ROLES)?;
        let roles = read_txn.open_table(ROLES)?;
        let mut result = Vec::new();
        for role_id in children_of(&user_roles, user_id)? {
            if let Some(role) = load(&roles, role_id)? {
                result.push(role);
            }
        }
        Ok(result)
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub fn create_user(&self, new_user: NewUser) -> RbacResult<User> {
        let write_txn = self.db.begin_write()?;
        let user = {
            let mut by_email = write_txn.open_table(USERS_BY_EMAIL)?;
            if lookup(&by_email, &new_user.email)?.is_some() {
                return Err(RbacError::Conflict(format!("user with email {}", new_user.email)));
            }
            let mut by_external = write_txn.open_table(USERS_BY_EXTERNAL_ID)?;
            if let Some(external_id) = &new_user.external_id {
                if lookup(&by_external, external_id)?.is_some() {
                    return Err(RbacError::Conflict(format!("user with external id {external_id}")));
                }
            }

            let id = next_id(&write_txn, "users")?;
            let now = Utc::now();
            let user = User {
                id,
                external_id: new_user.external_id,
                email: new_user.email,
                name: new_user.name,
                avatar_url: new_user.avatar_url,
                role: new_user.role,
                last_login_at: None,
                created_at: now,
                updated_at: now,
            };
            let json = serde_json::to_vec(&user)?;
            write_txn.open_table(USERS)?.insert(id, json.as_slice())?;
            by_email.insert(user.email.as_str(), id)?;
            if let Some(external_id) = &user.external_id {
                by_external.insert(external_id.as_str(), id)?;
            }
            user
        };
        write_txn.commit()?;
        Ok(user)
    }

    pub fn get_user(&self, id: u64) -> RbacResult<Option<User>> {
        let read_txn = self.db.begin_read()?;
        load(&read_txn.open_table(USERS)?, id)
    }

    pub fn find_user_by_external_id(&self, external_id: &str) -> RbacResult<Option<User>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(USERS_BY_EXTERNAL_ID)?;
        let Some(id) = lookup(&index, external_id)? else {
            return Ok(None);
        };
        load(&read_txn.open_table(USERS)?, id)
    }

    pub fn find_user_by_email(&self, email: &str) -> RbacResult<Option<User>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(USERS_BY_EMAIL)?;
        let Some(id) = lookup(&index, email)? else {
            return Ok(None);
        };
        load(&read_txn.open_table(USERS)?, id)
    }

    /// Persist changes to an existing user, keeping the lookup indexes in step.
    pub fn save_user(&self, user: &User) -> RbacResult<User> {
        let write_txn = self.db.begin_write()?;
        let saved = {
            let mut users = write_txn.open_table(USERS)?;
            let previous: User = load(&users, user.id)?
                .ok_or_else(|| RbacError::NotFound(format!("user {}", user.id)))?;

            if previous.email != user.email {
                let mut by_email = write_txn.open_table(USERS_BY_EMAIL)?;
                if lookup(&by_email, &user.email)?.is_some() {
                    return Err(RbacError::Conflict(format!("user with email {}", user.email)));
                }
                by_email.remove(previous.email.as_str())?;
                by_email.insert(user.email.as_str(), user.id)?;
            }

            if previous.external_id != user.external_id {
                let mut by_external = write_txn.open_table(USERS_BY_EXTERNAL_ID)?;
                if let Some(external_id) = &user.external_id {
                    if lookup(&by_external, external_id)?.is_some() {
                        return Err(RbacError::Conflict(format!("user with external id {external_id}")));
                    }
                }
                if let Some(old) = &previous.external_id {
                    by_external.remove(old.as_str())?;
                }
                if let Some(external_id) = &user.external_id {
                    by_external.insert(external_id.as_str(), user.id)?;
                }
            }

            let saved = User {
                created_at: previous.created_at,
                updated_at: Utc::now(),
                ..user.clone()
            };
            let json = serde_json::to_vec(&saved)?;
            users.insert(saved.id, json.as_slice())?;
            saved
        };
        write_txn.commit()?;
        Ok(saved)
    }

    /// Users that hold no role assignment at all.
    pub fn list_users_without_roles(&self) -> RbacResult<Vec<User>> {
        let read_txn = self.db.begin_read()?;
        let user_roles = read_txn.open_table(USER_ROLES)?;
        let users: Vec<User> = load_all(&read_txn.open_table(USERS)?)?;
        let mut unassigned = Vec::new();
        for user in users {
            if children_of(&user_roles, user.id)?.is_empty() {
                unassigned.push(user);
            }
        }
        Ok(unassigned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open() -> (RbacStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RbacStore::open(&dir.path().join("rbac.redb")).unwrap();
        (store, dir)
    }

    fn new_user(email: &str, external_id: Option<&str>) -> NewUser {
        NewUser {
            external_id: external_id.map(str::to_string),
            email: email.to_string(),
            name: "Ada".to_string(),
            avatar_url: None,
            role: "user".to_string(),
        }
    }

    #[test]
    fn open_is_reentrant_across_restarts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/rbac.redb");
        {
            let store = RbacStore::open(&path).unwrap();
            store.create_role("auditor", "", false).unwrap();
        }
        let store = RbacStore::open(&path).unwrap();
        assert!(store.find_role_by_name("auditor").unwrap().is_some());
    }

    #[test]
    fn duplicate_role_name_conflicts() {
        let (store, _dir) = open();
        store.create_role("auditor", "reads things", false).unwrap();
        assert!(matches!(
            store.create_role("auditor", "again", false),
            Err(RbacError::Conflict(_))
        ));
    }

    #[test]
    fn system_role_cannot_be_renamed_or_deleted() {
        let (store, _dir) = open();
        let admin = store.create_role("admin", "root", true).unwrap();

        let rename = RoleUpdate {
            name: Some("root".to_string()),
            ..Default::default()
        };
        assert!(matches!(store.update_role(admin.id, rename), Err(RbacError::SystemRole(_))));
        assert!(matches!(store.delete_role(admin.id), Err(RbacError::SystemRole(_))));

        let describe = RoleUpdate {
            description: Some("Administrators".to_string()),
            ..Default::default()
        };
        assert_eq!(store.update_role(admin.id, describe).unwrap().description, "Administrators");
    }

    #[test]
    fn rename_moves_name_index() {
        let (store, _dir) = open();
        let role = store.create_role("editor", "", false).unwrap();
        store.create_role("writer", "", false).unwrap();

        let clash = RoleUpdate {
            name: Some("writer".to_string()),
            ..Default::default()
        };
        assert!(matches!(store.update_role(role.id, clash), Err(RbacError::Conflict(_))));

        let rename = RoleUpdate {
            name: Some("publisher".to_string()),
            ..Default::default()
        };
        store.update_role(role.id, rename).unwrap();
        assert!(store.find_role_by_name("editor").unwrap().is_none());
        assert_eq!(store.find_role_by_name("publisher").unwrap().unwrap().id, role.id);
    }

    #[test]
    fn delete_role_removes_assignments() {
        let (store, _dir) = open();
        let role = store.create_role("editor", "", false).unwrap();
        let (perm, _) = store.ensure_permission(Permission::NewsCreate).unwrap();
        store.set_role_permissions(role.id, &[perm.id]).unwrap();
        let user = store.create_user(new_user("a@x.com", None)).unwrap();
        store.assign_role(user.id, role.id).unwrap();

        store.delete_role(role.id).unwrap();
        assert!(store.roles_for_user(user.id).unwrap().is_empty());
        assert!(store.role_permissions(role.id).unwrap().is_empty());
        assert!(matches!(store.delete_role(role.id), Err(RbacError::NotFound(_))));
    }

    #[test]
    fn set_role_permissions_replaces_and_validates() {
        let (store, _dir) = open();
        let role = store.create_role("editor", "", false).unwrap();
        let (read, _) = store.ensure_permission(Permission::NewsRead).unwrap();
        let (create, _) = store.ensure_permission(Permission::NewsCreate).unwrap();

        store.set_role_permissions(role.id, &[read.id, create.id]).unwrap();
        store.set_role_permissions(role.id, &[create.id]).unwrap();
        let names: Vec<_> = store
            .role_permissions(role.id)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["news:create"]);

        assert!(matches!(
            store.set_role_permissions(role.id, &[999]),
            Err(RbacError::NotFound(_))
        ));
        assert!(matches!(store.set_role_permissions(999, &[]), Err(RbacError::NotFound(_))));
    }

    #[test]
    fn role_with_permissions_is_written_atomically() {
        let (store, _dir) = open();
        let (read, _) = store.ensure_permission(Permission::NewsRead).unwrap();

        assert!(matches!(
            store.create_role_with_permissions("editor", "", false, &[read.id, 999]),
            Err(RbacError::NotFound(_))
        ));
        assert!(store.find_role_by_name("editor").unwrap().is_none());
        assert!(store.list_roles().unwrap().is_empty());

        let role = store
            .create_role_with_permissions("editor", "Newsroom", false, &[read.id])
            .unwrap();
        let names: Vec<_> = store
            .role_permissions(role.id)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["news:read"]);
        assert!(matches!(
            store.create_role_with_permissions("editor", "", false, &[]),
            Err(RbacError::Conflict(_))
        ));
    }

    #[test]
    fn assign_role_is_idempotent() {
        let (store, _dir) = open();
        let role = store.create_role("user", "", true).unwrap();
        let user = store.create_user(new_user("a@x.com", None)).unwrap();

        store.assign_role(user.id, role.id).unwrap();
        store.assign_role(user.id, role.id).unwrap();
        assert_eq!(store.roles_for_user(user.id).unwrap().len(), 1);

        assert!(store.remove_role(user.id, role.id).unwrap());
        assert!(!store.remove_role(user.id, role.id).unwrap());
        assert!(matches!(store.assign_role(999, role.id), Err(RbacError::NotFound(_))));
    }

    #[test]
    fn users_are_found_by_email_and_external_id() {
        let (store, _dir) = open();
        let user = store.create_user(new_user("a@x.com", Some("g-1"))).unwrap();

        assert_eq!(store.find_user_by_email("a@x.com").unwrap().unwrap().id, user.id);
        assert_eq!(store.find_user_by_external_id("g-1").unwrap().unwrap().id, user.id);
        assert!(store.find_user_by_email("b@x.com").unwrap().is_none());
        assert!(matches!(
            store.create_user(new_user("a@x.com", None)),
            Err(RbacError::Conflict(_))
        ));
    }

    #[test]
    fn save_user_updates_indexes() {
        let (store, _dir) = open();
        let mut user = store.create_user(new_user("a@x.com", None)).unwrap();
        user.external_id = Some("g-9".to_string());
        user.email = "ada@x.com".to_string();
        user.last_login_at = Some(Utc::now());

        let saved = store.save_user(&user).unwrap();
        assert_eq!(saved.created_at, user.created_at);
        assert!(store.find_user_by_email("a@x.com").unwrap().is_none());
        assert_eq!(store.find_user_by_external_id("g-9").unwrap().unwrap().email, "ada@x.com");
    }

    #[test]
    fn users_without_roles_are_listed() {
        let (store, _dir) = open();
        let role = store.create_role("user", "", true).unwrap();
        let a = store.create_user(new_user("a@x.com", None)).unwrap();
        let b = store.create_user(new_user("b@x.com", None)).unwrap();
        store.assign_role(a.id, role.id).unwrap();

        let unassigned = store.list_users_without_roles().unwrap();
        assert_eq!(unassigned.len(), 1);
        assert_eq!(unassigned[0].id, b.id);
    }

    #[test]
    fn verify_catalog_reports_missing_permissions() {
        let (store, _dir) = open();
        store.ensure_permission(Permission::PingRead).unwrap();
        match store.verify_catalog() {
            Err(RbacError::CatalogMismatch(missing)) => {
                assert_eq!(missing.len(), Permission::ALL.len() - 1);
                assert!(!missing.contains(&"ping:read".to_string()));
            }
            other => panic!("expected CatalogMismatch, got {other:?}"),
        }
    }
}
