// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

//! Effective permission resolution.

use std::collections::BTreeSet;

use async_trait::async_trait;
use redb::ReadableDatabase;

use super::models::PermissionRecord;
use super::store::{children_of, load, RbacError, RbacResult, RbacStore, PERMISSIONS, ROLE_PERMISSIONS, USER_ROLES};

/// Where the session manager gets a user's permission snapshot.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    async fn resolve_permissions(&self, user_id: &str) -> Result<Vec<String>, RbacError>;
}

impl RbacStore {
    /// Union of the permissions of every role the user holds, ordered by
    /// permission id. A user without roles resolves to an empty list.
    pub fn resolve_permissions(&self, user_id: u64) -> RbacResult<Vec<String>> {
        let read_txn = self.db().begin_read()?;
        let user_roles = read_txn.open_table(USER_ROLES)?;
        let grants = read_txn.open_table(ROLE_PERMISSIONS)?;
        let permissions = read_txn.open_table(PERMISSIONS)?;

        let mut ids = BTreeSet::new();
        for role_id in children_of(&user_roles, user_id)? {
            ids.extend(children_of(&grants, role_id)?);
        }

        let mut names = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = load::<PermissionRecord>(&permissions, id)? {
                names.push(record.name);
            }
        }
        Ok(names)
    }
}

#[async_trait]
impl PermissionSource for RbacStore {
    async fn resolve_permissions(&self, user_id: &str) -> Result<Vec<String>, RbacError> {
        let id: u64 = user_id
            .parse()
            .map_err(|_| RbacError::InvalidUserId(user_id.to_string()))?;
        RbacStore::resolve_permissions(self, id)
    }
}
