// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

//! Admin-only read endpoints for the permission catalog and roles.
//!
//! The router applies two requirements to every route here: the `admin`
//! role and the `roles:read` permission.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    error::ApiError,
    rbac::{PermissionRecord, RbacStore, Role, RoleWithPermissions},
    state::AppState,
};

fn with_permissions(rbac: &RbacStore, role: Role) -> Result<RoleWithPermissions, ApiError> {
    let permissions = rbac
        .role_permissions(role.id)?
        .into_iter()
        .map(|p| p.name)
        .collect();
    Ok(RoleWithPermissions { role, permissions })
}

/// List the permission catalog, ordered by resource then action.
#[utoipa::path(
    get,
    path = "/api/v1/admin/permissions",
    tag = "Admin",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Permission catalog", body = Vec<PermissionRecord>),
        (status = 401, description = "Missing or invalid access token"),
        (status = 403, description = "Requires admin role and roles:read")
    )
)]
pub async fn list_permissions(State(state): State<AppState>) -> Result<Json<Vec<PermissionRecord>>, ApiError> {
    let mut permissions = state.rbac.list_permissions()?;
    permissions.sort_by(|a, b| (&a.resource, &a.action).cmp(&(&b.resource, &b.action)));
    Ok(Json(permissions))
}

/// List every role with its permission names, ordered by name.
#[utoipa::path(
    get,
    path = "/api/v1/admin/roles",
    tag = "Admin",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Roles", body = Vec<RoleWithPermissions>),
        (status = 401, description = "Missing or invalid access token"),
        (status = 403, description = "Requires admin role and roles:read")
    )
)]
pub async fn list_roles(State(state): State<AppState>) -> Result<Json<Vec<RoleWithPermissions>>, ApiError> {
    let mut roles = state.rbac.list_roles()?;
    roles.sort_by(|a, b| a.name.cmp(&b.name));

    let roles = roles
        .into_iter()
        .map(|role| with_permissions(&state.rbac, role))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(roles))
}

/// Get one role with its permission names.
#[utoipa::path(
    get,
    path = "/api/v1/admin/roles/{role_id}",
    tag = "Admin",
    security(("bearer" = [])),
    params(("role_id" = u64, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role", body = RoleWithPermissions),
        (status = 404, description = "No such role"),
        (status = 403, description = "Requires admin role and roles:read")
    )
)]
pub async fn get_role(
    State(state): State<AppState>,
    Path(role_id): Path<u64>,
) -> Result<Json<RoleWithPermissions>, ApiError> {
    let role = state
        .rbac
        .get_role(role_id)?
        .ok_or_else(|| ApiError::not_found(format!("role {role_id} not found")))?;
    Ok(Json(with_permissions(&state.rbac, role)?))
}
