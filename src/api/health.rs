// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::state::AppState;

/// Readiness response with individual component status.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// "ready" or "not ready"
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    /// RBAC database
    pub database: String,
    /// Session store
    pub redis: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

fn check_database(state: &AppState) -> Result<(), String> {
    state.rbac.list_roles().map(|_| ()).map_err(|e| e.to_string())
}

async fn check_session_store(state: &AppState) -> Result<(), String> {
    state.sessions.store().ping().await.map_err(|e| e.to_string())
}

/// Basic health check. Does not touch dependencies.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// Liveness probe handler.
///
/// Always returns 200 if the process is running.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness probe handler.
///
/// Returns 200 only if the RBAC database and the session store respond.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Service is not ready", body = ReadyResponse)
    )
)]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let database = check_database(&state);
    let redis = check_session_store(&state).await;
    let ready = database.is_ok() && redis.is_ok();

    let describe = |component: &str, result: Result<(), String>| match result {
        Ok(()) => "ok".to_string(),
        Err(e) => {
            warn!(component, error = %e, "Readiness check failed");
            format!("error: {e}")
        }
    };

    let response = ReadyResponse {
        status: if ready { "ready" } else { "not ready" }.to_string(),
        checks: HealthChecks {
            database: describe("database", database),
            redis: describe("redis", redis),
        },
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}
