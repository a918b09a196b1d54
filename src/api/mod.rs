// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::warn;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::{
    auth::{
        middleware::{authenticate, enforce},
        AuthenticatedUser, BuiltinRole, Permission, Requirement,
    },
    identity::google::ClientConfig,
    rbac::{PermissionRecord, Role, RoleWithPermissions},
    session::{SessionSummary, TokenPair},
    state::AppState,
};

pub mod admin;
pub mod auth;
pub mod health;
pub mod users;

pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    let public_routes = Router::new()
        .route("/auth/google", post(auth::google_login))
        .route("/auth/google/config", get(auth::google_config))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/logout-all", post(auth::logout_all))
        .route("/auth/sessions", get(auth::list_sessions))
        .route("/auth/public-key", get(auth::public_key))
        .route("/users/me", get(users::get_current_user));

    // Route layers run last-added first: authenticate, then role, then permission.
    let admin_routes = Router::new()
        .route("/admin/permissions", get(admin::list_permissions))
        .route("/admin/roles", get(admin::list_roles))
        .route("/admin/roles/{role_id}", get(admin::get_role))
        .route_layer(from_fn_with_state(
            Requirement::AllPermissions(vec![Permission::RolesRead]),
            enforce,
        ))
        .route_layer(from_fn_with_state(
            Requirement::AnyRole(vec![BuiltinRole::Admin.name().to_string()]),
            enforce,
        ))
        .route_layer(from_fn_with_state(state.codec.clone(), authenticate));

    let request_id = HeaderName::from_static("x-request-id");

    Router::new()
        .nest("/api/v1", public_routes.merge(admin_routes))
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/api-doc/openapi.json", get(openapi_json))
        .with_state(state)
        .layer(cors_layer(cors_origins))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id)),
        )
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Any origin without credentials when `origins` is empty; otherwise the
/// listed origins with credentials so the refresh cookie is sent.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::COOKIE,
            HeaderName::from_static(auth::REFRESH_HEADER),
        ])
        .allow_credentials(true)
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "ChattyCathy Auth API"),
    paths(
        auth::google_login,
        auth::google_config,
        auth::refresh,
        auth::logout,
        auth::logout_all,
        auth::list_sessions,
        auth::public_key,
        users::get_current_user,
        admin::list_permissions,
        admin::list_roles,
        admin::get_role,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            auth::GoogleLoginRequest,
            auth::LoginResponse,
            auth::LoginUser,
            auth::RefreshRequest,
            auth::MessageResponse,
            auth::SessionsResponse,
            auth::PublicKeyResponse,
            users::UserMeResponse,
            health::HealthResponse,
            health::ReadyResponse,
            health::HealthChecks,
            AuthenticatedUser,
            ClientConfig,
            PermissionRecord,
            Permission,
            Role,
            RoleWithPermissions,
            SessionSummary,
            TokenPair
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Sign-in, token refresh and sessions"),
        (name = "Users", description = "Current user"),
        (name = "Admin", description = "Permission catalog and roles"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
pub struct ApiDoc;
