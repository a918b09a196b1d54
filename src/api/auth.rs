// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

//! Authentication endpoints: Google sign-in, token refresh, logout and
//! session listing.
//!
//! The refresh token is returned in the JSON body and also set as an
//! `HttpOnly` cookie scoped to `/api/v1/auth`. Endpoints that consume it
//! accept, in order: the cookie, a JSON body field, the `X-Refresh-Token`
//! header.

use std::net::SocketAddr;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{header::USER_AGENT, request::Parts, HeaderMap},
    Json,
};
use axum_extra::extract::CookieJar;
use cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::auth::Auth;
use crate::error::ApiError;
use crate::identity::{self, google::ClientConfig, ProviderCredential};
use crate::rbac::User;
use crate::session::{ClientInfo, LoginOutcome, LoginSubject, SessionSummary, TokenPair};
use crate::state::AppState;

pub const REFRESH_COOKIE: &str = "refresh_token";
pub const REFRESH_COOKIE_PATH: &str = "/api/v1/auth";
pub const REFRESH_HEADER: &str = "x-refresh-token";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Either field may be set; `access_token` wins when both are.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct GoogleLoginRequest {
    /// Google access token (implicit flow)
    #[serde(default)]
    pub access_token: Option<String>,
    /// Authorization code (code flow)
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginUser {
    pub id: u64,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
    pub role: String,
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: LoginUser,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PublicKeyResponse {
    /// SPKI PEM
    pub public_key: String,
    pub algorithm: &'static str,
}

// ============================================================================
// Helpers
// ============================================================================

/// User agent and client IP, preferring proxy headers over the socket peer.
impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let ip = forwarded_ip(&parts.headers)
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_default();

        Ok(ClientInfo { user_agent, ip })
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let first_forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = first_forwarded {
        return Some(ip.to_string());
    }

    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

/// First non-empty refresh token from cookie, JSON body, then header.
fn presented_refresh_token(jar: &CookieJar, headers: &HeaderMap, body: &[u8]) -> Option<String> {
    if let Some(cookie) = jar.get(REFRESH_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    if !body.is_empty() {
        if let Ok(RefreshRequest {
            refresh_token: Some(token),
        }) = serde_json::from_slice::<RefreshRequest>(body)
        {
            if !token.is_empty() {
                return Some(token);
            }
        }
    }

    headers
        .get(REFRESH_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn refresh_cookie(state: &AppState, token: String) -> Cookie<'static> {
    let secs = i64::try_from(state.sessions.refresh_ttl().as_secs()).unwrap_or(i64::MAX);
    let max_age = time::Duration::seconds(secs);
    Cookie::build((REFRESH_COOKIE, token))
        .http_only(true)
        .secure(state.cookie.secure)
        .same_site(SameSite::Strict)
        .path(REFRESH_COOKIE_PATH)
        .max_age(max_age)
        .build()
}

/// Expire the refresh cookie whether or not the request carried one.
fn clear_refresh_cookie(state: &AppState, jar: CookieJar) -> CookieJar {
    jar.add(
        Cookie::build((REFRESH_COOKIE, ""))
            .http_only(true)
            .secure(state.cookie.secure)
            .same_site(SameSite::Strict)
            .path(REFRESH_COOKIE_PATH)
            .max_age(time::Duration::ZERO)
            .build(),
    )
}

fn login_user(user: User, permissions: Vec<String>) -> LoginUser {
    LoginUser {
        id: user.id,
        email: user.email,
        name: user.name,
        picture: user.avatar_url,
        role: user.role,
        permissions,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Sign in with Google and start a session.
#[utoipa::path(
    post,
    path = "/api/v1/auth/google",
    tag = "Auth",
    request_body = GoogleLoginRequest,
    responses(
        (status = 200, description = "Signed in", body = LoginResponse),
        (status = 400, description = "Neither access_token nor code given"),
        (status = 401, description = "Google rejected the credential"),
        (status = 503, description = "Session store unavailable")
    )
)]
pub async fn google_login(
    State(state): State<AppState>,
    client: ClientInfo,
    jar: CookieJar,
    Json(request): Json<GoogleLoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let credential = match (request.access_token, request.code) {
        (Some(token), _) if !token.is_empty() => ProviderCredential::AccessToken(token),
        (_, Some(code)) if !code.is_empty() => ProviderCredential::Code(code),
        _ => return Err(ApiError::bad_request("access_token or code required")),
    };

    let external = state.identity.verify(&credential).await?;
    let user = identity::sign_in(&state.rbac, &external)?;

    let LoginOutcome { tokens, permissions } = state
        .sessions
        .login(
            &LoginSubject {
                user_id: user.id.to_string(),
                username: user.email.clone(),
                role: user.role.clone(),
            },
            &client,
        )
        .await?;

    let jar = jar.add(refresh_cookie(&state, tokens.refresh_token.clone()));
    Ok((
        jar,
        Json(LoginResponse {
            tokens,
            user: login_user(user, permissions),
        }),
    ))
}

/// Public settings for the Google sign-in button.
#[utoipa::path(
    get,
    path = "/api/v1/auth/google/config",
    tag = "Auth",
    responses((status = 200, description = "Google client settings", body = ClientConfig))
)]
pub async fn google_config(State(state): State<AppState>) -> Json<ClientConfig> {
    Json(state.identity.client_config())
}

/// Exchange a refresh token for a new pair. The presented token stops
/// working immediately.
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "Auth",
    request_body(content = RefreshRequest, description = "Optional when the cookie or header is used"),
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Missing, invalid or expired refresh token"),
        (status = 503, description = "Session store unavailable")
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    client: ClientInfo,
    jar: CookieJar,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(CookieJar, Json<TokenPair>), (CookieJar, ApiError)> {
    let Some(presented) = presented_refresh_token(&jar, &headers, &body) else {
        return Err((clear_refresh_cookie(&state, jar), ApiError::unauthorized("refresh token required")));
    };

    match state.sessions.refresh(&presented, &client).await {
        Ok(tokens) => {
            let jar = jar.add(refresh_cookie(&state, tokens.refresh_token.clone()));
            Ok((jar, Json(tokens)))
        }
        Err(e) => Err((clear_refresh_cookie(&state, jar), e.into())),
    }
}

/// End the session belonging to the presented refresh token. Always
/// succeeds.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "Auth",
    request_body(content = RefreshRequest, description = "Optional when the cookie or header is used"),
    responses((status = 200, description = "Logged out", body = MessageResponse))
)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    body: Bytes,
) -> (CookieJar, Json<MessageResponse>) {
    if let Some(token) = presented_refresh_token(&jar, &headers, &body) {
        let report = state.sessions.logout(&token).await;
        if report.is_degraded() {
            warn!(warnings = ?report.warnings, "Logout cleanup incomplete");
        }
    }

    (
        clear_refresh_cookie(&state, jar),
        Json(MessageResponse {
            message: "logged out successfully".to_string(),
        }),
    )
}

/// End every session of the caller.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout-all",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "All sessions ended", body = MessageResponse),
        (status = 401, description = "Missing or invalid access token"),
        (status = 503, description = "Session store unavailable")
    )
)]
pub async fn logout_all(
    State(state): State<AppState>,
    Auth(user): Auth,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>), ApiError> {
    let report = state.sessions.logout_all(&user.user_id).await?;
    info!(user_id = %user.user_id, removed = report.removed, "Logged out all sessions");

    Ok((
        clear_refresh_cookie(&state, jar),
        Json(MessageResponse {
            message: "all sessions logged out".to_string(),
        }),
    ))
}

/// List the caller's active sessions, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/auth/sessions",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Active sessions", body = SessionsResponse),
        (status = 401, description = "Missing or invalid access token"),
        (status = 503, description = "Session store unavailable")
    )
)]
pub async fn list_sessions(
    State(state): State<AppState>,
    Auth(user): Auth,
) -> Result<Json<SessionsResponse>, ApiError> {
    let sessions = state.sessions.list_sessions(&user.user_id).await?;
    Ok(Json(SessionsResponse { sessions }))
}

/// The token verification key, for other services.
#[utoipa::path(
    get,
    path = "/api/v1/auth/public-key",
    tag = "Auth",
    responses((status = 200, description = "RSA public key", body = PublicKeyResponse))
)]
pub async fn public_key(State(state): State<AppState>) -> Json<PublicKeyResponse> {
    Json(PublicKeyResponse {
        public_key: state.codec.keys().public_key_pem().to_string(),
        algorithm: "RS256",
    })
}
