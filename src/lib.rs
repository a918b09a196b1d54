// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

//! ChattyCathy Auth - authentication, session and RBAC core
//!
//! Issues RS256 access tokens, keeps rotating refresh sessions in Redis and
//! gates routes on roles and permissions resolved from an embedded database.
//!
//! ## Modules
//!
//! - `auth` - signing keys, token codec and the request-time access gate
//! - `session` - refresh session store and lifecycle (login, rotate, logout)
//! - `rbac` - users, roles, permissions and their resolution
//! - `identity` - Google sign-in and account linking
//! - `api` - HTTP API handlers (Axum)

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod identity;
pub mod rbac;
pub mod session;
pub mod state;
