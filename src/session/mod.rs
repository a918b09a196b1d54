// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

//! Refresh sessions.
//!
//! - `kv` - key-value backends (Redis, in-memory)
//! - `store` - refresh session records and the per-user index
//! - `manager` - login, rotation, logout, listing

pub mod kv;
pub mod manager;
pub mod store;

pub use kv::{KvBackend, KvOp, MemoryBackend, RedisBackend, RedisSettings, StoreError};
pub use manager::{ClientInfo, LoginOutcome, LoginSubject, SessionError, SessionManager, SessionSummary, TokenPair};
pub use store::{CleanupReport, RefreshSession, RefreshSessionStore, DEFAULT_STORE_TIMEOUT};
