// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

//! Refresh session registry.
//!
//! ## Key Layout
//!
//! ```text
//! refresh_token:<token>   JSON RefreshSession, TTL = refresh lifetime
//! user_tokens:<user_id>   set of tokens, TTL reset on every login/refresh
//! ```
//!
//! The index may briefly reference sessions that already expired; those
//! entries are pruned the next time the user's sessions are listed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::kv::{KvBackend, StoreError};

const SESSION_PREFIX: &str = "refresh_token:";
const USER_INDEX_PREFIX: &str = "user_tokens:";

/// Default bound on a single backend call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Session metadata stored under a refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSession {
    pub user_id: String,
    pub username: String,
    pub role: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub ip: String,
}

/// Outcome of a cleanup that may partly fail without affecting correctness.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    /// Session records actually deleted
    pub removed: usize,
    /// Secondary steps that failed
    pub warnings: Vec<String>,
}

impl CleanupReport {
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub(crate) fn warn(&mut self, message: String) {
        warn!(%message, "Session cleanup degraded");
        self.warnings.push(message);
    }
}

fn session_key(token: &str) -> String {
    format!("{SESSION_PREFIX}{token}")
}

fn index_key(user_id: &str) -> String {
    format!("{USER_INDEX_PREFIX}{user_id}")
}

#[derive(Clone)]
pub struct RefreshSessionStore {
    backend: Arc<dyn KvBackend>,
    timeout: Duration,
}

impl RefreshSessionStore {
    pub fn new(backend: Arc<dyn KvBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    async fn bounded<T>(&self, op: impl Future<Output = Result<T, StoreError>>) -> Result<T, StoreError> {
        tokio::time::timeout(self.timeout, op)
            .await
            .map_err(|_| StoreError::Unavailable(format!("timed out after {:?}", self.timeout)))?
    }

    /// Store a session and add it to the owner's index.
    pub async fn put(&self, token: &str, session: &RefreshSession, ttl: Duration) -> Result<(), StoreError> {
        let json = serde_json::to_string(session)?;
        let index = index_key(&session.user_id);

        self.bounded(self.backend.set_ex(&session_key(token), &json, ttl))
            .await?;
        self.bounded(self.backend.sadd(&index, token)).await?;

        if let Err(e) = self.bounded(self.backend.expire(&index, ttl)).await {
            warn!(user_id = %session.user_id, error = %e, "Failed to reset session index TTL");
        }
        Ok(())
    }

    /// Look up a session. Expired, unknown and undecodable tokens are `None`.
    pub async fn get(&self, token: &str) -> Result<Option<RefreshSession>, StoreError> {
        let Some(raw) = self.bounded(self.backend.get(&session_key(token))).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(error = %e, "Discarding undecodable refresh session");
                Ok(None)
            }
        }
    }

    /// Delete one session. Removing it from the index is best-effort.
    pub async fn delete(&self, token: &str) -> Result<CleanupReport, StoreError> {
        let owner = self.get(token).await?.map(|s| s.user_id);
        let mut report = CleanupReport::default();

        if self.bounded(self.backend.del(&session_key(token))).await? {
            report.removed = 1;
        }

        if let Some(user_id) = owner {
            if let Err(e) = self.bounded(self.backend.srem(&index_key(&user_id), token)).await {
                report.warn(format!("failed to remove token from index of user {user_id}: {e}"));
            }
        }
        Ok(report)
    }

    /// Delete every session of a user, then the index itself.
    pub async fn delete_all_for_user(&self, user_id: &str) -> Result<CleanupReport, StoreError> {
        let index = index_key(user_id);
        let tokens = self.bounded(self.backend.smembers(&index)).await?;
        let mut report = CleanupReport::default();

        for token in &tokens {
            match self.bounded(self.backend.del(&session_key(token))).await {
                Ok(true) => report.removed += 1,
                Ok(false) => {}
                Err(e) => report.warn(format!("failed to delete session of user {user_id}: {e}")),
            }
        }

        self.bounded(self.backend.del(&index)).await?;
        Ok(report)
    }

    /// All live sessions of a user. Dangling index entries are pruned.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<RefreshSession>, StoreError> {
        let index = index_key(user_id);
        let tokens = self.bounded(self.backend.smembers(&index)).await?;
        let mut sessions = Vec::with_capacity(tokens.len());

        for token in &tokens {
            match self.get(token).await? {
                Some(session) => sessions.push(session),
                None => {
                    if let Err(e) = self.bounded(self.backend.srem(&index, token)).await {
                        warn!(%user_id, error = %e, "Failed to prune stale session index entry");
                    }
                }
            }
        }
        Ok(sessions)
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.bounded(self.backend.ping()).await
    }
}
