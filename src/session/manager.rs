// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

//! Session lifecycle: login, refresh (rotation), logout, listing.
//!
//! ## Rotation
//!
//! A refresh token is single-use. Refreshing deletes the presented session
//! before a new one is written, so a crash in between logs the user out
//! instead of leaving two valid tokens. The new pair reuses the permission
//! snapshot stored with the old session; role changes apply at next login.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use super::store::{CleanupReport, RefreshSession, RefreshSessionStore};
use super::StoreError;
use crate::auth::{TokenCodec, TokenError, TokenSubject};
use crate::rbac::PermissionSource;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid or expired refresh token")]
    InvalidOrExpired,

    #[error("session store unavailable: {0}")]
    StoreUnavailable(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("session error: {0}")]
    Internal(String),
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => SessionError::StoreUnavailable(msg),
            StoreError::Serialization(e) => SessionError::Internal(e.to_string()),
        }
    }
}

/// Who is logging in.
#[derive(Debug, Clone)]
pub struct LoginSubject {
    pub user_id: String,
    pub username: String,
    pub role: String,
}

/// Request metadata recorded with a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub user_agent: String,
    pub ip: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds
    pub access_token_expires_in: u64,
    /// Seconds
    pub refresh_token_expires_in: u64,
    pub token_type: &'static str,
}

/// A new session's tokens and the permission snapshot baked into them.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub tokens: TokenPair,
    pub permissions: Vec<String>,
}

/// Session as shown to its owner. Never includes the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SessionSummary {
    pub created_at: DateTime<Utc>,
    pub user_agent: String,
    pub ip: String,
}

impl From<RefreshSession> for SessionSummary {
    fn from(s: RefreshSession) -> Self {
        Self {
            created_at: s.created_at,
            user_agent: s.user_agent,
            ip: s.ip,
        }
    }
}

#[derive(Clone)]
pub struct SessionManager {
    codec: Arc<TokenCodec>,
    store: RefreshSessionStore,
    permissions: Arc<dyn PermissionSource>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl SessionManager {
    pub fn new(
        codec: Arc<TokenCodec>,
        store: RefreshSessionStore,
        permissions: Arc<dyn PermissionSource>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            codec,
            store,
            permissions,
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn store(&self) -> &RefreshSessionStore {
        &self.store
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Start a session for a freshly authenticated user.
    pub async fn login(&self, subject: &LoginSubject, client: &ClientInfo) -> Result<LoginOutcome, SessionError> {
        let permissions = match self.permissions.resolve_permissions(&subject.user_id).await {
            Ok(permissions) => permissions,
            Err(e) => {
                warn!(user_id = %subject.user_id, error = %e, "Permission resolution failed, issuing empty snapshot");
                Vec::new()
            }
        };

        let session = RefreshSession {
            user_id: subject.user_id.clone(),
            username: subject.username.clone(),
            role: subject.role.clone(),
            permissions: permissions.clone(),
            created_at: Utc::now(),
            user_agent: client.user_agent.clone(),
            ip: client.ip.clone(),
        };

        let tokens = self.issue(session).await?;
        info!(user_id = %subject.user_id, "Session created");
        Ok(LoginOutcome { tokens, permissions })
    }

    /// Exchange a refresh token for a new pair. The presented token stops
    /// working immediately.
    pub async fn refresh(&self, presented: &str, client: &ClientInfo) -> Result<TokenPair, SessionError> {
        let presented = presented.trim();
        if presented.is_empty() {
            return Err(SessionError::InvalidOrExpired);
        }

        let previous = self
            .store
            .get(presented)
            .await?
            .ok_or(SessionError::InvalidOrExpired)?;

        // Only the request whose delete removed the record may rotate it.
        match self.store.delete(presented).await {
            Ok(report) if report.removed == 0 => return Err(SessionError::InvalidOrExpired),
            Ok(report) if report.is_degraded() => {
                warn!(user_id = %previous.user_id, "Old refresh session removed with degraded cleanup");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(user_id = %previous.user_id, error = %e, "Failed to delete rotated refresh session");
            }
        }

        let session = RefreshSession {
            created_at: Utc::now(),
            user_agent: client.user_agent.clone(),
            ip: client.ip.clone(),
            ..previous
        };
        self.issue(session).await
    }

    /// End one session. Never fails for the caller.
    pub async fn logout(&self, token: &str) -> CleanupReport {
        let token = token.trim();
        if token.is_empty() {
            return CleanupReport::default();
        }

        match self.store.delete(token).await {
            Ok(report) => report,
            Err(e) => {
                let mut report = CleanupReport::default();
                report.warn(format!("logout could not reach session store: {e}"));
                report
            }
        }
    }

    /// End every session of a user.
    pub async fn logout_all(&self, user_id: &str) -> Result<CleanupReport, SessionError> {
        let report = self.store.delete_all_for_user(user_id).await?;
        info!(%user_id, removed = report.removed, "All sessions revoked");
        Ok(report)
    }

    /// Active sessions, newest first.
    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>, SessionError> {
        let mut sessions: Vec<SessionSummary> = self
            .store
            .list_for_user(user_id)
            .await?
            .into_iter()
            .map(SessionSummary::from)
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn issue(&self, session: RefreshSession) -> Result<TokenPair, SessionError> {
        let subject = TokenSubject {
            user_id: session.user_id.clone(),
            username: session.username.clone(),
            role: session.role.clone(),
            permissions: session.permissions.clone(),
        };
        let access_token = self.codec.issue_access_token(&subject, self.access_ttl)?;
        let refresh_token = self.codec.issue_refresh_token()?;

        self.store.put(&refresh_token, &session, self.refresh_ttl).await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_token_expires_in: self.access_ttl.as_secs(),
            refresh_token_expires_in: self.refresh_ttl.as_secs(),
            token_type: "Bearer",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::kv::{KvOp, MemoryBackend};
    use crate::session::store::DEFAULT_STORE_TIMEOUT;
    use crate::session::kv::KvBackend;
    use crate::test_support::{shared_keys, StaticPermissions};
    use async_trait::async_trait;

    /// Yields to the scheduler before every call so concurrent requests
    /// interleave between reads and writes.
    struct Interleaving(Arc<MemoryBackend>);

    #[async_trait]
    impl KvBackend for Interleaving {
        async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
            tokio::task::yield_now().await;
            self.0.set_ex(key, value, ttl).await
        }

        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            tokio::task::yield_now().await;
            self.0.get(key).await
        }

        async fn del(&self, key: &str) -> Result<bool, StoreError> {
            tokio::task::yield_now().await;
            self.0.del(key).await
        }

        async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError> {
            tokio::task::yield_now().await;
            self.0.sadd(key, member).await
        }

        async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError> {
            tokio::task::yield_now().await;
            self.0.srem(key, member).await
        }

        async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
            tokio::task::yield_now().await;
            self.0.smembers(key).await
        }

        async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
            tokio::task::yield_now().await;
            self.0.expire(key, ttl).await
        }

        async fn ping(&self) -> Result<(), StoreError> {
            self.0.ping().await
        }
    }

    struct Harness {
        kv: Arc<MemoryBackend>,
        codec: Arc<TokenCodec>,
        manager: SessionManager,
    }

    fn harness(permissions: StaticPermissions) -> Harness {
        let kv = Arc::new(MemoryBackend::new());
        let codec = Arc::new(TokenCodec::new(shared_keys(), "chattycathy"));
        let store = RefreshSessionStore::new(kv.clone(), DEFAULT_STORE_TIMEOUT);
        let manager = SessionManager::new(
            codec.clone(),
            store,
            Arc::new(permissions),
            Duration::from_secs(15 * 60),
            Duration::from_secs(7 * 24 * 3600),
        );
        Harness { kv, codec, manager }
    }

    fn subject(id: &str) -> LoginSubject {
        LoginSubject {
            user_id: id.to_string(),
            username: "a@x.com".to_string(),
            role: "user".to_string(),
        }
    }

    fn client(agent: &str) -> ClientInfo {
        ClientInfo {
            user_agent: agent.to_string(),
            ip: "203.0.113.7".to_string(),
        }
    }

    #[tokio::test]
    async fn login_issues_pair_with_resolved_permissions() {
        let h = harness(StaticPermissions::new(&[("42", &["ping:read", "news:read"])]));
        let outcome = h.manager.login(&subject("42"), &client("firefox")).await.unwrap();
        assert_eq!(outcome.permissions, vec!["ping:read", "news:read"]);
        let pair = outcome.tokens;

        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.access_token_expires_in, 900);
        assert_eq!(pair.refresh_token_expires_in, 604_800);

        let claims = h.codec.verify_access_token(&pair.access_token).unwrap();
        assert_eq!(claims.permissions, vec!["ping:read", "news:read"]);
        assert!(h.manager.store().get(&pair.refresh_token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn resolution_failure_yields_empty_snapshot() {
        let h = harness(StaticPermissions::failing());
        let outcome = h.manager.login(&subject("42"), &client("x")).await.unwrap();
        assert!(outcome.permissions.is_empty());
        let pair = outcome.tokens;
        let claims = h.codec.verify_access_token(&pair.access_token).unwrap();
        assert!(claims.permissions.is_empty());
    }

    #[tokio::test]
    async fn refresh_rotates_and_old_token_dies() {
        let h = harness(StaticPermissions::new(&[("42", &["ping:read", "news:read"])]));
        let r1 = h.manager.login(&subject("42"), &client("a")).await.unwrap().tokens;

        let r2 = h.manager.refresh(&r1.refresh_token, &client("b")).await.unwrap();
        assert_ne!(r1.refresh_token, r2.refresh_token);

        let claims = h.codec.verify_access_token(&r2.access_token).unwrap();
        assert_eq!(claims.permissions, vec!["ping:read", "news:read"]);

        assert!(matches!(
            h.manager.refresh(&r1.refresh_token, &client("c")).await,
            Err(SessionError::InvalidOrExpired)
        ));
        assert!(h.manager.refresh(&r2.refresh_token, &client("c")).await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_refresh_of_one_token_succeeds_once() {
        let kv = Arc::new(MemoryBackend::new());
        let codec = Arc::new(TokenCodec::new(shared_keys(), "chattycathy"));
        let manager = SessionManager::new(
            codec,
            RefreshSessionStore::new(Arc::new(Interleaving(kv)), DEFAULT_STORE_TIMEOUT),
            Arc::new(StaticPermissions::default()),
            Duration::from_secs(15 * 60),
            Duration::from_secs(7 * 24 * 3600),
        );
        let r1 = manager.login(&subject("42"), &client("a")).await.unwrap().tokens;

        let (client_a, client_b) = (client("a"), client("b"));
        let (first, second) = tokio::join!(
            manager.refresh(&r1.refresh_token, &client_a),
            manager.refresh(&r1.refresh_token, &client_b)
        );

        let succeeded = [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(succeeded, 1);
        for result in [first, second] {
            if let Err(e) = result {
                assert!(matches!(e, SessionError::InvalidOrExpired));
            }
        }
        assert_eq!(manager.list_sessions("42").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn refresh_records_presenting_client() {
        let h = harness(StaticPermissions::default());
        let r1 = h.manager.login(&subject("42"), &client("laptop")).await.unwrap().tokens;
        let r2 = h.manager.refresh(&r1.refresh_token, &client("phone")).await.unwrap();

        let stored = h.manager.store().get(&r2.refresh_token).await.unwrap().unwrap();
        assert_eq!(stored.user_agent, "phone");
    }

    #[tokio::test]
    async fn refresh_reuses_snapshot_without_re_resolving() {
        let h = harness(StaticPermissions::new(&[("42", &["ping:read"])]));
        let r1 = h.manager.login(&subject("42"), &client("a")).await.unwrap().tokens;

        let rotated = SessionManager {
            permissions: Arc::new(StaticPermissions::new(&[("42", &["roles:read"])])),
            ..h.manager.clone()
        };
        let r2 = rotated.refresh(&r1.refresh_token, &client("a")).await.unwrap();
        let claims = h.codec.verify_access_token(&r2.access_token).unwrap();
        assert_eq!(claims.permissions, vec!["ping:read"]);
    }

    #[tokio::test]
    async fn empty_or_unknown_token_is_invalid() {
        let h = harness(StaticPermissions::default());
        assert!(matches!(
            h.manager.refresh("", &client("a")).await,
            Err(SessionError::InvalidOrExpired)
        ));
        assert!(matches!(
            h.manager.refresh("   ", &client("a")).await,
            Err(SessionError::InvalidOrExpired)
        ));
        assert!(matches!(
            h.manager.refresh("bm9wZQ==", &client("a")).await,
            Err(SessionError::InvalidOrExpired)
        ));
    }

    #[tokio::test]
    async fn store_outage_is_unavailable_not_invalid() {
        let h = harness(StaticPermissions::default());
        let r1 = h.manager.login(&subject("42"), &client("a")).await.unwrap().tokens;
        h.kv.set_offline(true);

        assert!(matches!(
            h.manager.refresh(&r1.refresh_token, &client("a")).await,
            Err(SessionError::StoreUnavailable(_))
        ));
        assert!(matches!(
            h.manager.login(&subject("42"), &client("a")).await,
            Err(SessionError::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn failed_delete_of_old_session_does_not_block_refresh() {
        let h = harness(StaticPermissions::default());
        let r1 = h.manager.login(&subject("42"), &client("a")).await.unwrap().tokens;
        h.kv.inject_failure(KvOp::Del, "refresh_token:");

        assert!(h.manager.refresh(&r1.refresh_token, &client("a")).await.is_ok());
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let h = harness(StaticPermissions::default());
        let pair = h.manager.login(&subject("42"), &client("a")).await.unwrap().tokens;

        assert_eq!(h.manager.logout(&pair.refresh_token).await.removed, 1);
        assert_eq!(h.manager.logout(&pair.refresh_token).await.removed, 0);
        assert_eq!(h.manager.logout("").await, CleanupReport::default());

        h.kv.set_offline(true);
        assert!(h.manager.logout(&pair.refresh_token).await.is_degraded());
    }

    #[tokio::test]
    async fn logout_all_invalidates_every_token() {
        let h = harness(StaticPermissions::default());
        let a = h.manager.login(&subject("42"), &client("a")).await.unwrap().tokens;
        let b = h.manager.login(&subject("42"), &client("b")).await.unwrap().tokens;
        let other = h.manager.login(&subject("7"), &client("c")).await.unwrap().tokens;

        let report = h.manager.logout_all("42").await.unwrap();
        assert_eq!(report.removed, 2);

        for token in [&a.refresh_token, &b.refresh_token] {
            assert!(matches!(
                h.manager.refresh(token, &client("a")).await,
                Err(SessionError::InvalidOrExpired)
            ));
        }
        assert!(h.manager.refresh(&other.refresh_token, &client("c")).await.is_ok());
        assert!(h.manager.list_sessions("42").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn two_logins_one_logout_lists_one_session() {
        let h = harness(StaticPermissions::default());
        let first = h.manager.login(&subject("42"), &client("laptop")).await.unwrap().tokens;
        let _second = h.manager.login(&subject("42"), &client("phone")).await.unwrap().tokens;

        h.manager.logout(&first.refresh_token).await;

        let sessions = h.manager.list_sessions("42").await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].user_agent, "phone");
        assert_eq!(sessions[0].ip, "203.0.113.7");
    }

    #[tokio::test]
    async fn listing_is_newest_first() {
        let h = harness(StaticPermissions::default());
        for agent in ["one", "two", "three"] {
            h.manager.login(&subject("42"), &client(agent)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let agents: Vec<String> = h
            .manager
            .list_sessions("42")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.user_agent)
            .collect();
        assert_eq!(agents, vec!["three", "two", "one"]);
    }
}
