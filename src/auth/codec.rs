// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

//! Access token encoding/verification and refresh token issuance.
//!
//! ## Access tokens
//!
//! - RS256 only; any other `alg` is rejected as a bad signature
//! - `iat = nbf = now`, `exp = now + ttl`
//! - No clock skew leeway; `iss` must match the configured issuer
//!
//! ## Refresh tokens
//!
//! 32 bytes from the system CSPRNG, URL-safe base64 (44 characters).
//! They are opaque handles into the session store, never parsed.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE, Engine};
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, Header, Validation};
use ring::rand::{SecureRandom, SystemRandom};

use super::claims::{AccessTokenClaims, TokenSubject};
use super::keys::SigningKeys;

/// Refresh token entropy in bytes.
const REFRESH_TOKEN_BYTES: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token is malformed: {0}")]
    Malformed(String),

    #[error("secure random source unavailable")]
    Entropy,

    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl TokenError {
    /// Stable identifier for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TokenError::InvalidSignature => "invalid_signature",
            TokenError::Expired => "expired",
            TokenError::Malformed(_) => "malformed",
            TokenError::Entropy => "entropy",
            TokenError::Signing(_) => "signing",
        }
    }
}

/// Signs and verifies access tokens with the process keypair.
#[derive(Clone)]
pub struct TokenCodec {
    keys: Arc<SigningKeys>,
    issuer: String,
    rng: SystemRandom,
}

impl TokenCodec {
    pub fn new(keys: Arc<SigningKeys>, issuer: impl Into<String>) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            rng: SystemRandom::new(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn keys(&self) -> &SigningKeys {
        &self.keys
    }

    /// Sign an access token for `subject`, valid for `ttl` from now.
    pub fn issue_access_token(&self, subject: &TokenSubject, ttl: Duration) -> Result<String, TokenError> {
        self.issue_access_token_at(subject, Utc::now(), ttl)
    }

    /// Sign an access token as of `issued_at`. Output is deterministic for
    /// fixed inputs.
    pub fn issue_access_token_at(
        &self,
        subject: &TokenSubject,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let ttl_secs = i64::try_from(ttl.as_secs())
            .map_err(|_| TokenError::Malformed("token lifetime out of range".to_string()))?;
        if ttl_secs <= 0 {
            return Err(TokenError::Malformed("token lifetime must be positive".to_string()));
        }

        let now = issued_at.timestamp();
        let claims = AccessTokenClaims {
            user_id: subject.user_id.clone(),
            username: subject.username.clone(),
            role: subject.role.clone(),
            permissions: subject.permissions.clone(),
            iss: self.issuer.clone(),
            sub: subject.user_id.clone(),
            iat: now,
            nbf: now,
            exp: now + ttl_secs,
        };

        encode(&Header::new(Algorithm::RS256), &claims, self.keys.encoding_key())
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify signature, algorithm, expiry, not-before and issuer.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessTokenClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        decode::<AccessTokenClaims>(token, self.keys.decoding_key(), &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::InvalidSignature,
                _ => TokenError::Malformed(e.to_string()),
            })
    }

    /// Generate a fresh opaque refresh token.
    pub fn issue_refresh_token(&self) -> Result<String, TokenError> {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        self.rng.fill(&mut bytes).map_err(|_| TokenError::Entropy)?;
        Ok(URL_SAFE.encode(bytes))
    }
}
