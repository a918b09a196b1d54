// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

//! Google OAuth 2.0 identity provider.
//!
//! Supports both frontend flows:
//!
//! - **Implicit**: the client sends a Google access token, which is verified
//!   by calling the userinfo endpoint with it
//! - **Authorization code**: the code is exchanged at the token endpoint,
//!   then the resulting access token is verified as above

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{ExternalIdentity, IdentityError, IdentityProvider, ProviderCredential};

const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Upper bound for any call to Google.
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

/// Values the frontend needs to render the Google sign-in button.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ClientConfig {
    pub client_id: String,
    pub redirect_uri: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    verified_email: bool,
    #[serde(default)]
    name: String,
    #[serde(default)]
    picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Clone)]
pub struct GoogleIdentityProvider {
    config: GoogleConfig,
    client: reqwest::Client,
    userinfo_url: String,
    token_url: String,
}

impl GoogleIdentityProvider {
    pub fn new(config: GoogleConfig) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| IdentityError::Provider(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            client,
            userinfo_url: USERINFO_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
        })
    }

    /// Point at different endpoints (tests, proxies).
    pub fn with_endpoints(mut self, userinfo_url: impl Into<String>, token_url: impl Into<String>) -> Self {
        self.userinfo_url = userinfo_url.into();
        self.token_url = token_url.into();
        self
    }

    async fn user_info(&self, access_token: &str) -> Result<ExternalIdentity, IdentityError> {
        let response = self
            .client
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| IdentityError::Provider(format!("userinfo request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(IdentityError::Provider(format!(
                "HTTP {} from userinfo endpoint",
                response.status()
            )));
        }

        let info: GoogleUserInfo = response
            .json()
            .await
            .map_err(|e| IdentityError::Provider(format!("invalid userinfo response: {e}")))?;

        Ok(ExternalIdentity {
            external_id: info.id,
            email: info.email,
            verified_email: info.verified_email,
            name: info.name,
            avatar_url: info.picture.filter(|p| !p.is_empty()),
        })
    }

    async fn exchange_code(&self, code: &str) -> Result<String, IdentityError> {
        let params = [
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_url.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| IdentityError::Provider(format!("token exchange failed: {e}")))?;

        if !response.status().is_success() {
            return Err(IdentityError::Provider(format!(
                "HTTP {} from token endpoint",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| IdentityError::Provider(format!("invalid token response: {e}")))?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentityProvider {
    async fn verify(&self, credential: &ProviderCredential) -> Result<ExternalIdentity, IdentityError> {
        match credential {
            ProviderCredential::AccessToken(token) => self.user_info(token).await,
            ProviderCredential::Code(code) => {
                let token = self.exchange_code(code).await?;
                self.user_info(&token).await
            }
        }
    }

    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            client_id: self.config.client_id.clone(),
            redirect_uri: self.config.redirect_url.clone(),
        }
    }
}
