// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

//! # Runtime Configuration
//!
//! Configuration is read from the environment once at startup (after
//! `.env` is loaded). Unparseable numbers fall back to their defaults, as do
//! zero or overflowing token lifetimes and store timeouts.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory holding the RBAC database (`rbac.redb`) | `./data` |
//! | `JWT_PRIVATE_KEY` | Path of the RSA private key PEM | unset (ephemeral key) |
//! | `JWT_PUBLIC_KEY` | Path of the RSA public key PEM | unset (ephemeral key) |
//! | `JWT_ISSUER` | `iss` claim of issued tokens | `chattycathy` |
//! | `JWT_ACCESS_EXPIRY_MINS` | Access token lifetime | `15` |
//! | `JWT_REFRESH_EXPIRY_DAYS` | Refresh token lifetime | `7` |
//! | `SESSION_STORE` | Session backend (`redis` or `memory`) | `redis` |
//! | `REDIS_HOST` | Session store host | `localhost` |
//! | `REDIS_PORT` | Session store port | `6379` |
//! | `REDIS_PASSWORD` | Session store password | unset |
//! | `REDIS_DB` | Session store database index | `0` |
//! | `STORE_TIMEOUT_SECS` | Timeout for each session store call | `5` |
//! | `GOOGLE_CLIENT_ID` | Google OAuth client id | empty |
//! | `GOOGLE_CLIENT_SECRET` | Google OAuth client secret | empty |
//! | `GOOGLE_REDIRECT_URL` | OAuth redirect URI | `http://localhost:3000` |
//! | `COOKIE_SECURE` | Mark the refresh cookie `Secure` | `false` |
//! | `CORS_ALLOWED_ORIGINS` | Comma separated origins, empty allows any | empty |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::auth::KeyConfig;
use crate::identity::GoogleConfig;
use crate::session::RedisSettings;

pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// File name of the RBAC database inside `DATA_DIR`.
pub const RBAC_DB_FILE: &str = "rbac.redb";

/// Where refresh sessions live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionBackendKind {
    #[default]
    Redis,
    /// Process-local; sessions are lost on restart and not shared.
    Memory,
}

impl FromStr for SessionBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown session store '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub keys: KeyConfig,
    pub issuer: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub session_backend: SessionBackendKind,
    pub redis: RedisSettings,
    pub store_timeout: Duration,
    pub google: GoogleConfig,
    pub cookie_secure: bool,
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars().collect())
    }

    /// Build from an explicit variable map.
    pub fn from_vars(vars: HashMap<String, String>) -> Self {
        let get = |name: &str| vars.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());
        let text = |name: &str, default: &str| get(name).unwrap_or(default).to_string();
        let path = |name: &str| get(name).map(PathBuf::from);

        Self {
            host: text("HOST", "0.0.0.0"),
            port: parse_or(get("PORT"), 8080),
            data_dir: PathBuf::from(text(DATA_DIR_ENV, "./data")),
            keys: KeyConfig {
                private_key_path: path("JWT_PRIVATE_KEY"),
                public_key_path: path("JWT_PUBLIC_KEY"),
            },
            issuer: text("JWT_ISSUER", "chattycathy"),
            access_ttl: positive_secs(get("JWT_ACCESS_EXPIRY_MINS"), 60, 15),
            refresh_ttl: positive_secs(get("JWT_REFRESH_EXPIRY_DAYS"), 86_400, 7),
            session_backend: parse_or(get("SESSION_STORE"), SessionBackendKind::Redis),
            redis: RedisSettings {
                host: text("REDIS_HOST", "localhost"),
                port: parse_or(get("REDIS_PORT"), 6379),
                password: get("REDIS_PASSWORD").map(str::to_string),
                db: parse_or(get("REDIS_DB"), 0),
            },
            store_timeout: positive_secs(get("STORE_TIMEOUT_SECS"), 1, 5),
            google: GoogleConfig {
                client_id: text("GOOGLE_CLIENT_ID", ""),
                client_secret: text("GOOGLE_CLIENT_SECRET", ""),
                redirect_url: text("GOOGLE_REDIRECT_URL", "http://localhost:3000"),
            },
            cookie_secure: parse_or(get("COOKIE_SECURE"), false),
            cors_origins: get("CORS_ALLOWED_ORIGINS")
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn rbac_db_path(&self) -> PathBuf {
        self.data_dir.join(RBAC_DB_FILE)
    }
}

fn parse_or<T: FromStr>(value: Option<&str>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// `value` units of `unit_secs` each. Zero, unparseable or overflowing
/// values give `default` units.
fn positive_secs(value: Option<&str>, unit_secs: u64, default: u64) -> Duration {
    let secs = value
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|n| *n > 0)
        .and_then(|n| n.checked_mul(unit_secs))
        .unwrap_or(default * unit_secs);
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = AppConfig::from_vars(HashMap::new());
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.issuer, "chattycathy");
        assert_eq!(config.access_ttl, Duration::from_secs(15 * 60));
        assert_eq!(config.refresh_ttl, Duration::from_secs(7 * 86_400));
        assert_eq!(config.redis.url(), "redis://localhost:6379/0");
        assert_eq!(config.store_timeout, Duration::from_secs(5));
        assert!(config.keys.private_key_path.is_none());
        assert!(!config.cookie_secure);
        assert!(config.cors_origins.is_empty());
        assert_eq!(config.rbac_db_path(), PathBuf::from("./data/rbac.redb"));
    }

    #[test]
    fn values_are_read_from_vars() {
        let config = AppConfig::from_vars(vars(&[
            ("PORT", "9000"),
            ("JWT_ACCESS_EXPIRY_MINS", "5"),
            ("JWT_PRIVATE_KEY", "/keys/private.pem"),
            ("REDIS_PASSWORD", "pw"),
            ("REDIS_DB", "2"),
            ("COOKIE_SECURE", "true"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
        ]));
        assert_eq!(config.port, 9000);
        assert_eq!(config.access_ttl, Duration::from_secs(300));
        assert_eq!(config.keys.private_key_path, Some(PathBuf::from("/keys/private.pem")));
        assert_eq!(config.redis.url(), "redis://:pw@localhost:6379/2");
        assert!(config.cookie_secure);
        assert_eq!(config.cors_origins, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn unparseable_numbers_fall_back() {
        let config = AppConfig::from_vars(vars(&[("PORT", "http"), ("JWT_REFRESH_EXPIRY_DAYS", "-1")]));
        assert_eq!(config.port, 8080);
        assert_eq!(config.refresh_ttl, Duration::from_secs(7 * 86_400));
    }

    #[test]
    fn zero_or_overflowing_lifetimes_fall_back() {
        let config = AppConfig::from_vars(vars(&[
            ("JWT_ACCESS_EXPIRY_MINS", "0"),
            ("JWT_REFRESH_EXPIRY_DAYS", "18446744073709551615"),
            ("STORE_TIMEOUT_SECS", "0"),
        ]));
        assert_eq!(config.access_ttl, Duration::from_secs(15 * 60));
        assert_eq!(config.refresh_ttl, Duration::from_secs(7 * 86_400));
        assert_eq!(config.store_timeout, Duration::from_secs(5));
    }

    #[test]
    fn session_store_kind_is_selectable() {
        assert_eq!(AppConfig::from_vars(HashMap::new()).session_backend, SessionBackendKind::Redis);
        let memory = AppConfig::from_vars(vars(&[("SESSION_STORE", "Memory")]));
        assert_eq!(memory.session_backend, SessionBackendKind::Memory);
        let unknown = AppConfig::from_vars(vars(&[("SESSION_STORE", "etcd")]));
        assert_eq!(unknown.session_backend, SessionBackendKind::Redis);
    }
}
