// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

use std::{net::SocketAddr, sync::Arc};

use chattycathy_auth::{
    api::router,
    auth::{KeyOrigin, SigningKeys, TokenCodec},
    config::{AppConfig, SessionBackendKind, LOG_FORMAT_ENV},
    identity::GoogleIdentityProvider,
    rbac::{assign_default_role_to_unassigned, seed_defaults, RbacStore},
    session::{KvBackend, MemoryBackend, RedisBackend, RefreshSessionStore, SessionManager},
    state::{AppState, CookieSettings},
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,tower_http=debug".into());
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env();

    // Signing keys: loaded from disk or generated. Failing here is fatal.
    let keys = SigningKeys::initialize(&config.keys)?;
    if keys.origin() == KeyOrigin::Generated && config.keys.private_key_path.is_none() {
        warn!("JWT key paths not configured, using an ephemeral key pair; tokens will not survive a restart");
    }
    let codec = Arc::new(TokenCodec::new(Arc::new(keys), config.issuer.clone()));

    // RBAC database
    std::fs::create_dir_all(&config.data_dir)?;
    let rbac = RbacStore::open(&config.rbac_db_path())?;
    seed_defaults(&rbac)?;
    rbac.verify_catalog()?;
    let assigned = assign_default_role_to_unassigned(&rbac)?;
    info!(path = %config.rbac_db_path().display(), assigned, "RBAC database ready");

    // Session store
    let backend: Arc<dyn KvBackend> = match config.session_backend {
        SessionBackendKind::Redis => Arc::new(RedisBackend::connect(&config.redis, config.store_timeout)?),
        SessionBackendKind::Memory => {
            warn!("Using in-memory session store; sessions are lost on restart and not shared between instances");
            Arc::new(MemoryBackend::new())
        }
    };
    let store = RefreshSessionStore::new(backend, config.store_timeout);
    if let Err(e) = store.ping().await {
        warn!(error = %e, host = %config.redis.host, "Session store not reachable yet");
    }

    let sessions = SessionManager::new(
        codec.clone(),
        store,
        Arc::new(rbac.clone()),
        config.access_ttl,
        config.refresh_ttl,
    );

    let identity = GoogleIdentityProvider::new(config.google.clone())?;
    if config.google.client_id.is_empty() {
        warn!("GOOGLE_CLIENT_ID not set, Google sign-in will fail");
    }

    let state = AppState::new(
        codec,
        sessions,
        rbac,
        Arc::new(identity),
        CookieSettings {
            secure: config.cookie_secure,
        },
    );
    let app = router(state, &config.cors_origins);

    let addr: SocketAddr = config.bind_address().parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "ChattyCathy auth server listening (OpenAPI at /api-doc/openapi.json)");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
