//! Daemon lifecycle: secret resolution, directory setup, component wiring,
//! watcher start, gRPC server.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

use duffel_auth::{AuthGate, StaticCredentials, TokenService};
use duffel_core::DuffelConfig;
use duffel_crypto::KeyStore;
use duffel_sync::{watch_storage, NotificationBus, TransferEngine, UserStore};

use crate::grpc::{AuthApi, SyncApi};

/// Environment variable overriding the config-file token secret.
pub const TOKEN_SECRET_ENV: &str = "DUFFEL_TOKEN_SECRET";

pub async fn run(config: DuffelConfig) -> Result<()> {
    let listener = TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("binding {}", config.server.listen))?;
    serve_on(config, listener).await
}

/// Bring the daemon up on an already-bound listener (tests bind port 0).
pub async fn serve_on(config: DuffelConfig, listener: TcpListener) -> Result<()> {
    info!("daemon starting");

    let secret = token_secret(&config)?;

    std::fs::create_dir_all(&config.storage.root)
        .with_context(|| format!("creating storage root {}", config.storage.root.display()))?;
    std::fs::create_dir_all(&config.storage.keys_root)
        .with_context(|| format!("creating keys root {}", config.storage.keys_root.display()))?;

    let tokens = Arc::new(TokenService::new(
        secret,
        Duration::from_secs(config.auth.access_ttl_secs),
        Duration::from_secs(config.auth.refresh_ttl_secs),
    ));

    let verifier = Arc::new(StaticCredentials::new(config.auth.users.clone()));
    if verifier.is_empty() {
        warn!("no users configured under [auth.users]  (every login will be rejected)");
    }

    let keys = Arc::new(KeyStore::new(&config.storage.keys_root));
    let store = Arc::new(UserStore::new(&config.storage.root));
    let engine = Arc::new(TransferEngine::new(store, keys.clone()));
    let bus = Arc::new(NotificationBus::new(config.bus.capacity));

    // Keep the handle alive for the life of the server; dropping it stops
    // the watch
    let _watcher = watch_storage(config.storage.root.clone(), bus.clone())
        .map_err(|e| anyhow::anyhow!("starting storage watcher: {e}"))?;

    let auth = AuthApi::new(verifier, tokens.clone(), keys);
    let sync = SyncApi::new(AuthGate::new(tokens), engine, bus);

    let addr = listener.local_addr()?;
    info!(addr = %addr, "gRPC: listening");

    crate::grpc::serve(listener, auth, sync).await
}

fn token_secret(config: &DuffelConfig) -> Result<String> {
    if let Ok(secret) = std::env::var(TOKEN_SECRET_ENV) {
        if !secret.is_empty() {
            return Ok(secret);
        }
    }
    if let Some(secret) = &config.auth.secret {
        if !secret.is_empty() {
            return Ok(secret.clone());
        }
    }
    anyhow::bail!("no token secret: set {TOKEN_SECRET_ENV} or [auth] secret in duffel.toml")
}
