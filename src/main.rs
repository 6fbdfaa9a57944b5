// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{error::Error, net::SocketAddr, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use quorum_custody_server::{
    api::router,
    auth::IdentityVerifier,
    config::{AppConfig, EnclaveMode},
    enclave::{EnclaveClient, MockEnclaveClient, RemoteEnclaveClient},
    logging,
    service::CustodyService,
    session::{CacheStore, MemoryCache, RedisCache},
    state::AppState,
    storage::Database,
};

type BoxError = Box<dyn Error + Send + Sync>;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "server failed");
        eprintln!("quorum-custody-server: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), BoxError> {
    let config = AppConfig::from_env()?;
    logging::init(config.log_format);

    // Relational store
    std::fs::create_dir_all(&config.data_dir)?;
    let db_path = config.database_path();
    let db = Arc::new(Database::open(&db_path)?);
    info!(path = %db_path.display(), "database opened");

    // Cache store
    let cache: Arc<dyn CacheStore> = match &config.redis_url {
        Some(url) => Arc::new(RedisCache::connect(url).await?),
        None => {
            warn!("REDIS_URL not set, using in-process cache (single instance only)");
            Arc::new(MemoryCache::new(config.cache_capacity))
        }
    };

    // Secure enclave
    let enclave: Arc<dyn EnclaveClient> = match &config.enclave {
        EnclaveMode::Remote { host, port } => {
            info!(%host, port, "using remote enclave");
            Arc::new(RemoteEnclaveClient::new(host, *port, config.enclave_timeout)?)
        }
        EnclaveMode::Mock { seed: Some(seed) } => {
            warn!("ENCLAVE_HOST not set, using seeded mock enclave");
            Arc::new(MockEnclaveClient::new(*seed))
        }
        EnclaveMode::Mock { seed: None } => {
            warn!("ENCLAVE_HOST not set, using mock enclave with a random seed");
            Arc::new(MockEnclaveClient::random()?)
        }
    };

    let service = CustodyService::new(&config, db, enclave, cache)?;
    let mut state = AppState::new(service);
    match &config.identity_assertion_secret {
        Some(secret) => {
            info!(issuer = %config.identity_assertion_issuer, "identity sign-in enabled");
            state = state.with_identity_verifier(IdentityVerifier::new(
                secret,
                &config.identity_assertion_issuer,
            ));
        }
        None => warn!("IDENTITY_ASSERTION_SECRET not set, identity sign-in is disabled"),
    }
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Quorum custody server listening (docs at /docs)");

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("shutdown signal received");
                    shutdown.cancel();
                }
                Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
            }
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("server stopped");
    Ok(())
}
