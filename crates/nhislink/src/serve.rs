// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `nhislink serve` command implementation.
//!
//! Opens the SQLite store, builds the relay client and fetch service, and
//! runs the HTTP gateway until SIGINT or SIGTERM.

use std::sync::Arc;

use nhislink_config::NhisConfig;
use nhislink_core::{NhisError, PluginAdapter};
use nhislink_fetch::NhisFetchService;
use nhislink_gateway::{AuthConfig, GatewayState, ServerConfig, start_server};
use nhislink_hyphen::HyphenClient;
use nhislink_storage::SqliteNhisStore;
use tracing::{info, warn};

/// Open and migrate the store configured in `config`.
pub async fn open_store(config: &NhisConfig) -> Result<Arc<SqliteNhisStore>, NhisError> {
    let store = SqliteNhisStore::new(config.storage.clone(), config.hyphen.provider.clone());
    store.initialize().await?;
    Ok(Arc::new(store))
}

/// Run the gateway until a shutdown signal arrives.
pub async fn run_serve(config: NhisConfig) -> Result<(), NhisError> {
    init_tracing(&config.agent.log_level);

    info!(
        name = %config.agent.name,
        database = %config.storage.database_path,
        "starting nhislink"
    );

    let store = open_store(&config).await?;
    let upstream = Arc::new(HyphenClient::new(&config.hyphen)?);
    info!(base_url = %upstream.base_url(), "relay client ready");

    let server_config = ServerConfig::from(&config.gateway);
    let auth = AuthConfig {
        bearer_token: config.gateway.bearer_token.clone(),
    };
    if auth.bearer_token.is_none() {
        warn!("gateway.bearer_token is not set; API routes are unauthenticated");
    }

    let service = NhisFetchService::new(store.clone(), upstream, Arc::new(config));
    let state = GatewayState::new(service, auth);

    let served = start_server(&server_config, state, shutdown_signal()).await;

    if let Err(e) = store.shutdown().await {
        warn!(error = %e, "store shutdown failed");
    }
    served?;

    info!("nhislink serve shutdown complete");
    Ok(())
}

/// Resolves on SIGINT (Ctrl+C) or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT (Ctrl+C), initiating shutdown"),
                    _ = sigterm.recv() => info!("received SIGTERM, initiating shutdown"),
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await;
                info!("received SIGINT (Ctrl+C), initiating shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
        info!("received Ctrl+C, initiating shutdown");
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "nhislink={log_level},nhislink_fetch={log_level},nhislink_gateway={log_level},\
             nhislink_hyphen={log_level},nhislink_storage={log_level},warn"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
