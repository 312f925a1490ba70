mod audit;
mod config;
mod dto;
mod error;
mod routes;
mod state;

use std::sync::Arc;
use std::time::Duration;

use atlas_infra::{HetznerProvider, ServerService, Timeouts};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::audit::{AuditLogger, TracingSink};
use crate::config::AppConfig;
use crate::routes::api_router;
use crate::state::AppState;

const AUDIT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = AppConfig::from_env().expect("invalid configuration");

    // Init tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.environment.default_log_filter().into()),
        )
        .init();

    // Database
    let db = atlas_db::create_pool(&config.database_url)
        .await
        .expect("failed to connect to database");

    // Cloud provider
    let mut provider = HetznerProvider::new(&config.hcloud_token)
        .expect("failed to build Hetzner client")
        .with_location(config.hcloud_location.clone());
    if let Some(endpoint) = &config.hcloud_endpoint {
        provider = provider.with_endpoint(endpoint);
    }
    let servers = ServerService::new(
        Arc::new(provider),
        Timeouts {
            request: config.request_timeout,
            action: config.action_timeout,
        },
    );
    tracing::info!(provider = servers.provider_name(), "cloud provider ready");

    // Audit trail
    let (audit, audit_worker) =
        AuditLogger::spawn(config.audit_queue_capacity, Arc::new(TracingSink));

    let state = AppState { db, servers, audit };

    let app = api_router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .expect("failed to bind listener");

    tracing::info!(addr = %config.listen_addr, env = ?config.environment, "starting server API");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // The router (and every AuditLogger clone) is gone; let queued entries flush.
    if tokio::time::timeout(AUDIT_DRAIN_TIMEOUT, audit_worker).await.is_err() {
        tracing::warn!("audit queue not drained before shutdown");
    }
    tracing::info!("shut down");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
