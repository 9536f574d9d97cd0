//! roomcast Server - Main Entry Point

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rc_server::voice::{ActiveUserDirectory, PeerFactory, PeerRegistry, SignalingCoordinator};
use rc_server::ws::ControlRegistry;
use rc_server::{api, config, db, observability};
use tracing::info;

/// Grace period for in-flight work during shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize rustls crypto provider (required for WebRTC).
    // This must happen before any TLS/WebRTC operations.
    let _ =
        rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider());

    dotenvy::dotenv().ok();
    let config = Arc::new(config::Config::from_env()?);

    observability::init_tracing(&config.observability);
    let meter_provider = observability::init_metrics(&config.observability);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting roomcast server"
    );

    // Database
    let db_pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&db_pool).await?;

    // In-memory session state
    let control = Arc::new(ControlRegistry::new());
    let peers = Arc::new(PeerRegistry::new());
    let active = Arc::new(ActiveUserDirectory::new());

    let factory = Arc::new(PeerFactory::new(
        &config,
        control.clone(),
        peers.clone(),
        active.clone(),
    )?);

    let coordinator = Arc::new(SignalingCoordinator::new(
        control.clone(),
        peers.clone(),
        active.clone(),
        factory,
        Arc::new(db::PgUserStore::new(db_pool.clone())),
        Arc::new(db::PgChannelStore::new(db_pool.clone())),
    ));

    // Flush the hot-path RTP packet counter every 5 seconds
    let rtp_flush_handle = tokio::spawn(async {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            observability::flush_rtp_counter();
        }
    });

    let state = api::AppState {
        db: db_pool.clone(),
        config: config.clone(),
        control,
        coordinator,
        active,
    };

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Server listening");

    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
        info!("Received shutdown signal, initiating graceful shutdown...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("HTTP server stopped, cleaning up...");

    // Give dependent tasks (fan-out workers, session teardown) a bounded
    // window to observe cancellation and unwind.
    rtp_flush_handle.abort();
    let _ = tokio::time::timeout(SHUTDOWN_GRACE, rtp_flush_handle).await;
    observability::flush_rtp_counter();

    if let Some(provider) = meter_provider {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = %e, "Meter provider shutdown failed");
        }
    }

    db_pool.close().await;
    info!("Server shutdown complete");

    Ok(())
}
