use std::sync::Arc;

use tracing::info;

use murmur_db::Database;
use murmur_server::{Config, Murmur};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "murmur=debug,murmur_server=debug,murmur_gateway=debug,murmur_api=debug,tower_http=debug"
                    .into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);

    let Murmur { router, dispatcher } = murmur_server::build(db, &config)?;

    let addr = config.addr()?;
    info!("Murmur server listening on {}", addr);
    info!(
        "Lobby channel: {}, strict targets: {}",
        config.lobby, config.strict_targets
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let registry = dispatcher.registry().clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Upgraded sockets are not drained by axum, close them ourselves
            let closed = registry.close_all("server shutting down").await;
            info!("Closing {} gateway connections", closed);
        })
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("Could not install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
