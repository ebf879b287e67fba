use anyhow::{Context, Result};
use axum::Router;
use std::{fs, io::ErrorKind};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;
    tracing::info!("Starting s3-localfs with config: {:?}", cfg);

    // --- Ensure root directory exists ---
    fs::create_dir_all(&cfg.root)
        .with_context(|| format!("creating root directory {}", cfg.root.display()))?;

    // --- Initialize core service ---
    let storage = services::storage_service::StorageService::new(cfg.root.clone());

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(storage);

    // --- Start server ---
    #[cfg(unix)]
    if let Some(socket) = &cfg.unix_socket {
        if socket.exists() {
            fs::remove_file(socket)
                .with_context(|| format!("removing stale socket {}", socket.display()))?;
        }
        let listener = tokio::net::UnixListener::bind(socket)
            .with_context(|| format!("binding unix socket {}", socket.display()))?;
        tracing::info!("Server listening on unix:{}", socket.display());
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        return Ok(());
    }

    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err).with_context(|| format!("binding {addr}")),
    };

    let url = format!("http://{}", listener.local_addr()?);
    tracing::info!("Server listening on {}", url);
    tracing::info!("Try: aws --endpoint-url={} s3 ls s3://", url);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
