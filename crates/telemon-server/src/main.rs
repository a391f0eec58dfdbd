use anyhow::{Context, Result};
use telemon_common::shutdown;
use telemon_server::app;
use telemon_server::backend;
use telemon_server::config::ServerConfig;
use telemon_server::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/server.toml".to_string());
    let config = ServerConfig::load(&config_path)?;

    let directive = format!("telemon={}", config.log_level.to_lowercase());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .init();

    let backend = backend::open(&config).await;

    let (trigger, shutdown) = shutdown::channel();
    let flusher = backend
        .file
        .clone()
        .filter(|file| !file.sync_on_write())
        .map(|file| tokio::spawn(file.run_periodic_flush(config.store_interval(), shutdown.clone())));

    let state = AppState::new(backend.store.clone(), config.sign_key());
    let app = app::build_http_app(state);

    let listener = tokio::net::TcpListener::bind(&config.address)
        .await
        .with_context(|| format!("failed to bind {}", config.address))?;
    tracing::info!(address = %config.address, signed = config.sign_key().is_some(), "telemon-server listening");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            match shutdown::wait_for_os_signal().await {
                Ok(signal) => tracing::info!(signal, "Shutting down gracefully"),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for shutdown signal");
                    std::future::pending::<()>().await;
                }
            }
        })
        .await;
    trigger.trigger();

    match flusher {
        Some(task) => {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Snapshot task failed");
            }
        }
        None => {
            if let Some(file) = &backend.file {
                if let Err(e) = file.flush().await {
                    tracing::error!(error = %e, "Final snapshot failed");
                }
            }
        }
    }

    result.context("HTTP server error")?;
    tracing::info!("telemon-server stopped");
    Ok(())
}
