use anyhow::Result;
use std::sync::Arc;
use telemon_agent::pipeline::{self, PipelineSettings, Sampler};
use telemon_agent::{AgentConfig, MetricsClient};
use telemon_common::shutdown;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("telemon=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/agent.toml".to_string());
    let config = AgentConfig::load(&config_path)?;

    let client = MetricsClient::new(config.updates_url(), config.key.clone());
    tracing::info!(
        server = %client.url(),
        signed = config.key.is_some(),
        host_metrics = config.host_metrics,
        "telemon-agent starting"
    );

    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(async move {
        match shutdown::wait_for_os_signal().await {
            Ok(signal) => tracing::info!(signal, "Shutting down gracefully"),
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        }
        trigger.trigger();
    });

    let settings = PipelineSettings {
        poll_interval: config.poll_interval(),
        report_interval: config.report_interval(),
        workers: config.rate_limit,
    };
    let sampler = Sampler::new(telemon_collector::default_collectors(config.host_metrics));
    pipeline::run(settings, sampler, Arc::new(client), shutdown).await;

    tracing::info!("telemon-agent stopped");
    Ok(())
}
