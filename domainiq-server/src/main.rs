use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinSet;

use domainiq_server::config::Config;
use domainiq_server::metrics::Metrics;
use domainiq_server::queue;
use domainiq_server::transport::{Transport, http::HttpTransport};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration from environment variables and CLI arguments
    let config = Config::from_env_and_args()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("domainiq={}", config.log_level).parse()?)
                .add_directive(format!("domainiq_server={}", config.log_level).parse()?),
        )
        .init();

    let analysis_queue = queue::create_analysis_queue(&config)?;
    let metrics = Arc::new(Metrics::new());

    let mut transport_tasks = JoinSet::new();

    if let Some(http_config) = &config.transports.http {
        let queue_handle = analysis_queue.clone();
        let transport = HttpTransport::new(&http_config.host, http_config.port, metrics.clone())?;
        let host = http_config.host.clone();
        let port = http_config.port;

        transport_tasks.spawn(async move {
            tracing::info!("Starting HTTP transport on {}:{}", host, port);
            transport.start(queue_handle).await
        });
    }

    tracing::info!(
        per_window_limit = config.queue.per_window_limit,
        window_secs = config.queue.window_secs,
        min_interval_ms = config.queue.min_interval_ms,
        reset_schedule = ?config.queue.reset_schedule,
        offline = config.provider.api_key.is_none(),
        "DomainIQ server started"
    );

    // Transports run until they fail
    while let Some(result) = transport_tasks.join_next().await {
        match result {
            Ok(Ok(())) => {
                tracing::info!("Transport task completed successfully");
            }
            Ok(Err(e)) => {
                tracing::error!("Transport task failed: {}", e);
                return Err(e);
            }
            Err(e) => {
                tracing::error!("Transport task panicked: {}", e);
                return Err(anyhow::anyhow!("Transport task panicked"));
            }
        }
    }

    Ok(())
}
