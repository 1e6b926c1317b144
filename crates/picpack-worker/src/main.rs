use anyhow::{Context, Result};
use picpack_core::{RetryPolicy, WorkerConfig};
use picpack_services::{HttpMediaFetcher, MediaFetcher, NotificationDispatcher};
use picpack_storage::create_storage;
use picpack_worker::{
    health, telemetry, IdleShutdown, JobProcessor, ProcessorConfig, Runner, SqsJobSource,
};
use std::sync::Arc;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env()?;
    telemetry::init_telemetry();

    let storage = create_storage(&config)
        .await
        .context("Failed to initialize storage backend")?;
    let fetcher: Arc<dyn MediaFetcher> = Arc::new(HttpMediaFetcher::new(
        config.fetch_timeout(),
        config.fetch_max_redirects,
    )?);
    let notifier =
        NotificationDispatcher::new(config.notify_endpoints.clone(), config.notify_timeout())
            .context("Failed to initialize notification dispatcher")?;
    let source = Arc::new(
        SqsJobSource::new(&config)
            .await
            .context("Failed to initialize SQS job source")?,
    );

    let supervisor = IdleShutdown::new(config.idle_threshold());
    let (shutdown_tx, shutdown_rx) = mpsc::channel(4);
    supervisor.spawn_watchdog(config.idle_check_interval(), shutdown_tx.clone());
    spawn_signal_handler(shutdown_tx);

    let health_task = tokio::spawn(health::serve(supervisor.clone(), config.health_port));

    let processor = JobProcessor::new(fetcher, storage, ProcessorConfig::from_worker(&config));
    let runner = Runner::new(
        source,
        processor,
        notifier,
        supervisor,
        RetryPolicy::unbounded(config.receive_retry_delay()),
    );

    tracing::info!(
        queue_url = %config.queue_url,
        storage_backend = %config.storage_backend,
        idle_shutdown_secs = config.idle_shutdown_secs,
        health_port = config.health_port,
        "picpack worker started"
    );

    runner.run(shutdown_rx).await;

    health_task.abort();
    tracing::info!("picpack worker exited");
    Ok(())
}

/// Forward SIGINT/SIGTERM into the worker's shutdown channel so an
/// in-flight job drains before the process exits.
fn spawn_signal_handler(shutdown_tx: mpsc::Sender<()>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C signal");
            },
            _ = terminate => {
                tracing::info!("Received terminate signal");
            },
        }

        let _ = shutdown_tx.send(()).await;
    });
}
