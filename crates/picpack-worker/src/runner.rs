//! The worker's poll loop.
//!
//! receive → mark busy → process → notify → acknowledge → mark idle,
//! forever, one job at a time. Queue receive failures back off a fixed
//! delay and retry indefinitely; polling is the worker's reason to exist.
//! A shutdown signal (idle watchdog or SIGINT/SIGTERM) is honored between
//! jobs, never mid-job, so the in-flight job always drains first.

use picpack_core::models::Job;
use picpack_core::RetryPolicy;
use picpack_services::NotificationDispatcher;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::processor::JobProcessor;
use crate::queue::{JobSource, ReceivedMessage};
use crate::supervisor::IdleShutdown;

pub struct Runner {
    source: Arc<dyn JobSource>,
    processor: JobProcessor,
    notifier: NotificationDispatcher,
    supervisor: IdleShutdown,
    /// Unbounded: queue availability problems are waited out, not given up on.
    receive_retry: RetryPolicy,
}

impl Runner {
    pub fn new(
        source: Arc<dyn JobSource>,
        processor: JobProcessor,
        notifier: NotificationDispatcher,
        supervisor: IdleShutdown,
        receive_retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            processor,
            notifier,
            supervisor,
            receive_retry,
        }
    }

    pub async fn run(self, mut shutdown_rx: mpsc::Receiver<()>) {
        tracing::info!("Worker loop started");
        let mut receive_failures: u32 = 0;
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Shutdown signal received, stopping worker loop");
                    break;
                }
                received = self.source.receive() => match received {
                    Ok(Some(message)) => {
                        receive_failures = 0;
                        self.handle_message(message).await;
                    }
                    Ok(None) => {
                        // Empty long poll; loop around and re-check shutdown.
                        receive_failures = 0;
                    }
                    Err(e) => {
                        receive_failures += 1;
                        let delay = self.receive_retry.delay_for(receive_failures);
                        tracing::error!(
                            error = %e,
                            consecutive_failures = receive_failures,
                            retry_delay_secs = delay.as_secs(),
                            "Queue receive failed, backing off"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        tracing::info!(
            jobs_processed = self.supervisor.snapshot().jobs_processed,
            "Worker loop stopped"
        );
    }

    async fn handle_message(&self, message: ReceivedMessage) {
        self.supervisor.mark_busy();

        match Job::from_message(&message.body) {
            Ok(job) => {
                let outcome = self.processor.process(&job).await;
                let delivered = self.notifier.notify(&outcome).await;
                if !delivered {
                    // Partial-success condition: the archive work stands, so
                    // the message is still acknowledged below.
                    tracing::error!(
                        event_id = %job.event_id,
                        status = %outcome.status,
                        "Outcome notification undeliverable"
                    );
                }
                if let Err(e) = self.source.acknowledge(&message).await {
                    tracing::error!(
                        error = %e,
                        event_id = %job.event_id,
                        "Failed to delete queue message; it may be redelivered"
                    );
                }
                self.supervisor.record_job();
            }
            Err(e) => {
                // Redelivery would fail identically; drop the message.
                tracing::error!(error = %e, "Dropping malformed queue message");
                if let Err(e) = self.source.acknowledge(&message).await {
                    tracing::error!(error = %e, "Failed to delete malformed queue message");
                }
            }
        }

        self.supervisor.mark_idle();
    }
}
