//! Job source adapter over SQS.
//!
//! One message is pulled at a time with long polling; the receipt handle is
//! owned by the current job and the message is only deleted once the job
//! reaches a terminal state. Receive failures are the caller's to retry:
//! they signal infrastructure trouble, not job validity, and the poll loop
//! retries them forever at a fixed delay.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::Client;
use picpack_core::WorkerConfig;

/// A raw queue message, held until the job terminates.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub body: String,
    pub receipt_handle: String,
}

/// Source of bundle jobs, fakeable in tests.
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Block up to the long-poll window for one message. `None` means the
    /// window elapsed with nothing to do, so the caller can re-check idle
    /// state.
    async fn receive(&self) -> Result<Option<ReceivedMessage>>;

    /// Delete the message. Only valid after the job reached a terminal
    /// outcome (success or unrecoverable failure), never on transient retry.
    async fn acknowledge(&self, message: &ReceivedMessage) -> Result<()>;
}

/// SQS-backed job source.
pub struct SqsJobSource {
    client: Client,
    queue_url: String,
    wait_time_secs: i32,
}

impl SqsJobSource {
    pub async fn new(config: &WorkerConfig) -> Result<Self> {
        let region_provider = match &config.aws_region {
            Some(region) => {
                RegionProviderChain::first_try(aws_config::Region::new(region.clone()))
            }
            None => RegionProviderChain::default_provider(),
        };

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        Ok(Self {
            client: Client::new(&aws_config),
            queue_url: config.queue_url.clone(),
            wait_time_secs: config.queue_wait_time_secs,
        })
    }
}

#[async_trait]
impl JobSource for SqsJobSource {
    async fn receive(&self) -> Result<Option<ReceivedMessage>> {
        let response = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(1)
            .wait_time_seconds(self.wait_time_secs)
            .send()
            .await
            .context("SQS receive_message failed")?;

        let Some(message) = response.messages().first() else {
            tracing::trace!("Long poll elapsed with no messages");
            return Ok(None);
        };

        let body = message
            .body()
            .context("SQS message has no body")?
            .to_string();
        let receipt_handle = message
            .receipt_handle()
            .context("SQS message has no receipt handle")?
            .to_string();

        tracing::debug!(
            message_id = message.message_id().unwrap_or("unknown"),
            "Received queue message"
        );

        Ok(Some(ReceivedMessage {
            body,
            receipt_handle,
        }))
    }

    async fn acknowledge(&self, message: &ReceivedMessage) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(&message.receipt_handle)
            .send()
            .await
            .context("SQS delete_message failed")?;

        tracing::debug!("Queue message deleted");
        Ok(())
    }
}
