//! Configuration module
//!
//! All configuration comes from environment variables, loaded once at
//! startup. Sensible defaults are provided for everything except the queue
//! URL and the storage backend's required settings, which have no safe
//! default.

use std::env;
use std::time::Duration;

use crate::constants::{DEFAULT_PART_SIZE_BYTES, MIN_PART_SIZE_BYTES};
use crate::storage_types::StorageBackend;

const DEFAULT_QUEUE_WAIT_TIME_SECS: i32 = 20;
const DEFAULT_RECEIVE_RETRY_DELAY_SECS: u64 = 5;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 60;
const DEFAULT_FETCH_MAX_REDIRECTS: usize = 5;
const DEFAULT_COMPRESSION_LEVEL: u32 = 6;
const DEFAULT_PART_UPLOAD_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_PIPE_CAPACITY_BYTES: usize = 256 * 1024;
const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 30;
const DEFAULT_IDLE_SHUTDOWN_SECS: u64 = 600;
const DEFAULT_IDLE_CHECK_INTERVAL_SECS: u64 = 60;
const DEFAULT_HEALTH_PORT: u16 = 8080;
const DEFAULT_DOWNLOAD_URL_EXPIRY_SECS: u64 = 7 * 24 * 3600;

/// Worker configuration
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    // Queue
    pub queue_url: String,
    pub queue_wait_time_secs: i32,
    pub receive_retry_delay_secs: u64,
    // Storage
    pub storage_backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers
    pub aws_region: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    pub download_url_expiry_secs: u64,
    // Upload
    pub part_size_bytes: usize,
    pub part_upload_max_attempts: u32,
    pub pipe_capacity_bytes: usize,
    // Archive
    pub compression_level: u32,
    // Fetch
    pub fetch_timeout_secs: u64,
    pub fetch_max_redirects: usize,
    // Notification
    pub notify_endpoints: Vec<String>,
    pub notify_timeout_secs: u64,
    // Lifecycle
    pub idle_shutdown_secs: u64,
    pub idle_check_interval_secs: u64,
    pub health_port: u16,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let queue_url = env::var("QUEUE_URL")
            .map_err(|_| anyhow::anyhow!("QUEUE_URL must be set"))?;

        let storage_backend = env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "s3".to_string())
            .parse::<StorageBackend>()?;

        let notify_endpoints = env::var("NOTIFY_WEBHOOK_URLS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let config = Self {
            queue_url,
            queue_wait_time_secs: env_parse("QUEUE_WAIT_TIME_SECS", DEFAULT_QUEUE_WAIT_TIME_SECS),
            receive_retry_delay_secs: env_parse(
                "RECEIVE_RETRY_DELAY_SECS",
                DEFAULT_RECEIVE_RETRY_DELAY_SECS,
            ),
            storage_backend,
            s3_bucket: env::var("S3_BUCKET").ok(),
            s3_region: env::var("S3_REGION").ok(),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            aws_region: env::var("AWS_REGION").ok(),
            local_storage_path: env::var("LOCAL_STORAGE_PATH").ok(),
            local_storage_base_url: env::var("LOCAL_STORAGE_BASE_URL").ok(),
            download_url_expiry_secs: env_parse(
                "DOWNLOAD_URL_EXPIRY_SECS",
                DEFAULT_DOWNLOAD_URL_EXPIRY_SECS,
            ),
            part_size_bytes: env_parse("PART_SIZE_BYTES", DEFAULT_PART_SIZE_BYTES),
            part_upload_max_attempts: env_parse(
                "PART_UPLOAD_MAX_ATTEMPTS",
                DEFAULT_PART_UPLOAD_MAX_ATTEMPTS,
            ),
            pipe_capacity_bytes: env_parse("PIPE_CAPACITY_BYTES", DEFAULT_PIPE_CAPACITY_BYTES),
            compression_level: env_parse("COMPRESSION_LEVEL", DEFAULT_COMPRESSION_LEVEL),
            fetch_timeout_secs: env_parse("FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS),
            fetch_max_redirects: env_parse("FETCH_MAX_REDIRECTS", DEFAULT_FETCH_MAX_REDIRECTS),
            notify_endpoints,
            notify_timeout_secs: env_parse("NOTIFY_TIMEOUT_SECS", DEFAULT_NOTIFY_TIMEOUT_SECS),
            idle_shutdown_secs: env_parse("IDLE_SHUTDOWN_SECS", DEFAULT_IDLE_SHUTDOWN_SECS),
            idle_check_interval_secs: env_parse(
                "IDLE_CHECK_INTERVAL_SECS",
                DEFAULT_IDLE_CHECK_INTERVAL_SECS,
            ),
            health_port: env_parse("HEALTH_PORT", DEFAULT_HEALTH_PORT),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.part_size_bytes < MIN_PART_SIZE_BYTES {
            anyhow::bail!(
                "PART_SIZE_BYTES must be at least {} (got {})",
                MIN_PART_SIZE_BYTES,
                self.part_size_bytes
            );
        }
        if self.compression_level > 9 {
            anyhow::bail!(
                "COMPRESSION_LEVEL must be 0-9 (got {})",
                self.compression_level
            );
        }
        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    anyhow::bail!("S3_BUCKET must be set for the s3 storage backend");
                }
                if self.s3_region.is_none() && self.aws_region.is_none() {
                    anyhow::bail!("S3_REGION or AWS_REGION must be set for the s3 storage backend");
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    anyhow::bail!("LOCAL_STORAGE_PATH must be set for the local storage backend");
                }
            }
        }
        if self.fetch_max_redirects == 0 {
            anyhow::bail!("FETCH_MAX_REDIRECTS must be at least 1");
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }

    pub fn receive_retry_delay(&self) -> Duration {
        Duration::from_secs(self.receive_retry_delay_secs)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_shutdown_secs)
    }

    pub fn idle_check_interval(&self) -> Duration {
        Duration::from_secs(self.idle_check_interval_secs)
    }

    pub fn download_url_expiry(&self) -> Duration {
        Duration::from_secs(self.download_url_expiry_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
