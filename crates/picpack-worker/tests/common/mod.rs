//! Shared fakes for worker integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use futures::StreamExt;
use picpack_core::{RetryPolicy, StorageBackend};
use picpack_services::{FetchError, MediaFetcher, MediaStream};
use picpack_storage::{ObjectStorage, StorageError, StorageResult, UploadPart};
use picpack_worker::ProcessorConfig;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// URL → bytes fetcher; unknown URLs answer 404.
#[derive(Default)]
pub struct FakeFetcher {
    files: HashMap<String, Vec<u8>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, url: &str, data: &[u8]) -> Self {
        self.files.insert(url.to_string(), data.to_vec());
        self
    }
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<MediaStream, FetchError> {
        match self.files.get(url) {
            Some(data) => {
                let chunks: Vec<Result<Bytes, FetchError>> = data
                    .chunks(11)
                    .map(|c| Ok(Bytes::copy_from_slice(c)))
                    .collect();
                Ok(MediaStream {
                    content_length: Some(data.len() as u64),
                    stream: stream::iter(chunks).boxed(),
                })
            }
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// In-memory object storage recording the multipart protocol.
#[derive(Default)]
pub struct FakeStorage {
    pub parts: Mutex<Vec<(i32, Bytes)>>,
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
    pub created: AtomicBool,
    pub aborted: AtomicBool,
    pub failing_part: Option<i32>,
    pub attempts_on_failing_part: AtomicU32,
}

impl FakeStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(part: i32) -> Self {
        Self {
            failing_part: Some(part),
            ..Default::default()
        }
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn sole_object(&self) -> Vec<u8> {
        let objects = self.objects.lock().unwrap();
        assert_eq!(objects.len(), 1, "expected exactly one stored object");
        objects.values().next().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn create_multipart_upload(
        &self,
        _key: &str,
        _content_type: &str,
    ) -> StorageResult<String> {
        self.created.store(true, Ordering::SeqCst);
        Ok("fake-upload".to_string())
    }

    async fn upload_part(
        &self,
        _key: &str,
        _upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> StorageResult<String> {
        if self.failing_part == Some(part_number) {
            self.attempts_on_failing_part.fetch_add(1, Ordering::SeqCst);
            return Err(StorageError::UploadFailed("injected failure".into()));
        }
        self.parts.lock().unwrap().push((part_number, data));
        Ok(format!("etag-{}", part_number))
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        _upload_id: &str,
        parts: &[UploadPart],
    ) -> StorageResult<()> {
        let staged = self.parts.lock().unwrap();
        let mut object = Vec::new();
        for part in parts {
            let data = staged
                .iter()
                .find(|(n, _)| *n == part.part_number)
                .map(|(_, d)| d.clone())
                .ok_or_else(|| {
                    StorageError::InvalidParts(format!("part {} not staged", part.part_number))
                })?;
            object.extend_from_slice(&data);
        }
        self.objects.lock().unwrap().insert(key.to_string(), object);
        Ok(())
    }

    async fn abort_multipart_upload(&self, _key: &str, _upload_id: &str) -> StorageResult<()> {
        self.aborted.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn presigned_get_url(&self, key: &str, _expires_in: Duration) -> StorageResult<String> {
        Ok(format!("https://signed.example.com/{}", key))
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://public.example.com/{}", key)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

pub fn test_processor_config() -> ProcessorConfig {
    ProcessorConfig {
        part_size: 1024,
        part_retry: RetryPolicy::bounded(3, Duration::from_millis(1)),
        compression_level: 6,
        pipe_capacity: 4096,
        download_url_expiry: Duration::from_secs(60),
    }
}
