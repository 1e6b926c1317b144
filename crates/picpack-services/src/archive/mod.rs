//! Streaming archive construction.
//!
//! [`bundle_items`] walks a job's media items in order, fetches each one and
//! appends it to a [`ZipStreamWriter`] feeding the upload pipe. Per-item
//! failures are recorded and skipped; one bad URL never aborts the job.

mod zipstream;

pub use zipstream::{ArchiveError, ZipStreamWriter, DEFAULT_ENTRY_SPOOL_BYTES};

use picpack_core::models::{ArchiveEntryResult, MediaItem};
use picpack_core::sanitize_entry_name;
use std::collections::HashSet;
use tokio::io::AsyncWrite;

use crate::fetch::MediaFetcher;

/// What happened to each item, plus the finished archive's size.
#[derive(Debug)]
pub struct BundleSummary {
    /// Per-item outcomes, in job item order.
    pub results: Vec<ArchiveEntryResult>,
    /// Total bytes of the finalized archive; 0 when nothing succeeded and
    /// the archive was not finalized.
    pub archive_bytes: u64,
}

impl BundleSummary {
    pub fn succeeded_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed_items(&self) -> Vec<ArchiveEntryResult> {
        self.results
            .iter()
            .filter(|r| !r.is_success())
            .cloned()
            .collect()
    }
}

/// Fetch every item and stream it into a zip archive written to `writer`.
///
/// Entries are appended in item order. The archive is only finalized when at
/// least one entry succeeded; with zero successes the writer is dropped
/// unfinished and the caller is expected to cancel the consuming side.
#[tracing::instrument(skip(fetcher, items, writer), fields(item_count = items.len()))]
pub async fn bundle_items<W>(
    fetcher: &dyn MediaFetcher,
    items: &[MediaItem],
    writer: W,
    compression_level: u32,
    spool_limit: usize,
) -> Result<BundleSummary, ArchiveError>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut zip = ZipStreamWriter::new(writer, compression_level).with_spool_limit(spool_limit);
    let mut results = Vec::with_capacity(items.len());
    let mut used_names: HashSet<String> = HashSet::new();

    for (index, item) in items.iter().enumerate() {
        let fallback = format!("item_{}", index + 1);
        let mut entry_name = sanitize_entry_name(&item.file_name, &fallback);
        if !used_names.insert(entry_name.clone()) {
            entry_name = format!("{}_{}", index + 1, entry_name);
            used_names.insert(entry_name.clone());
        }

        let media = match fetcher.fetch(&item.source_url).await {
            Ok(media) => media,
            Err(e) => {
                tracing::warn!(
                    url = %item.source_url,
                    file_name = %item.file_name,
                    error = %e,
                    "Skipping item: fetch failed"
                );
                results.push(ArchiveEntryResult::Failed {
                    file_name: item.file_name.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        match zip.append_entry(&entry_name, media.stream).await {
            Ok(bytes_written) => {
                if let Some(declared) = item.declared_size {
                    if declared != bytes_written {
                        tracing::debug!(
                            file_name = %item.file_name,
                            declared_size = declared,
                            actual_size = bytes_written,
                            "Declared size disagrees with fetched stream"
                        );
                    }
                }
                results.push(ArchiveEntryResult::Succeeded {
                    file_name: item.file_name.clone(),
                    bytes_written,
                });
            }
            Err(ArchiveError::EntryAborted { reason, .. }) => {
                tracing::warn!(
                    file_name = %item.file_name,
                    error = %reason,
                    "Skipping item: source stream failed mid-entry"
                );
                results.push(ArchiveEntryResult::Failed {
                    file_name: item.file_name.clone(),
                    reason,
                });
            }
            // Sink failure: the upload side of the pipe is gone.
            Err(e) => return Err(e),
        }
    }

    let succeeded = results.iter().filter(|r| r.is_success()).count();
    let archive_bytes = if succeeded > 0 {
        zip.finish().await?
    } else {
        drop(zip);
        0
    };

    tracing::info!(
        succeeded,
        failed = results.len() - succeeded,
        archive_bytes,
        "Bundle pass finished"
    );

    Ok(BundleSummary {
        results,
        archive_bytes,
    })
}
