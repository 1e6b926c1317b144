//! Shared constants

/// Minimum size of a multipart upload part accepted by object storage.
/// Every part except the last must be at least this large.
pub const MIN_PART_SIZE_BYTES: usize = 5 * 1024 * 1024;

/// Default size at which the upload coordinator flushes a part.
pub const DEFAULT_PART_SIZE_BYTES: usize = 8 * 1024 * 1024;

/// Content type of the archives this worker produces.
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";
