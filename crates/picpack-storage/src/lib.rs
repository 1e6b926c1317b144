//! Picpack Storage Library
//!
//! Object-storage abstraction and the multipart upload coordinator. The
//! [`ObjectStorage`] trait exposes the multipart protocol (create, part,
//! complete, abort) plus download-link generation; [`MultipartUploader`]
//! drives that protocol from a byte stream produced concurrently by the
//! archive builder.

pub mod factory;
pub(crate) mod keys;
pub mod local;
pub mod multipart;
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use keys::archive_key;
pub use local::LocalStorage;
pub use multipart::{CompletedUpload, MultipartConfig, MultipartUploader};
pub use picpack_core::StorageBackend;
pub use s3::S3Storage;
pub use traits::{ObjectStorage, StorageError, StorageResult, UploadPart};
