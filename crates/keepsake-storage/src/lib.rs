//! Keepsake Storage Library
//!
//! Physical object storage for uploaded media. One `Storage` trait, three
//! backends: local disk, an S3-compatible object store, and Tencent COS
//! (driven through its S3-compatible endpoint). The active backend is chosen
//! per call by the storage selector in `keepsake-services`, so a
//! configuration change takes effect on the next upload without a restart.
//!
//! # URL contract
//!
//! Every backend's `upload` returns a directly usable public URL, and every
//! backend's `delete` is a no-op for URLs that do not belong to its own
//! namespace and for objects that no longer exist.

pub mod cos;
pub mod local;
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use cos::{CosSettings, CosStorage};
pub use local::LocalStorage;
pub use s3::{S3Settings, S3Storage};
pub use traits::{Storage, StorageError, StorageKind, StorageResult};
