//! Storage abstraction trait
//!
//! This module defines the `Storage` trait that all storage backends must
//! implement, plus the shared error type.

use async_trait::async_trait;
use std::fmt::{Display, Formatter, Result as FmtResult};
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Invalid storage path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Registered storage backend kinds. Parsed case-insensitively from the
/// `storage_type` configuration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Local,
    S3,
    Cos,
}

impl StorageKind {
    /// Map a configured value to a kind. Unknown values return `None` so the
    /// selector can fall back to the local-disk backend.
    pub fn parse(s: &str) -> Option<StorageKind> {
        match s.trim().to_uppercase().as_str() {
            "LOCAL" => Some(StorageKind::Local),
            "S3" => Some(StorageKind::S3),
            "COS" | "TENCENT" => Some(StorageKind::Cos),
            _ => None,
        }
    }
}

impl Display for StorageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageKind::Local => write!(f, "local"),
            StorageKind::S3 => write!(f, "s3"),
            StorageKind::Cos => write!(f, "cos"),
        }
    }
}

/// Storage abstraction trait
///
/// Relative paths use `/` separators and must not contain traversal
/// sequences; the upload coordinator builds them. Re-uploading to the same
/// relative path overwrites the previous object.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Upload file contents to `relative_path`, creating any intermediate
    /// directories or namespaces, and return the publicly resolvable URL.
    async fn upload(&self, data: Vec<u8>, relative_path: &str) -> StorageResult<String>;

    /// Delete a previously stored object given its URL. A URL outside this
    /// backend's namespace, or an object that no longer exists, is a no-op.
    async fn delete(&self, url: &str) -> StorageResult<()>;

    /// The backend kind, for logging.
    fn kind(&self) -> StorageKind;
}

/// Strip a backend's public prefix from a URL and return the object key.
/// The prefix must be followed by `/`, so `/uploadsfoo/x.jpg` is not under
/// `/uploads` and `https://media.example.com.evil/key` is not under
/// `https://media.example.com`. `None` means the URL belongs to another
/// namespace.
pub(crate) fn strip_url_prefix<'a>(url: &'a str, prefix: &str) -> Option<&'a str> {
    url.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
}

/// Reject relative paths that could escape a backend's namespace.
pub(crate) fn validate_relative_path(relative_path: &str) -> StorageResult<()> {
    if relative_path.is_empty()
        || relative_path.starts_with('/')
        || relative_path.contains("..")
        || relative_path.contains('\\')
    {
        return Err(StorageError::InvalidPath(relative_path.to_string()));
    }
    Ok(())
}
