//! Application-wide constants.

/// User id of the administrative account. Exempt from upload rate limits.
pub const ADMIN_USER_ID: i64 = 1;

/// Public mount prefix under which local-disk assets are served.
pub const UPLOAD_ROOT_PATH: &str = "/uploads";

/// Suffix inserted immediately before the file extension for derived
/// artifacts (image thumbnails, video cover frames).
pub const THUMBNAIL_SUFFIX: &str = "_thumb";

/// Retention window for soft-deleted assets before the scheduled purge
/// removes them permanently.
pub const RECYCLE_RETENTION_DAYS: i64 = 30;

/// Fallback ceilings used when no configuration entry exists.
pub const DEFAULT_MAX_IMAGE_BYTES: i64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_VIDEO_BYTES: i64 = 50 * 1024 * 1024;
pub const DEFAULT_MAX_STORAGE_BYTES: i64 = 100 * 1024 * 1024;

/// Fallback extension allow-lists.
pub const DEFAULT_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];
pub const DEFAULT_VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv"];

/// Keys recognized by the config resolver. User-scoped unless noted.
pub mod config_key {
    /// Max cumulative stored bytes per user.
    pub const MAX_STORAGE_SIZE: &str = "max_storage_size";
    /// Max single-file bytes.
    pub const MAX_FILE_SIZE: &str = "max_file_size";
    /// Comma-separated allowed extensions (dotted or bare, case-insensitive).
    pub const ALLOWED_EXTENSIONS: &str = "allowed_extensions";
    /// Physical root directory for the local-disk backend (system scope).
    pub const UPLOAD_PATH: &str = "upload_path";
    /// Optional per-user sub-directory prepended to storage paths.
    pub const USER_UPLOAD_DIR: &str = "user_upload_dir";
    /// Active storage backend: LOCAL | S3 | COS (system scope).
    pub const STORAGE_TYPE: &str = "storage_type";

    pub const S3_ENDPOINT: &str = "s3_endpoint";
    pub const S3_ACCESS_KEY: &str = "s3_access_key";
    pub const S3_SECRET_KEY: &str = "s3_secret_key";
    pub const S3_BUCKET: &str = "s3_bucket";
    pub const S3_DOMAIN: &str = "s3_domain";

    pub const COS_SECRET_ID: &str = "cos_secret_id";
    pub const COS_SECRET_KEY: &str = "cos_secret_key";
    pub const COS_REGION: &str = "cos_region";
    pub const COS_BUCKET: &str = "cos_bucket";
}
