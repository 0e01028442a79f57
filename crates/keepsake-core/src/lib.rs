//! Keepsake Core Library
//!
//! This crate provides the domain models, error types, configuration, and
//! constants shared across all Keepsake components.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::Config;
pub use error::AppError;
pub use models::{Asset, AssetKind, CaptureInfo, ConfigEntry, Visibility};
