//! Domain models for uploaded assets and configuration entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

/// Kind of a stored asset. Only these categories create database rows;
/// other upload categories (avatar, cover) return a bare URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "asset_kind", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Video,
}

impl FromStr for AssetKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" => Ok(AssetKind::Image),
            "video" => Ok(AssetKind::Video),
            _ => Err(anyhow::anyhow!("Invalid asset kind: {}", s)),
        }
    }
}

impl Display for AssetKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AssetKind::Image => write!(f, "image"),
            AssetKind::Video => write!(f, "video"),
        }
    }
}

/// Visibility of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "visibility", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

/// Embedded capture metadata extracted from an image's EXIF block.
/// Every field is independently optional; absence of one never blocks
/// extraction of the others.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureInfo {
    pub make: Option<String>,
    pub model: Option<String>,
    pub exposure_time: Option<String>,
    pub f_number: Option<String>,
    pub iso: Option<String>,
    pub focal_length: Option<String>,
    pub lens_model: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub taken_at: Option<DateTime<Utc>>,
}

impl CaptureInfo {
    /// True when no field was extracted at all.
    pub fn is_empty(&self) -> bool {
        self.make.is_none()
            && self.model.is_none()
            && self.exposure_time.is_none()
            && self.f_number.is_none()
            && self.iso.is_none()
            && self.focal_length.is_none()
            && self.lens_model.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
            && self.taken_at.is_none()
    }
}

/// One uploaded image or video.
///
/// The primary `url` is assigned exactly once at creation and never changes.
/// `derived_url`, `capture`, and `duration_secs` stay null until the
/// enrichment stage sets them, at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    /// UUIDv7: globally unique and monotonically sortable by creation time.
    pub id: Uuid,
    pub user_id: i64,
    pub album_id: Option<i64>,
    pub kind: AssetKind,
    /// Primary artifact URL. Immutable after creation.
    pub url: String,
    /// Thumbnail URL (images) or cover-frame URL (video). Write-once by enrichment.
    pub derived_url: Option<String>,
    /// Original display name as uploaded.
    pub name: String,
    pub size: i64,
    /// File extension without the dot, e.g. "jpg".
    pub kind_tag: String,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Images only.
    pub capture: Option<CaptureInfo>,
    /// Video only, in seconds.
    pub duration_secs: Option<i64>,
}

/// Database row for the assets table. Capture metadata is stored as JSONB.
#[derive(Debug)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct AssetRow {
    pub id: Uuid,
    pub user_id: i64,
    pub album_id: Option<i64>,
    pub kind: AssetKind,
    pub url: String,
    pub derived_url: Option<String>,
    pub name: String,
    pub size: i64,
    pub kind_tag: String,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub capture: Option<serde_json::Value>,
    pub duration_secs: Option<i64>,
}

impl AssetRow {
    /// Build the domain model from this row.
    pub fn into_asset(self) -> Asset {
        let capture = self
            .capture
            .and_then(|v| serde_json::from_value::<CaptureInfo>(v).ok());
        Asset {
            id: self.id,
            user_id: self.user_id,
            album_id: self.album_id,
            kind: self.kind,
            url: self.url,
            derived_url: self.derived_url,
            name: self.name,
            size: self.size,
            kind_tag: self.kind_tag,
            visibility: self.visibility,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted: self.deleted,
            deleted_at: self.deleted_at,
            capture,
            duration_secs: self.duration_secs,
        }
    }
}

/// A `(key, optional owner)` -> value configuration mapping.
/// `user_id` of `None` is the system default for that key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct ConfigEntry {
    pub user_id: Option<i64>,
    pub config_key: String,
    pub config_value: String,
}
