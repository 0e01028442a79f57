//! Image enrichment: thumbnail rendering and EXIF capture metadata.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use exif::{Exif, In, Tag, Value};
use image::codecs::jpeg::JpegEncoder;
use image::{GenericImageView, ImageReader};
use keepsake_core::constants::THUMBNAIL_SUFFIX;
use keepsake_core::models::CaptureInfo;
use std::io::Cursor;

/// Thumbnails fit inside this square, aspect ratio preserved.
const THUMBNAIL_MAX_DIM: u32 = 400;

/// JPEG quality for thumbnails, on the encoder's 1-100 scale.
const THUMBNAIL_QUALITY: u8 = 80;

/// Render a JPEG thumbnail no larger than 400x400 from any decodable image.
pub fn make_thumbnail(data: &[u8]) -> Result<Vec<u8>> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .context("Failed to sniff image format")?;
    let img = reader.decode().context("Failed to decode image")?;

    // An image already inside the box is re-encoded as-is; `thumbnail`
    // alone would upscale it.
    let img = if img.width() > THUMBNAIL_MAX_DIM || img.height() > THUMBNAIL_MAX_DIM {
        img.thumbnail(THUMBNAIL_MAX_DIM, THUMBNAIL_MAX_DIM)
    } else {
        img
    };

    // JPEG has no alpha channel; flatten before encoding.
    let thumb = img.to_rgb8();

    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, THUMBNAIL_QUALITY);
    thumb
        .write_with_encoder(encoder)
        .context("Failed to encode thumbnail")?;

    Ok(out)
}

/// Derive the thumbnail file name from the original: `a/b/photo.jpg`
/// becomes `a/b/photo_thumb.jpg`. A name without an extension gets the
/// suffix appended.
pub fn derived_file_name(path: &str) -> String {
    match path.rfind('.') {
        // A dot inside the last path segment is an extension separator;
        // one before it belongs to a directory name.
        Some(idx) if !path[idx..].contains('/') => {
            format!("{}{}{}", &path[..idx], THUMBNAIL_SUFFIX, &path[idx..])
        }
        _ => format!("{}{}", path, THUMBNAIL_SUFFIX),
    }
}

/// Extract capture metadata from an image's EXIF block.
///
/// Fields are independent: a missing or malformed tag leaves its field
/// `None` without affecting the others. Images without an EXIF block
/// produce an error, which callers treat the same as an empty result.
pub fn extract_capture_info(data: &[u8]) -> Result<CaptureInfo> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(data))
        .map_err(|e| anyhow!("No EXIF data: {}", e))?;

    Ok(CaptureInfo {
        make: ascii_field(&exif, Tag::Make),
        model: ascii_field(&exif, Tag::Model),
        exposure_time: display_field(&exif, Tag::ExposureTime),
        f_number: display_field(&exif, Tag::FNumber),
        iso: display_field(&exif, Tag::PhotographicSensitivity),
        focal_length: display_field(&exif, Tag::FocalLength),
        lens_model: ascii_field(&exif, Tag::LensModel),
        latitude: gps_coordinate(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, "S"),
        longitude: gps_coordinate(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, "W"),
        taken_at: taken_at(&exif),
    })
}

fn ascii_field(exif: &Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Ascii(parts) => {
            let raw = parts.first()?;
            let text = String::from_utf8_lossy(raw).trim().to_string();
            (!text.is_empty()).then_some(text)
        }
        _ => None,
    }
}

fn display_field(exif: &Exif, tag: Tag) -> Option<String> {
    exif.get_field(tag, In::PRIMARY)
        .map(|f| f.display_value().to_string())
}

/// Convert a degrees/minutes/seconds rational triple into a signed decimal.
fn gps_coordinate(exif: &Exif, value_tag: Tag, ref_tag: Tag, negative_ref: &str) -> Option<f64> {
    let field = exif.get_field(value_tag, In::PRIMARY)?;
    let Value::Rational(parts) = &field.value else {
        return None;
    };
    if parts.is_empty() {
        return None;
    }

    let component = |i: usize| parts.get(i).map(|r| r.to_f64()).unwrap_or(0.0);
    let decimal = component(0) + component(1) / 60.0 + component(2) / 3600.0;

    let reference = ascii_field(exif, ref_tag);
    if reference.as_deref() == Some(negative_ref) {
        Some(-decimal)
    } else {
        Some(decimal)
    }
}

fn taken_at(exif: &Exif) -> Option<DateTime<Utc>> {
    let raw = ascii_field(exif, Tag::DateTimeOriginal)?;
    NaiveDateTime::parse_from_str(&raw, "%Y:%m:%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
