//! Video enrichment: duration probing via ffprobe and cover-frame
//! extraction via ffmpeg. Both shell out to external binaries through
//! argument vectors, never a shell.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Reject paths that could smuggle shell metacharacters or escape the
/// working tree if they ever met a shell.
fn validate_path(path: &str) -> Result<()> {
    let dangerous_chars = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
    if path.chars().any(|c| dangerous_chars.contains(&c)) {
        return Err(anyhow!("Path contains dangerous characters: {}", path));
    }

    if path.contains("..") {
        return Err(anyhow!("Path contains directory traversal: {}", path));
    }

    Ok(())
}

fn validate_and_canonicalize_path(path: &Path) -> Result<PathBuf> {
    let path_str = path.to_string_lossy();
    validate_path(&path_str)?;

    if path.exists() {
        path.canonicalize()
            .map_err(|e| anyhow!("Failed to canonicalize path: {}", e))
    } else {
        if let Some(parent) = path.parent() {
            parent
                .canonicalize()
                .map_err(|e| anyhow!("Failed to canonicalize parent path: {}", e))?;
        }
        Ok(path.to_path_buf())
    }
}

fn validate_binary_path(binary: &str) -> Result<()> {
    validate_path(binary)?;
    if !binary
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '/' | '-' | '_' | '.' | '\\'))
    {
        return Err(anyhow!("Binary path contains unsafe characters: {}", binary));
    }
    Ok(())
}

/// Container-level facts reported by ffprobe.
#[derive(Debug, Clone, PartialEq)]
pub struct FfprobeInfo {
    pub duration_secs: f64,
}

/// Probes video files with ffprobe.
pub struct VideoProbe {
    ffprobe_path: String,
}

impl VideoProbe {
    pub fn new(ffprobe_path: impl Into<String>) -> Result<Self> {
        let ffprobe_path = ffprobe_path.into();
        validate_binary_path(&ffprobe_path).context("Invalid ffprobe path")?;
        Ok(Self { ffprobe_path })
    }

    #[tracing::instrument(skip(self), fields(
        process.executable.path = %self.ffprobe_path,
        ffmpeg.operation = "probe"
    ))]
    pub async fn probe(&self, video_path: &Path) -> Result<FfprobeInfo> {
        let start = std::time::Instant::now();
        let validated_path =
            validate_and_canonicalize_path(video_path).context("Invalid video path")?;

        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
            ])
            .arg(&validated_path)
            .output()
            .await
            .context("Failed to execute ffprobe")?;

        if !output.status.success() {
            return Err(anyhow!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        let probe_data: serde_json::Value =
            serde_json::from_slice(&output.stdout).context("Failed to parse ffprobe output")?;

        let duration_secs = parse_duration(&probe_data)
            .ok_or_else(|| anyhow!("ffprobe output has no parseable duration"))?;

        tracing::info!(
            duration_ms = start.elapsed().as_millis(),
            video_duration = duration_secs,
            "Video probe completed"
        );

        Ok(FfprobeInfo { duration_secs })
    }
}

fn parse_duration(probe_data: &serde_json::Value) -> Option<f64> {
    probe_data["format"]["duration"]
        .as_str()
        .and_then(|d| d.parse::<f64>().ok())
}

/// Extracts a representative cover frame with ffmpeg.
///
/// A fixed output frame would often land on a black lead-in; the
/// `thumbnail` filter instead scans the first 50 frames and keeps the
/// most representative one.
pub struct FfmpegCover {
    ffmpeg_path: String,
}

const COVER_LOOKAHEAD_FRAMES: u32 = 50;

impl FfmpegCover {
    pub fn new(ffmpeg_path: impl Into<String>) -> Result<Self> {
        let ffmpeg_path = ffmpeg_path.into();
        validate_binary_path(&ffmpeg_path).context("Invalid ffmpeg path")?;
        Ok(Self { ffmpeg_path })
    }

    #[tracing::instrument(skip(self), fields(
        process.executable.path = %self.ffmpeg_path,
        ffmpeg.operation = "cover"
    ))]
    pub async fn extract_cover(&self, video_path: &Path, cover_path: &Path) -> Result<()> {
        let start = std::time::Instant::now();
        let input = validate_and_canonicalize_path(video_path).context("Invalid video path")?;
        let output_path =
            validate_and_canonicalize_path(cover_path).context("Invalid cover path")?;

        let output = Command::new(&self.ffmpeg_path)
            .arg("-i")
            .arg(&input)
            .args([
                "-vf",
                &format!("thumbnail={}", COVER_LOOKAHEAD_FRAMES),
                "-frames:v",
                "1",
                "-y",
            ])
            .arg(&output_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("Failed to execute ffmpeg")?;

        if !output.status.success() {
            return Err(anyhow!(
                "ffmpeg cover extraction failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        tracing::info!(
            duration_ms = start.elapsed().as_millis(),
            "Cover frame extracted"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_with_shell_metacharacters_rejected() {
        assert!(validate_path("video;rm -rf /.mp4").is_err());
        assert!(validate_path("a/../b.mp4").is_err());
        assert!(validate_path("videos/clip.mp4").is_ok());
    }

    #[test]
    fn binary_paths_are_restricted() {
        assert!(VideoProbe::new("/usr/bin/ffprobe").is_ok());
        assert!(VideoProbe::new("ffprobe$(whoami)").is_err());
        assert!(FfmpegCover::new("ffmpeg && curl evil").is_err());
    }

    #[test]
    fn duration_parsed_from_format_block() {
        let data = serde_json::json!({
            "format": { "duration": "12.48", "format_name": "mov,mp4" }
        });
        assert_eq!(parse_duration(&data), Some(12.48));

        let missing = serde_json::json!({ "format": {} });
        assert_eq!(parse_duration(&missing), None);
    }
}
