//! Media post-processing: thumbnails, EXIF capture metadata, and video
//! probing via external ffmpeg/ffprobe binaries.
//!
//! Everything here runs after upload admission, off the request path.
//! Failures are reported to the caller, which logs and moves on; they
//! never invalidate an already-stored asset.

pub mod image;
pub mod video;

pub use image::{derived_file_name, extract_capture_info, make_thumbnail};
pub use video::{FfmpegCover, FfprobeInfo, VideoProbe};
