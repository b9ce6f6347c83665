//! Pure functions: identifier <-> device-path conversion, path-name
//! validation, FFmpeg command construction, and snapshot/recording
//! filename expansion and parsing (spec §4.2). None of these touch the
//! network; they exist so `PathManager` and `SnapshotManager` never
//! hand-roll string formatting at their call sites.

use crate::error::{MediaServerError, Result};
use crate::types::{CameraIdentifier, DevicePath, PathName};
use chrono::{DateTime, Local};
use std::path::PathBuf;

const RESERVED_NAMES: [&str; 3] = ["all", "~all", "~internal"];
const MAX_PATH_NAME_LEN: usize = 64;

/// `/dev/video<N>` -> `camera<N>`. For anything else (including
/// URLs), falls back to the last path component unchanged.
pub fn media_server_path_for_device(device: &DevicePath) -> String {
    match device {
        DevicePath::V4l2(path) => {
            if let Some(n) = path.strip_prefix("/dev/video") {
                if !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) {
                    return format!("camera{n}");
                }
            }
            path.rsplit('/').next().unwrap_or(path).to_string()
        }
        DevicePath::Url(url) => url.rsplit('/').next().unwrap_or(url).to_string(),
    }
}

/// `camera<N>` -> `/dev/video<N>`. The only N-to-path relation that
/// exists in the core.
pub fn device_path_for_identifier(camera_id: &CameraIdentifier) -> Option<DevicePath> {
    camera_id
        .device_index()
        .map(|n| DevicePath::V4l2(format!("/dev/video{n}")))
}

/// Validates a path name per spec §3: non-empty, <= 64 characters,
/// restricted to `[A-Za-z0-9_-]`, and not a reserved name.
pub fn validate_path_name(name: &str) -> Result<PathName> {
    if name.is_empty() {
        return Err(MediaServerError::Validation {
            field: "name".to_string(),
            rule: "must not be empty".to_string(),
        });
    }
    if name.len() > MAX_PATH_NAME_LEN {
        return Err(MediaServerError::Validation {
            field: "name".to_string(),
            rule: format!("must be <= {MAX_PATH_NAME_LEN} characters"),
        });
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(MediaServerError::Validation {
            field: "name".to_string(),
            rule: "must match [A-Za-z0-9_-]".to_string(),
        });
    }
    if RESERVED_NAMES.contains(&name) {
        return Err(MediaServerError::Validation {
            field: "name".to_string(),
            rule: format!("must not be a reserved name ({})", RESERVED_NAMES.join(", ")),
        });
    }
    Ok(PathName::new_unchecked(name))
}

/// Codec parameters used by [`build_ffmpeg_publisher_command`], sourced
/// from configuration (spec §6.3 Codec block).
#[derive(Debug, Clone)]
pub struct CodecConfig {
    pub video_profile: String,
    pub video_level: String,
    pub pixel_format: String,
    pub preset: String,
    pub bitrate: String,
}

/// Builds the on-demand FFmpeg publisher command line for a path.
/// Shape and literal flags are contract (spec §4.3.3).
pub fn build_ffmpeg_publisher_command(
    device: &DevicePath,
    stream_name: &str,
    codec: &CodecConfig,
    rtsp_host_port: &str,
) -> String {
    match device {
        DevicePath::V4l2(dev) => format!(
            "ffmpeg -f v4l2 -i {dev} \
-c:v libx264 -profile:v {profile} -level {level} \
-pix_fmt {pixfmt} -preset {preset} -b:v {bitrate} \
-f rtsp rtsp://{host}/{name}",
            dev = dev,
            profile = codec.video_profile,
            level = codec.video_level,
            pixfmt = codec.pixel_format,
            preset = codec.preset,
            bitrate = codec.bitrate,
            host = rtsp_host_port,
            name = stream_name,
        ),
        DevicePath::Url(url) => {
            if url.starts_with("rtsp://") || url.starts_with("rtmp://") {
                format!(
                    "ffmpeg -i {url} -c copy -f rtsp rtsp://{host}/{name}",
                    url = url,
                    host = rtsp_host_port,
                    name = stream_name,
                )
            } else {
                // Fallback for unknown source types: re-encode with libx264.
                format!(
                    "ffmpeg -i {url} -c:v libx264 -preset {preset} -f rtsp rtsp://{host}/{name}",
                    url = url,
                    preset = codec.preset,
                    host = rtsp_host_port,
                    name = stream_name,
                )
            }
        }
    }
}

/// Returns the server-side recording pattern string (with `%path`,
/// `%Y`, …), never an actual filesystem path — the media server
/// expands these placeholders itself.
pub fn recording_path_pattern(base_path: &str, subdirs: bool, filename_pattern: &str) -> String {
    if subdirs {
        format!("{}/%path/{}", base_path.trim_end_matches('/'), filename_pattern)
    } else {
        format!("{}/{}", base_path.trim_end_matches('/'), filename_pattern)
    }
}

/// Expands `%device`, `%timestamp`, and Y/M/D/H/M/S fields from the
/// current wall clock into an actual snapshot file path.
pub fn snapshot_file_path(
    base_path: &str,
    subdirs: bool,
    device: &DevicePath,
    filename_pattern: &str,
) -> PathBuf {
    let now = Local::now();
    let device_label = media_server_path_for_device(device);
    let expanded = expand_timestamp_fields(filename_pattern, now)
        .replace("%device", &device_label)
        .replace("%timestamp", &now.timestamp().to_string());

    let mut path = PathBuf::from(base_path);
    if subdirs {
        path.push(&device_label);
    }
    path.push(expanded);
    path
}

fn expand_timestamp_fields(pattern: &str, now: DateTime<Local>) -> String {
    pattern
        .replace("%Y", &format!("{:04}", now.format("%Y")))
        .replace("%m", &format!("{:02}", now.format("%m")))
        .replace("%d", &format!("{:02}", now.format("%d")))
        .replace("%H", &format!("{:02}", now.format("%H")))
        .replace("%M", &format!("{:02}", now.format("%M")))
        .replace("%S", &format!("{:02}", now.format("%S")))
}

/// Parsed result of [`parse_snapshot_filename`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSnapshotFilename {
    pub device: String,
    pub timestamp: String,
    pub extension: String,
}

/// Inverse of the expansion, for the common `%device_%timestamp.jpg`
/// pattern. Fails with a diagnostic when the pattern does not match.
pub fn parse_snapshot_filename(filename: &str) -> Result<ParsedSnapshotFilename> {
    let (stem, extension) = filename.rsplit_once('.').ok_or_else(|| MediaServerError::Validation {
        field: "filename".to_string(),
        rule: "must have an extension".to_string(),
    })?;
    let (device, timestamp) = stem.rsplit_once('_').ok_or_else(|| MediaServerError::Validation {
        field: "filename".to_string(),
        rule: "must match <device>_<timestamp>.<ext>".to_string(),
    })?;
    if device.is_empty() || timestamp.is_empty() {
        return Err(MediaServerError::Validation {
            field: "filename".to_string(),
            rule: "device and timestamp segments must be non-empty".to_string(),
        });
    }
    Ok(ParsedSnapshotFilename {
        device: device.to_string(),
        timestamp: timestamp.to_string(),
        extension: extension.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_device_path_round_trip() {
        for k in [0u64, 1, 7, 99, 1_000_000] {
            let id = CameraIdentifier::new(format!("camera{k}"));
            let device = device_path_for_identifier(&id).unwrap();
            assert_eq!(media_server_path_for_device(&device), id.as_str());
        }
    }

    #[test]
    fn validate_path_name_accepts_well_formed() {
        assert!(validate_path_name("camera0").is_ok());
        assert!(validate_path_name("cam_01-test").is_ok());
    }

    #[test]
    fn validate_path_name_rejects_reserved() {
        for reserved in RESERVED_NAMES {
            assert!(validate_path_name(reserved).is_err());
        }
    }

    #[test]
    fn validate_path_name_rejects_bad_chars_and_length() {
        assert!(validate_path_name("").is_err());
        assert!(validate_path_name("has space").is_err());
        assert!(validate_path_name(&"a".repeat(65)).is_err());
    }

    #[test]
    fn ffmpeg_command_for_v4l2_device() {
        let codec = CodecConfig {
            video_profile: "main".into(),
            video_level: "4.0".into(),
            pixel_format: "yuv420p".into(),
            preset: "veryfast".into(),
            bitrate: "2M".into(),
        };
        let cmd = build_ffmpeg_publisher_command(
            &DevicePath::V4l2("/dev/video0".into()),
            "camera0",
            &codec,
            "127.0.0.1:8554",
        );
        assert!(cmd.starts_with("ffmpeg -f v4l2 -i /dev/video0"));
        assert!(cmd.ends_with("rtsp://127.0.0.1:8554/camera0"));
    }

    #[test]
    fn ffmpeg_command_for_external_rtsp() {
        let codec = CodecConfig {
            video_profile: "main".into(),
            video_level: "4.0".into(),
            pixel_format: "yuv420p".into(),
            preset: "veryfast".into(),
            bitrate: "2M".into(),
        };
        let cmd = build_ffmpeg_publisher_command(
            &DevicePath::Url("rtsp://cam.local/stream".into()),
            "camera_ext",
            &codec,
            "127.0.0.1:8554",
        );
        assert!(cmd.contains("-c copy"));
    }

    #[test]
    fn parse_snapshot_filename_round_trips() {
        let parsed = parse_snapshot_filename("camera0_1690000000.jpg").unwrap();
        assert_eq!(parsed.device, "camera0");
        assert_eq!(parsed.timestamp, "1690000000");
        assert_eq!(parsed.extension, "jpg");
    }

    #[test]
    fn parse_snapshot_filename_rejects_malformed() {
        assert!(parse_snapshot_filename("noextension").is_err());
        assert!(parse_snapshot_filename("noseparator.jpg").is_err());
    }
}
