//! The 4-tier snapshot capture pipeline: V4L2 direct → FFmpeg direct →
//! RTSP immediate → RTSP activation, each with its own timeout, falling
//! through on failure and accumulating a composite error if every tier
//! fails.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use camctl_config::{CaptureExperience, MediaServerConfig, PathsConfig, SnapshotTierConfig};
use camctl_mediaclient::{path_utils, CameraIdentifier, DevicePath, MediaServerError};
use camctl_metrics::MetricsCollector;
use camctl_pathmgr::PathManager;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::camera_monitor::CameraMonitor;
use crate::process_group::ProcessGroup;

/// Caller-supplied capture preferences. `format` is a file-format
/// choice and is never forwarded to Tier 0, which only understands
/// pixel formats.
#[derive(Debug, Clone, Default)]
pub struct SnapshotOptions {
    pub format: Option<String>,
    pub quality: Option<u8>,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub auto_resize: bool,
    pub compression: Option<u8>,
}

/// Per-capture metadata attached to every [`Snapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub tier_used: u8,
    pub capture_method: String,
    pub methods_tried: Vec<String>,
    pub capture_time_secs: f64,
    pub experience: String,
    pub stream_name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// File-format extension, carried so a snapshot rediscovered from
    /// disk after a restart (no in-memory record) still reports it.
    pub format: Option<String>,
}

/// Record of one captured image (spec §3 `Snapshot`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: Uuid,
    pub camera_id: String,
    pub file_path: PathBuf,
    pub byte_size: u64,
    pub created_at: chrono::DateTime<Utc>,
    pub metadata: SnapshotMetadata,
}

const TIER_METHOD_NAMES: [&str; 4] = ["v4l2_direct", "usb_direct", "rtsp_immediate", "rtsp_activation"];

pub struct SnapshotManager {
    path_manager: Arc<PathManager>,
    camera_monitor: Arc<dyn CameraMonitor>,
    metrics: Arc<MetricsCollector>,
    paths: PathsConfig,
    tiers: SnapshotTierConfig,
    media_server: MediaServerConfig,
    snapshots: DashMap<Uuid, Snapshot>,
}

impl SnapshotManager {
    pub fn new(
        path_manager: Arc<PathManager>,
        camera_monitor: Arc<dyn CameraMonitor>,
        metrics: Arc<MetricsCollector>,
        paths: PathsConfig,
        tiers: SnapshotTierConfig,
        media_server: MediaServerConfig,
    ) -> Self {
        Self {
            path_manager,
            camera_monitor,
            metrics,
            paths,
            tiers,
            media_server,
            snapshots: DashMap::new(),
        }
    }

    /// Runs the 4-tier pipeline for `camera_id`, returning the first
    /// tier's success, or a composite error naming every attempted tier.
    pub async fn take_snapshot(
        &self,
        camera_id: &CameraIdentifier,
        options: &SnapshotOptions,
    ) -> Result<Snapshot, MediaServerError> {
        let device = path_utils::device_path_for_identifier(camera_id).ok_or_else(|| {
            MediaServerError::Validation {
                field: "camera_id".to_string(),
                rule: format!("'{camera_id}' does not resolve to a device path"),
            }
        })?;

        let output_path = path_utils::snapshot_file_path(
            &self.paths.snapshots_path,
            self.paths.use_device_subdirs,
            &device,
            &self.paths.snapshot_filename_pattern,
        );
        ensure_directory(output_path.parent().unwrap_or(Path::new(".")))?;

        let stream_name = path_utils::media_server_path_for_device(&device);
        let mut tried = Vec::new();
        let overall_start = Instant::now();

        for tier in 0u8..4 {
            let timeout = Duration::from_secs_f64(self.tiers.timeout_for_tier(tier));
            let attempt_start = Instant::now();
            let result = match tier {
                0 => self.try_tier0(&device, &output_path, timeout).await,
                1 => self.try_tier1(&device, &output_path, options, timeout).await,
                2 => self.try_tier2(&stream_name, &output_path, options, timeout).await,
                _ => self.try_tier3(camera_id, &device, &stream_name, &output_path, options, timeout).await,
            };

            match result {
                Ok(()) => {
                    let elapsed = attempt_start.elapsed().as_secs_f64();
                    let byte_size = tokio::fs::metadata(&output_path)
                        .await
                        .map(|m| m.len())
                        .unwrap_or(0);
                    let experience = self.tiers.classify(elapsed);
                    let snapshot = Snapshot {
                        id: Uuid::new_v4(),
                        camera_id: camera_id.as_str().to_string(),
                        file_path: output_path.clone(),
                        byte_size,
                        created_at: Utc::now(),
                        metadata: SnapshotMetadata {
                            tier_used: tier,
                            capture_method: TIER_METHOD_NAMES[tier as usize].to_string(),
                            methods_tried: tried.clone(),
                            capture_time_secs: elapsed,
                            experience: experience_label(experience),
                            stream_name: (tier >= 2).then(|| stream_name.clone()),
                            width: None,
                            height: None,
                            format: options.format.clone().or_else(|| {
                                output_path
                                    .extension()
                                    .and_then(|ext| ext.to_str())
                                    .map(str::to_string)
                            }),
                        },
                    };
                    self.snapshots.insert(snapshot.id, snapshot.clone());
                    info!(
                        target: "snapshot_manager",
                        camera = %camera_id,
                        tier,
                        elapsed_secs = elapsed,
                        "snapshot captured"
                    );
                    return Ok(snapshot);
                }
                Err(err) => {
                    warn!(target: "snapshot_manager", camera = %camera_id, tier, error = %err, "tier failed");
                    tried.push(TIER_METHOD_NAMES[tier as usize].to_string());
                }
            }
        }

        let elapsed = overall_start.elapsed().as_secs_f64();
        Err(MediaServerError::Composite {
            operation: format!("all snapshot capture methods failed for {camera_id} after {elapsed:.1}s"),
            attempts: 4,
            tried,
        })
    }

    async fn try_tier0(
        &self,
        device: &DevicePath,
        output_path: &Path,
        timeout: Duration,
    ) -> Result<(), MediaServerError> {
        tokio::time::timeout(timeout, self.camera_monitor.take_direct_snapshot(device, output_path, timeout))
            .await
            .map_err(|_| MediaServerError::Timeout {
                operation: "tier0_v4l2_direct".to_string(),
                elapsed_ms: timeout.as_millis() as u64,
            })?
    }

    async fn try_tier1(
        &self,
        device: &DevicePath,
        output_path: &Path,
        options: &SnapshotOptions,
        timeout: Duration,
    ) -> Result<(), MediaServerError> {
        let quality = options.quality.unwrap_or(80);
        let args = vec![
            "-f".to_string(),
            "v4l2".to_string(),
            "-i".to_string(),
            device.as_str().to_string(),
            "-frames:v".to_string(),
            "1".to_string(),
            "-q:v".to_string(),
            scaled_quality(quality),
            "-y".to_string(),
            output_path.to_string_lossy().to_string(),
        ];
        run_ffmpeg_capture(&args, timeout).await
    }

    async fn try_tier2(
        &self,
        stream_name: &str,
        output_path: &Path,
        options: &SnapshotOptions,
        timeout: Duration,
    ) -> Result<(), MediaServerError> {
        let rtsp_url = self.rtsp_url(stream_name);
        let quality = options.quality.unwrap_or(80);
        let args = vec![
            "-i".to_string(),
            rtsp_url,
            "-vframes".to_string(),
            "1".to_string(),
            "-q:v".to_string(),
            scaled_quality(quality),
            "-y".to_string(),
            output_path.to_string_lossy().to_string(),
        ];
        run_ffmpeg_capture(&args, timeout).await
    }

    async fn try_tier3(
        &self,
        camera_id: &CameraIdentifier,
        device: &DevicePath,
        stream_name: &str,
        output_path: &Path,
        options: &SnapshotOptions,
        timeout: Duration,
    ) -> Result<(), MediaServerError> {
        if device.is_v4l2() {
            // Tier 3 is for external RTSP sources only (spec §4.5).
            return Err(MediaServerError::Validation {
                field: "device".to_string(),
                rule: "tier3 activation only applies to external RTSP sources".to_string(),
            });
        }
        let name = self.path_manager.validate_path(camera_id.as_str())?;
        self.path_manager.create_path(&name, device, "publisher").await?;
        self.try_tier2(stream_name, output_path, options, timeout).await
    }

    fn rtsp_url(&self, stream_name: &str) -> String {
        format!("rtsp://{}/{}", self.media_server.rtsp_host_port(), stream_name)
    }

    /// Scans the snapshots directory, newest-first, paginating (spec
    /// §4.5 `ListSnapshots`). The in-memory table only holds snapshots
    /// taken since the process last started; files left by an earlier
    /// process incarnation are rediscovered here so listing survives a
    /// restart (spec §3: "listing rediscovers them from the configured
    /// directory").
    pub async fn list_snapshots(&self, limit: usize, offset: usize) -> Result<Vec<Snapshot>, MediaServerError> {
        let mut entries: Vec<Snapshot> = self.snapshots.iter().map(|e| e.value().clone()).collect();
        entries.extend(self.scan_filesystem_snapshots().await);
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries.into_iter().skip(offset).take(limit).collect())
    }

    /// Walks the configured snapshots directory (and its per-device
    /// subdirectories, if enabled), parsing each filename with
    /// [`path_utils::parse_snapshot_filename`] to recover the device and
    /// format for files that have no corresponding in-memory record.
    /// Unreadable directories/entries and filenames that don't match the
    /// `<device>_<timestamp>.<ext>` shape are silently skipped.
    async fn scan_filesystem_snapshots(&self) -> Vec<Snapshot> {
        let known: std::collections::HashSet<PathBuf> =
            self.snapshots.iter().map(|e| e.value().file_path.clone()).collect();

        let mut dirs = vec![PathBuf::from(&self.paths.snapshots_path)];
        if self.paths.use_device_subdirs {
            if let Ok(mut top) = tokio::fs::read_dir(&self.paths.snapshots_path).await {
                dirs.clear();
                while let Ok(Some(entry)) = top.next_entry().await {
                    match entry.file_type().await {
                        Ok(file_type) if file_type.is_dir() => dirs.push(entry.path()),
                        _ => {}
                    }
                }
            }
        }

        let mut discovered = Vec::new();
        for dir in dirs {
            let mut read_dir = match tokio::fs::read_dir(&dir).await {
                Ok(read_dir) => read_dir,
                Err(_) => continue,
            };
            while let Ok(Some(entry)) = read_dir.next_entry().await {
                let path = entry.path();
                if known.contains(&path) {
                    continue;
                }
                if !matches!(entry.file_type().await, Ok(file_type) if file_type.is_file()) {
                    continue;
                }
                let file_name = match path.file_name().and_then(|n| n.to_str()) {
                    Some(name) => name,
                    None => continue,
                };
                let parsed = match path_utils::parse_snapshot_filename(file_name) {
                    Ok(parsed) => parsed,
                    Err(_) => continue,
                };
                let meta = match entry.metadata().await {
                    Ok(meta) => meta,
                    Err(_) => continue,
                };
                let created_at = meta
                    .modified()
                    .map(chrono::DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());
                discovered.push(Snapshot {
                    id: Uuid::new_v4(),
                    camera_id: parsed.device,
                    file_path: path,
                    byte_size: meta.len(),
                    created_at,
                    metadata: SnapshotMetadata {
                        tier_used: 0,
                        capture_method: "rediscovered_from_disk".to_string(),
                        methods_tried: Vec::new(),
                        capture_time_secs: 0.0,
                        experience: "unknown".to_string(),
                        stream_name: None,
                        width: None,
                        height: None,
                        format: Some(parsed.extension),
                    },
                });
            }
        }
        discovered
    }

    /// Deletes snapshots whose age exceeds `max_age`, or beyond
    /// `max_count` newest, or beyond `max_size` cumulative bytes taken
    /// newest-first (spec §4.5, §8 property 8).
    pub async fn cleanup_old_snapshots(
        &self,
        max_age: Duration,
        max_count: usize,
        max_size: u64,
    ) -> Result<usize, MediaServerError> {
        let mut entries: Vec<Snapshot> = self.snapshots.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let now = Utc::now();
        let mut cumulative = 0u64;
        let mut keep = Vec::new();
        let mut to_delete = Vec::new();

        for (index, snapshot) in entries.into_iter().enumerate() {
            let age = now.signed_duration_since(snapshot.created_at);
            let too_old = age.to_std().unwrap_or(Duration::ZERO) > max_age;
            let over_count = index >= max_count;
            let over_size = cumulative.saturating_add(snapshot.byte_size) > max_size;

            if too_old || over_count || over_size {
                to_delete.push(snapshot);
            } else {
                cumulative += snapshot.byte_size;
                keep.push(snapshot);
            }
        }

        let deleted_count = to_delete.len();
        for snapshot in to_delete {
            if let Err(err) = tokio::fs::remove_file(&snapshot.file_path).await {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(target: "snapshot_manager", path = ?snapshot.file_path, error = %err, "failed to remove snapshot file");
                }
            }
            self.snapshots.remove(&snapshot.id);
        }

        info!(target: "snapshot_manager", deleted_count, kept = keep.len(), "cleanup complete");
        Ok(deleted_count)
    }
}

fn scaled_quality(quality_1_to_100: u8) -> String {
    // FFmpeg's `-q:v` for mjpeg runs 2 (best) .. 31 (worst); invert and
    // rescale from the API's 1-100 (best) scale.
    let clamped = quality_1_to_100.clamp(1, 100) as f64;
    let scaled = 31.0 - (clamped / 100.0) * 29.0;
    format!("{:.0}", scaled.clamp(2.0, 31.0))
}

async fn run_ffmpeg_capture(args: &[String], timeout: Duration) -> Result<(), MediaServerError> {
    let mut group = ProcessGroup::spawn("ffmpeg", args)?;
    match tokio::time::timeout(timeout, group.wait()).await {
        Ok(Ok(status)) if status.success() => Ok(()),
        Ok(Ok(status)) => {
            let stderr = group.take_stderr().await;
            Err(MediaServerError::SubprocessFailed {
                program: "ffmpeg".to_string(),
                detail: format!("exited with {status}: {stderr}"),
            })
        }
        Ok(Err(err)) => Err(err),
        Err(_) => {
            group.terminate(Duration::from_millis(500)).await;
            Err(MediaServerError::Timeout {
                operation: "ffmpeg_capture".to_string(),
                elapsed_ms: timeout.as_millis() as u64,
            })
        }
    }
}

fn ensure_directory(dir: &Path) -> Result<(), MediaServerError> {
    std::fs::create_dir_all(dir).map_err(|e| MediaServerError::SubprocessFailed {
        program: "mkdir".to_string(),
        detail: e.to_string(),
    })?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700));
    }
    Ok(())
}

fn experience_label(experience: CaptureExperience) -> String {
    match experience {
        CaptureExperience::Excellent => "excellent",
        CaptureExperience::Good => "good",
        CaptureExperience::Acceptable => "acceptable",
        CaptureExperience::Slow => "slow",
    }
    .to_string()
}
