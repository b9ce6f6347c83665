//! Narrow capability interface onto the (out-of-scope) device-discovery
//! component (spec §9 design note): `PathManager`/`SnapshotManager`
//! consume only this trait, never a concrete camera-monitor
//! implementation, so no cyclic dependency forms between the two.

use async_trait::async_trait;
use camctl_mediaclient::{CameraIdentifier, DevicePath, MediaServerError};
use std::path::Path;
use std::time::Duration;

/// One physical device as seen by the external camera-monitor
/// component.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub identifier: CameraIdentifier,
    pub device_path: DevicePath,
    pub connected: bool,
}

#[async_trait]
pub trait CameraMonitor: Send + Sync {
    /// Looks up a single device by identifier.
    async fn get_device(&self, camera_id: &CameraIdentifier) -> Result<DeviceInfo, MediaServerError>;

    /// Drives the V4L2 node directly (no FFmpeg) to produce a still
    /// frame at `output_path` (spec §4.5 Tier 0). Raw frame, no EXIF.
    async fn take_direct_snapshot(
        &self,
        device: &DevicePath,
        output_path: &Path,
        timeout: Duration,
    ) -> Result<(), MediaServerError>;

    /// Every device the monitor currently considers connected.
    async fn get_connected_cameras(&self) -> Result<Vec<DeviceInfo>, MediaServerError>;
}

/// Used when no real camera-monitor component is wired in (spec §8
/// scenario S4: "Tier 0 returns 'camera monitor not available'").
/// Every call fails immediately so the snapshot pipeline falls through
/// to Tier 1 without waiting out Tier 0's timeout.
pub struct UnavailableCameraMonitor;

#[async_trait]
impl CameraMonitor for UnavailableCameraMonitor {
    async fn get_device(&self, camera_id: &CameraIdentifier) -> Result<DeviceInfo, MediaServerError> {
        Err(MediaServerError::SubprocessFailed {
            program: "camera-monitor".to_string(),
            detail: format!("camera monitor not available for {camera_id}"),
        })
    }

    async fn take_direct_snapshot(
        &self,
        _device: &DevicePath,
        _output_path: &Path,
        _timeout: Duration,
    ) -> Result<(), MediaServerError> {
        Err(MediaServerError::SubprocessFailed {
            program: "camera-monitor".to_string(),
            detail: "camera monitor not available".to_string(),
        })
    }

    async fn get_connected_cameras(&self) -> Result<Vec<DeviceInfo>, MediaServerError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unavailable_monitor_fails_take_direct_snapshot() {
        let monitor = UnavailableCameraMonitor;
        let result = monitor
            .take_direct_snapshot(
                &DevicePath::V4l2("/dev/video0".into()),
                Path::new("/tmp/out.raw"),
                Duration::from_millis(200),
            )
            .await;
        assert!(result.is_err());
    }
}
