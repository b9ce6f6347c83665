//! Maps configured cameras onto path names and drives path
//! creation/teardown as streams start and stop (spec §4.4).

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use camctl_config::MediaServerConfig;
use camctl_mediaclient::{CameraIdentifier, DevicePath, MediaServerError, PathName};

use crate::path_manager::{ApplyOutcome, PathManager};

/// Everything a caller needs to start consuming a stream once it has
/// been registered with the media server (spec §4.4 `StartStream`).
#[derive(Debug, Clone)]
pub struct StreamHandle {
    pub path_name: PathName,
    pub rtsp_url: String,
    pub outcome: ApplyOutcome,
    pub ready: bool,
}

/// Tracks which cameras currently have an active path registered with
/// the media server, so `stop_stream` on an unknown camera is a no-op
/// rather than an error.
pub struct StreamManager {
    path_manager: Arc<PathManager>,
    media_server: MediaServerConfig,
    active: RwLock<HashSet<String>>,
}

impl StreamManager {
    pub fn new(path_manager: Arc<PathManager>, media_server: MediaServerConfig) -> Self {
        Self {
            path_manager,
            media_server,
            active: RwLock::new(HashSet::new()),
        }
    }

    /// Deterministic path name for a camera: `camera<N>` (spec §4.2).
    pub fn generate_stream_name(&self, camera_id: &CameraIdentifier) -> Result<PathName, MediaServerError> {
        self.path_manager.validate_path(camera_id.as_str())
    }

    /// Registers a path for `camera_id` against `device` and, once the
    /// media server accepts it, checks whether it is already reporting
    /// ready (a V4L2 on-demand publisher usually is not yet, since
    /// nothing has triggered FFmpeg; an external always-on source often
    /// is). `requested_source` is `"publisher"` for devices this core
    /// itself feeds, or an explicit source URL for externally-fed ones.
    pub async fn start_stream(
        &self,
        camera_id: &CameraIdentifier,
        device: &DevicePath,
        requested_source: &str,
    ) -> Result<StreamHandle, MediaServerError> {
        let name = self.generate_stream_name(camera_id)?;
        let outcome = self
            .path_manager
            .create_path(&name, device, requested_source)
            .await?;
        self.active.write().await.insert(name.as_str().to_string());

        let rtsp_url = format!("rtsp://{}/{}", self.media_server.rtsp_host_port(), name.as_str());
        let ready = match self.path_manager.get_runtime_path(&name).await {
            Ok(runtime) => runtime.ready,
            Err(_) => false,
        };

        info!(
            target: "path_manager",
            camera = %camera_id,
            path = %name,
            ?outcome,
            ready,
            "stream started"
        );
        Ok(StreamHandle { path_name: name, rtsp_url, outcome, ready })
    }

    pub async fn stop_stream(&self, camera_id: &CameraIdentifier) -> Result<(), MediaServerError> {
        let name = self.generate_stream_name(camera_id)?;
        let was_active = self.active.write().await.remove(name.as_str());
        if !was_active {
            return Ok(());
        }
        self.path_manager.delete_path(&name).await?;
        info!(target: "path_manager", camera = %camera_id, path = %name, "stream stopped");
        Ok(())
    }

    pub async fn is_active(&self, camera_id: &CameraIdentifier) -> bool {
        match self.generate_stream_name(camera_id) {
            Ok(name) => self.active.read().await.contains(name.as_str()),
            Err(_) => false,
        }
    }

    pub async fn active_count(&self) -> usize {
        self.active.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camctl_mediaclient::MockMediaServerTransport;
    use camctl_mediaclient::MockPublisherActivator;
    use camctl_mediaclient::types::RuntimePath;
    use camctl_metrics::MetricsCollector;
    use std::time::Duration;

    fn stream_manager() -> StreamManager {
        let mut transport = MockMediaServerTransport::new();
        transport.expect_add_path().returning(|_, _| Ok(()));
        transport.expect_delete_path().returning(|_| Ok(()));
        transport.expect_get_runtime_path().returning(|name| {
            Ok(RuntimePath { name: name.to_string(), source: None, ready: true, readers: vec![] })
        });

        let media_server = MediaServerConfig::default();
        let path_manager = Arc::new(PathManager::new(
            Arc::new(transport),
            Arc::new(MockPublisherActivator::new()),
            Arc::new(MetricsCollector::new()),
            media_server.clone(),
            crate::path_manager::PathManagerConfig {
                max_patch_attempts: 3,
                patch_base_backoff: Duration::from_millis(1),
                patch_max_backoff: Duration::from_millis(5),
                runtime_poll_interval: Duration::from_millis(1),
            },
        ));
        StreamManager::new(path_manager, media_server)
    }

    #[tokio::test]
    async fn start_then_stop_clears_active_state() {
        let mgr = stream_manager();
        let camera = CameraIdentifier::new("camera0");
        let device = DevicePath::V4l2("/dev/video0".into());

        let handle = mgr.start_stream(&camera, &device, "publisher").await.unwrap();
        assert!(handle.rtsp_url.ends_with("/camera0"));
        assert!(mgr.is_active(&camera).await);

        mgr.stop_stream(&camera).await.unwrap();
        assert!(!mgr.is_active(&camera).await);
    }

    #[tokio::test]
    async fn stop_stream_on_unknown_camera_is_a_no_op() {
        let mgr = stream_manager();
        let camera = CameraIdentifier::new("camera9");
        assert!(mgr.stop_stream(&camera).await.is_ok());
    }
}
