//! Facade composing every component into the single entry point a
//! caller (API layer, CLI, tests) drives: readiness subscription plus
//! startup/shutdown ordering.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use camctl_capture::{RTSPKeepaliveReader, Snapshot, SnapshotManager, SnapshotOptions};
use camctl_config::PathsConfig;
use camctl_mediaclient::{path_utils, CameraIdentifier, DevicePath, MediaServerError, RecordFormat};
use camctl_metrics::MetricsCollector;
use camctl_pathmgr::{PathManager, StreamHandle, StreamManager};
use camctl_shutdown::{Resource, ResourceError, ResourceManager};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::health_monitor::{HealthMetrics, HealthMonitor, HealthState};

/// Everything the core owns, wired together once at startup and handed
/// out as a single `Arc<Controller>` to callers.
pub struct Controller {
    path_manager: Arc<PathManager>,
    stream_manager: Arc<StreamManager>,
    snapshot_manager: Arc<SnapshotManager>,
    keepalive: Arc<RTSPKeepaliveReader>,
    health_monitor: Arc<HealthMonitor>,
    metrics: Arc<MetricsCollector>,
    paths: PathsConfig,
}

impl Controller {
    pub fn new(
        path_manager: Arc<PathManager>,
        stream_manager: Arc<StreamManager>,
        snapshot_manager: Arc<SnapshotManager>,
        keepalive: Arc<RTSPKeepaliveReader>,
        health_monitor: Arc<HealthMonitor>,
        metrics: Arc<MetricsCollector>,
        paths: PathsConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            path_manager,
            stream_manager,
            snapshot_manager,
            keepalive,
            health_monitor,
            metrics,
            paths,
        })
    }

    /// Starts background work (the health probe loop). Call once, after
    /// construction, before serving any request.
    pub fn start(&self) {
        self.health_monitor.spawn();
        info!(target: "controller", "controller started");
    }

    pub async fn start_stream(
        &self,
        camera_id: &CameraIdentifier,
        device: &DevicePath,
        requested_source: &str,
    ) -> Result<StreamHandle, MediaServerError> {
        self.stream_manager.start_stream(camera_id, device, requested_source).await
    }

    pub async fn stop_stream(&self, camera_id: &CameraIdentifier) -> Result<(), MediaServerError> {
        self.stream_manager.stop_stream(camera_id).await
    }

    /// Orchestrates the recording-start sequence the spec's data model
    /// requires (§1 `RecordingManager`, §3 `PathConfiguration.record*`
    /// fields, §4.3.1 `pathReadyLatencyMs`/`deviceEventsTotal` metrics):
    /// register (or reuse) the path, patch it to turn recording on with
    /// a concrete `recordPath` pattern, start the synthetic keepalive
    /// reader so the on-demand publisher doesn't wait on a real viewer,
    /// then deterministically activate the publisher and record the
    /// time that took.
    pub async fn start_recording(
        &self,
        camera_id: &CameraIdentifier,
        device: &DevicePath,
        requested_source: &str,
        record_format: RecordFormat,
    ) -> Result<StreamHandle, MediaServerError> {
        let start = Instant::now();
        let handle = self.stream_manager.start_stream(camera_id, device, requested_source).await?;

        let mut config = self.path_manager.build_path_configuration(
            device,
            handle.path_name.as_str(),
            requested_source,
        );
        config.record = Some(true);
        config.record_format = Some(record_format);
        config.record_path = Some(path_utils::recording_path_pattern(
            &self.paths.recordings_path,
            self.paths.use_device_subdirs,
            &self.paths.recording_filename_pattern,
        ));
        self.path_manager.patch_path(&handle.path_name, config).await?;

        self.keepalive.start_keepalive(handle.path_name.as_str()).await?;

        match self.path_manager.activate_path_publisher(&handle.path_name).await {
            Ok(()) => {
                let latency_ms = start.elapsed().as_millis() as f64;
                self.metrics.observe_path_ready_latency_ms(latency_ms);
                self.metrics.record_device_event("recording_started");
                info!(
                    target: "controller",
                    camera = %camera_id,
                    path = %handle.path_name,
                    latency_ms,
                    "recording started"
                );
            }
            Err(err) => {
                warn!(
                    target: "controller",
                    camera = %camera_id,
                    path = %handle.path_name,
                    error = %err,
                    "recording started but publisher activation probe failed"
                );
            }
        }

        Ok(handle)
    }

    /// Stops the synthetic keepalive reader and turns the `record` flag
    /// back off, but leaves the path itself registered — the same path
    /// may still be serving a live viewer or snapshot capture (spec
    /// §4.4: one path is reused across viewing, recording, snapshotting).
    pub async fn stop_recording(&self, camera_id: &CameraIdentifier) -> Result<(), MediaServerError> {
        let name = self.stream_manager.generate_stream_name(camera_id)?;
        self.keepalive.stop_keepalive(name.as_str()).await;

        let mut config = self.path_manager.get_path(&name).await?;
        config.record = Some(false);
        self.path_manager.patch_path(&name, config).await?;
        self.metrics.record_device_event("recording_stopped");
        info!(target: "controller", camera = %camera_id, path = %name, "recording stopped");
        Ok(())
    }

    pub async fn take_snapshot(
        &self,
        camera_id: &CameraIdentifier,
        options: &SnapshotOptions,
    ) -> Result<Snapshot, MediaServerError> {
        self.snapshot_manager.take_snapshot(camera_id, options).await
    }

    pub async fn start_keepalive(&self, path_name: &str) -> Result<(), MediaServerError> {
        self.keepalive.start_keepalive(path_name).await
    }

    pub async fn stop_keepalive(&self, path_name: &str) {
        self.keepalive.stop_keepalive(path_name).await
    }

    pub fn path_manager(&self) -> &Arc<PathManager> {
        &self.path_manager
    }

    pub fn is_healthy(&self) -> bool {
        self.health_monitor.is_healthy()
    }

    pub fn is_circuit_open(&self) -> bool {
        self.health_monitor.is_circuit_open()
    }

    pub fn health_status(&self) -> HealthState {
        self.health_monitor.get_status()
    }

    pub fn health_metrics(&self) -> HealthMetrics {
        self.health_monitor.get_metrics()
    }

    /// Subscription used by higher layers to react to readiness changes
    /// rather than polling.
    pub fn subscribe_to_health_changes(&self) -> broadcast::Receiver<HealthState> {
        self.health_monitor.subscribe_to_health_changes()
    }

    /// Orderly teardown: stop probing first so no new circuit-state
    /// noise fires mid-shutdown, then drain every keepalive session
    /// (each one SIGTERMs, then SIGKILLs, its FFmpeg sink).
    pub async fn shutdown(&self) {
        info!(target: "controller", "controller shutting down");
        let mut resources = ResourceManager::new();
        resources.register(Arc::new(HealthMonitorResource(self.health_monitor.clone())));
        resources.register(Arc::new(KeepaliveResource(self.keepalive.clone())));
        resources.cleanup_all().await;
    }
}

struct HealthMonitorResource(Arc<HealthMonitor>);

#[async_trait]
impl Resource for HealthMonitorResource {
    async fn cleanup(&self) -> Result<(), ResourceError> {
        self.0.stop();
        Ok(())
    }

    fn name(&self) -> &str {
        "health_monitor"
    }

    fn priority(&self) -> u32 {
        10
    }
}

struct KeepaliveResource(Arc<RTSPKeepaliveReader>);

#[async_trait]
impl Resource for KeepaliveResource {
    async fn cleanup(&self) -> Result<(), ResourceError> {
        self.0.stop().await;
        Ok(())
    }

    fn name(&self) -> &str {
        "rtsp_keepalive_reader"
    }

    fn priority(&self) -> u32 {
        20
    }
}
