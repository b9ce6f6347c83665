//! Path lifecycle against the media server's config API: create,
//! patch-with-retry, delete, and read-back, plus deterministic
//! publisher activation (spec §4.3).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use camctl_config::MediaServerConfig;
use camctl_mediaclient::{
    path_utils, CameraIdentifier, DevicePath, MediaServerError, MediaServerTransport,
    PathConfiguration, PathName, PublisherActivator, RuntimePath,
};
use camctl_metrics::MetricsCollector;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::name_lock::NameLockTable;
use crate::single_flight::SingleFlight;

/// Result of [`PathManager::create_path`] distinguishing a fresh create
/// from an idempotent no-op (spec §4.3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    AlreadyPresent,
}

pub struct PathManagerConfig {
    pub max_patch_attempts: u32,
    pub patch_base_backoff: Duration,
    pub patch_max_backoff: Duration,
    /// Polling interval used between PATCH attempts to check runtime
    /// visibility (spec §4.3.4): newly-created paths materialize in the
    /// runtime list asynchronously relative to the config list.
    pub runtime_poll_interval: Duration,
}

impl Default for PathManagerConfig {
    fn default() -> Self {
        Self {
            // Spec §8 property 5 / §4.3.4: no more than 4 PATCH calls,
            // total backoff capped around 2s (100/200/400/800ms).
            max_patch_attempts: 4,
            patch_base_backoff: Duration::from_millis(100),
            patch_max_backoff: Duration::from_secs(2),
            runtime_poll_interval: Duration::from_millis(50),
        }
    }
}

/// Owns every path the controller has registered with the media
/// server. All mutating operations are keyed single-flight and
/// per-name-serialized so concurrent callers for the same path name
/// never race each other or issue duplicate requests.
pub struct PathManager {
    transport: Arc<dyn MediaServerTransport>,
    activator: Arc<dyn PublisherActivator>,
    metrics: Arc<MetricsCollector>,
    media_server: MediaServerConfig,
    config: PathManagerConfig,
    name_locks: NameLockTable,
    create_flight: SingleFlight<Result<ApplyOutcome, MediaServerError>>,
}

impl PathManager {
    pub fn new(
        transport: Arc<dyn MediaServerTransport>,
        activator: Arc<dyn PublisherActivator>,
        metrics: Arc<MetricsCollector>,
        media_server: MediaServerConfig,
        config: PathManagerConfig,
    ) -> Self {
        Self {
            transport,
            activator,
            metrics,
            media_server,
            config,
            name_locks: NameLockTable::new(),
            create_flight: SingleFlight::new(),
        }
    }

    /// Validates `raw_name`, returning the canonical [`PathName`] or a
    /// `Validation` error (spec §3).
    pub fn validate_path(&self, raw_name: &str) -> Result<PathName, MediaServerError> {
        path_utils::validate_path_name(raw_name)
    }

    /// `camera<N>` -> `/dev/video<N>`, or `None` for an external source
    /// whose identifier carries no V4L2 mapping.
    pub fn device_path_for_camera(&self, camera_id: &CameraIdentifier) -> Option<DevicePath> {
        path_utils::device_path_for_identifier(camera_id)
    }

    /// Builds the [`PathConfiguration`] the media server should receive
    /// for `device`, rewriting the on-demand publisher command in when
    /// needed. Spec §4.3.1: when `requested_source == "publisher"` and
    /// `device` is a V4L2 node, the request is rewritten to an empty
    /// `source` plus a non-empty `runOnDemand` built from the FFmpeg
    /// command shape in §4.3.3; an external RTSP/RTMP source instead
    /// gets `source` set with on-demand flags.
    pub fn build_path_configuration(
        &self,
        device: &DevicePath,
        stream_name: &str,
        requested_source: &str,
    ) -> PathConfiguration {
        let mut cfg = PathConfiguration::default();
        let start_timeout = format!("{}s", self.media_server.on_demand_start_timeout_secs);
        let close_after = format!("{}s", self.media_server.on_demand_close_after_secs);

        match device {
            DevicePath::V4l2(_) => {
                let codec = path_utils::CodecConfig {
                    video_profile: self.media_server.codec.video_profile.clone(),
                    video_level: self.media_server.codec.video_level.clone(),
                    pixel_format: self.media_server.codec.pixel_format.clone(),
                    preset: self.media_server.codec.preset.clone(),
                    bitrate: self.media_server.codec.bitrate.clone(),
                };
                let command = path_utils::build_ffmpeg_publisher_command(
                    device,
                    stream_name,
                    &codec,
                    &self.media_server.rtsp_host_port(),
                );
                cfg.run_on_demand = Some(command);
                cfg.run_on_demand_restart = Some(true);
                cfg.run_on_demand_start_timeout = Some(start_timeout);
                cfg.run_on_demand_close_after = Some(close_after);
            }
            DevicePath::Url(url) => {
                if requested_source == "publisher" {
                    // Unknown how to derive a URL for a bare "publisher"
                    // request against a non-V4L2 device; fall back to
                    // treating the device's own URL as the source.
                    cfg.source = Some(url.clone());
                } else {
                    cfg.source = Some(requested_source.to_string());
                }
                cfg.source_on_demand = Some(true);
                cfg.source_on_demand_start_timeout = Some(start_timeout);
                cfg.source_on_demand_close_after = Some(close_after);
            }
        }
        cfg
    }

    /// Creates a path for `device`, coalescing concurrent callers for
    /// the same name into a single request (spec §4.3.2). This relies
    /// solely on the single-flight table, not the per-name mutex: the
    /// mutex serializes the create→ready→patch sequence a caller drives
    /// across multiple `PathManager` calls, but holding it here, around
    /// a single `create_flight.run`, would fully serialize concurrent
    /// creates for the same name and defeat single-flight coalescing
    /// (the in-flight entry is gone by the time a second caller could
    /// get past the mutex, so it would never join the first's result).
    pub async fn create_path(
        &self,
        name: &PathName,
        device: &DevicePath,
        requested_source: &str,
    ) -> Result<ApplyOutcome, MediaServerError> {
        let name_str = name.as_str().to_string();
        let config = self.build_path_configuration(device, &name_str, requested_source);
        if !config.is_well_formed() {
            return Err(MediaServerError::Validation {
                field: "source".to_string(),
                rule: "either source or runOnDemand must be non-empty".to_string(),
            });
        }

        let transport = self.transport.clone();
        let metrics = self.metrics.clone();
        self.create_flight
            .run(&name_str, || async move {
                let outcome = match transport.add_path(&name_str, &config).await {
                    Ok(()) => {
                        info!(target: "path_manager", path = %name_str, "path created");
                        Ok(ApplyOutcome::Created)
                    }
                    Err(err) if err.indicates_already_exists() => {
                        debug!(target: "path_manager", path = %name_str, "path already present");
                        Ok(ApplyOutcome::AlreadyPresent)
                    }
                    Err(err) => Err(err),
                };
                metrics.record_path_operation("create", outcome.is_ok());
                outcome
            })
            .await
    }

    /// Patches an existing path's configuration with bounded retry on
    /// transient transport failures (spec §4.3.4). Between attempts,
    /// runtime visibility is polled via `GetPath` (the runtime
    /// endpoint, not the config one) because a newly-created path
    /// materializes there asynchronously.
    pub async fn patch_path(
        &self,
        name: &PathName,
        config: PathConfiguration,
    ) -> Result<(), MediaServerError> {
        let name_str = name.as_str().to_string();
        let _guard = self.name_locks.lock(&name_str).await;

        let mut attempt = 0;
        let mut backoff = self.config.patch_base_backoff;
        let mut tried = Vec::new();
        loop {
            attempt += 1;
            self.metrics.record_patch_attempt();
            match self.transport.patch_path(&name_str, &config).await {
                Ok(()) => {
                    info!(target: "path_manager", path = %name_str, attempt, "path patched");
                    self.name_locks.evict_if_idle(&name_str).await;
                    return Ok(());
                }
                Err(err) if err.is_retryable() && attempt < self.config.max_patch_attempts => {
                    warn!(
                        target: "path_manager",
                        path = %name_str,
                        attempt,
                        error = %err,
                        "patch attempt failed, retrying"
                    );
                    tried.push(err.to_string());
                    let _ = tokio::time::timeout(
                        self.config.runtime_poll_interval,
                        self.transport.get_runtime_path(&name_str),
                    )
                    .await;
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(self.config.patch_max_backoff);
                }
                Err(err) => {
                    tried.push(err.to_string());
                    self.name_locks.evict_if_idle(&name_str).await;
                    return Err(MediaServerError::Composite {
                        operation: format!("patch_path({name_str})"),
                        attempts: attempt,
                        tried,
                    });
                }
            }
        }
    }

    pub async fn delete_path(&self, name: &PathName) -> Result<(), MediaServerError> {
        let name_str = name.as_str().to_string();
        let _guard = self.name_locks.lock(&name_str).await;
        // Idempotent delete semantics (spec §4.3.1/§4.3.6): 404 is
        // success whether or not the runtime-origin path still lingers
        // (runtime paths can't be removed through the config API).
        let result = match self.transport.delete_path(&name_str).await {
            Ok(()) => Ok(()),
            Err(MediaServerError::NotFound { .. }) => {
                match self.transport.get_runtime_path(&name_str).await {
                    Ok(_) => warn!(
                        target: "path_manager",
                        path = %name_str,
                        "delete returned 404 but path still visible at runtime"
                    ),
                    Err(_) => {}
                }
                Ok(())
            }
            Err(err) => Err(err),
        };
        self.metrics.record_path_operation("delete", result.is_ok());
        self.name_locks.evict_if_idle(&name_str).await;
        result
    }

    pub async fn get_path(&self, name: &PathName) -> Result<PathConfiguration, MediaServerError> {
        self.transport.get_path_config(name.as_str()).await
    }

    pub async fn list_paths(&self) -> Result<HashMap<String, PathConfiguration>, MediaServerError> {
        let items = self.transport.list_path_configs().await?;
        Ok(items.into_iter().collect())
    }

    /// Existence is judged by runtime visibility, not config presence
    /// (spec §4.3.1 `PathExists`).
    pub async fn path_exists(&self, name: &PathName) -> Result<bool, MediaServerError> {
        match self.transport.get_runtime_path(name.as_str()).await {
            Ok(_) => Ok(true),
            Err(MediaServerError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub async fn get_runtime_path(&self, name: &PathName) -> Result<RuntimePath, MediaServerError> {
        self.transport.get_runtime_path(name.as_str()).await
    }

    pub async fn get_runtime_paths(&self) -> Result<Vec<RuntimePath>, MediaServerError> {
        self.transport.list_runtime_paths().await
    }

    /// Deterministic RTSP-handshake activation of the on-demand
    /// publisher for `name` (spec §4.3.5): protocol-based, not
    /// time-based. Delegates to the injected [`PublisherActivator`] so
    /// `PathManager` never spawns a subprocess itself.
    pub async fn activate_path_publisher(&self, name: &PathName) -> Result<(), MediaServerError> {
        let rtsp_url = format!("rtsp://{}/{}", self.media_server.rtsp_host_port(), name.as_str());
        self.activator
            .activate(&rtsp_url, Duration::from_secs(5))
            .await
    }

    /// `camera<N>` -> its expected publisher path name, or a
    /// validation error if `camera_id` is malformed.
    pub fn path_name_for_camera(&self, camera_id: &CameraIdentifier) -> Result<PathName, MediaServerError> {
        path_utils::validate_path_name(camera_id.as_str())
    }

    /// The reverse of [`Self::path_name_for_camera`]: identity mapping,
    /// kept as a named operation alongside the rest of the device
    /// abstraction surface (§4.3.1).
    pub fn camera_for_path(&self, name: &PathName) -> CameraIdentifier {
        CameraIdentifier::new(name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camctl_mediaclient::MockMediaServerTransport;
    use camctl_mediaclient::MockPublisherActivator;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn media_server_config() -> MediaServerConfig {
        MediaServerConfig::default()
    }

    fn manager(transport: MockMediaServerTransport, activator: MockPublisherActivator) -> PathManager {
        PathManager::new(
            Arc::new(transport),
            Arc::new(activator),
            Arc::new(MetricsCollector::new()),
            media_server_config(),
            PathManagerConfig {
                max_patch_attempts: 4,
                patch_base_backoff: Duration::from_millis(1),
                patch_max_backoff: Duration::from_millis(10),
                runtime_poll_interval: Duration::from_millis(1),
            },
        )
    }

    #[tokio::test]
    async fn publisher_source_rewrite_for_v4l2_device() {
        let transport = MockMediaServerTransport::new();
        let activator = MockPublisherActivator::new();
        let mgr = manager(transport, activator);
        let cfg = mgr.build_path_configuration(
            &DevicePath::V4l2("/dev/video0".into()),
            "camera0",
            "publisher",
        );
        assert!(cfg.source.is_none());
        let run_on_demand = cfg.run_on_demand.expect("run_on_demand must be set");
        assert!(run_on_demand.starts_with("ffmpeg -f v4l2 -i /dev/video0"));
        assert!(run_on_demand.contains("rtsp://"));
        assert!(run_on_demand.ends_with("/camera0"));
    }

    #[tokio::test]
    async fn create_path_collapses_already_exists_to_success() {
        let mut transport = MockMediaServerTransport::new();
        transport.expect_add_path().times(1).returning(|_, _| {
            Err(MediaServerError::Transport {
                status: 409,
                endpoint: "/v3/config/paths/add/camera0".into(),
                method: "POST".into(),
                detail: "path already exists".into(),
            })
        });
        let mgr = manager(transport, MockPublisherActivator::new());
        let name = PathName::new_unchecked("camera0");
        let outcome = mgr
            .create_path(&name, &DevicePath::V4l2("/dev/video0".into()), "publisher")
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::AlreadyPresent);
    }

    #[tokio::test]
    async fn patch_retries_until_success() {
        let mut transport = MockMediaServerTransport::new();
        let failures = Arc::new(AtomicU32::new(2));
        transport.expect_patch_path().returning(move |_, _| {
            let failures = failures.clone();
            if failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| if n == 0 { None } else { Some(n - 1) })
                .is_ok()
            {
                Err(MediaServerError::Transport {
                    status: 404,
                    endpoint: "/v3/config/paths/patch/camera0".into(),
                    method: "PATCH".into(),
                    detail: "path not found".into(),
                })
            } else {
                Ok(())
            }
        });
        transport.expect_get_runtime_path().returning(|name| {
            Ok(RuntimePath { name: name.to_string(), source: None, ready: false, readers: vec![] })
        });
        let calls = Arc::new(AtomicU32::new(0));
        let mgr = manager(transport, MockPublisherActivator::new());
        let name = PathName::new_unchecked("camera0");
        mgr.patch_path(&name, PathConfiguration::default()).await.unwrap();
        let _ = calls;
    }

    #[tokio::test]
    async fn patch_gives_up_after_max_attempts() {
        let mut transport = MockMediaServerTransport::new();
        transport.expect_patch_path().returning(|_, _| {
            Err(MediaServerError::Transport {
                status: 404,
                endpoint: "/v3/config/paths/patch/camera0".into(),
                method: "PATCH".into(),
                detail: "path not found".into(),
            })
        });
        transport.expect_get_runtime_path().returning(|name| {
            Ok(RuntimePath { name: name.to_string(), source: None, ready: false, readers: vec![] })
        });
        let mgr = manager(transport, MockPublisherActivator::new());
        let name = PathName::new_unchecked("camera0");
        let err = mgr.patch_path(&name, PathConfiguration::default()).await.unwrap_err();
        assert!(matches!(err, MediaServerError::Composite { attempts: 4, .. }));
    }

    #[tokio::test]
    async fn activate_path_publisher_delegates_to_injected_activator() {
        let transport = MockMediaServerTransport::new();
        let mut activator = MockPublisherActivator::new();
        activator
            .expect_activate()
            .withf(|url: &str, _timeout: &Duration| url.ends_with("/camera0"))
            .returning(|_, _| Ok(()));
        let mgr = manager(transport, activator);
        let name = PathName::new_unchecked("camera0");
        mgr.activate_path_publisher(&name).await.unwrap();
    }

    /// A transport whose `add_path` sleeps before resolving, so
    /// concurrent `create_path` callers have a real window in which to
    /// either join the in-flight call or (if the bug this guards
    /// against were reintroduced) issue their own redundant POST.
    /// `mockall`'s generated mocks resolve synchronously, which cannot
    /// exercise this race, hence the hand-written stand-in.
    struct DelayedCreateTransport {
        posts: AtomicU32,
    }

    #[async_trait::async_trait]
    impl MediaServerTransport for DelayedCreateTransport {
        async fn add_path(&self, _name: &str, _config: &PathConfiguration) -> camctl_mediaclient::Result<()> {
            self.posts.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(())
        }
        async fn patch_path(&self, _name: &str, _config: &PathConfiguration) -> camctl_mediaclient::Result<()> {
            unimplemented!("not exercised by this test")
        }
        async fn delete_path(&self, _name: &str) -> camctl_mediaclient::Result<()> {
            unimplemented!("not exercised by this test")
        }
        async fn get_path_config(&self, _name: &str) -> camctl_mediaclient::Result<PathConfiguration> {
            unimplemented!("not exercised by this test")
        }
        async fn list_path_configs(&self) -> camctl_mediaclient::Result<Vec<(String, PathConfiguration)>> {
            unimplemented!("not exercised by this test")
        }
        async fn get_runtime_path(&self, _name: &str) -> camctl_mediaclient::Result<RuntimePath> {
            unimplemented!("not exercised by this test")
        }
        async fn list_runtime_paths(&self) -> camctl_mediaclient::Result<Vec<RuntimePath>> {
            unimplemented!("not exercised by this test")
        }
        async fn health_check(&self) -> camctl_mediaclient::Result<()> {
            unimplemented!("not exercised by this test")
        }
    }

    #[tokio::test]
    async fn concurrent_create_path_calls_collapse_to_one_post() {
        let transport = Arc::new(DelayedCreateTransport { posts: AtomicU32::new(0) });
        let mgr = Arc::new(PathManager::new(
            transport.clone(),
            Arc::new(MockPublisherActivator::new()),
            Arc::new(MetricsCollector::new()),
            media_server_config(),
            PathManagerConfig {
                max_patch_attempts: 4,
                patch_base_backoff: Duration::from_millis(1),
                patch_max_backoff: Duration::from_millis(10),
                runtime_poll_interval: Duration::from_millis(1),
            },
        ));
        let name = PathName::new_unchecked("camera0");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let mgr = mgr.clone();
            let name = name.clone();
            handles.push(tokio::spawn(async move {
                mgr.create_path(&name, &DevicePath::V4l2("/dev/video0".into()), "publisher")
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), ApplyOutcome::Created);
        }
        assert_eq!(transport.posts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn delete_path_is_idempotent_on_not_found() {
        let mut transport = MockMediaServerTransport::new();
        transport.expect_delete_path().returning(|_| {
            Err(MediaServerError::NotFound { endpoint: "/v3/config/paths/delete/camera0".into(), detail: "not found".into() })
        });
        transport.expect_get_runtime_path().returning(|_| {
            Err(MediaServerError::NotFound { endpoint: "/v3/paths/get/camera0".into(), detail: "not found".into() })
        });
        let mgr = manager(transport, MockPublisherActivator::new());
        let name = PathName::new_unchecked("camera0");
        assert!(mgr.delete_path(&name).await.is_ok());
    }
}
