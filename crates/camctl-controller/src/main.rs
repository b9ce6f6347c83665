use std::sync::Arc;
use std::time::Duration;

use camctl_capture::{FfprobeActivator, RTSPKeepaliveReader, SnapshotManager, UnavailableCameraMonitor};
use camctl_config::ConfigLoader;
use camctl_controller::{Controller, HealthMonitor, HealthMonitorConfig};
use camctl_mediaclient::{MediaServerClient, MediaServerTransport};
use camctl_metrics::MetricsCollector;
use camctl_pathmgr::{PathManager, PathManagerConfig, StreamManager};
use camctl_shutdown::SignalHandler;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "camctl control-plane core")]
struct Args {
    #[arg(long, default_value = "./config")]
    config_dir: String,

    #[arg(long, default_value_t = 5)]
    health_probe_interval_secs: u64,

    #[arg(long, default_value_t = 3)]
    health_failure_threshold: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    let args = Args::parse();
    let loader = ConfigLoader::new(&args.config_dir);
    loader.validate()?;
    let config = loader.load()?;

    tracing::info!(
        target: "camctl",
        media_server = %config.media_server.api_base_url(),
        "loaded configuration"
    );

    let transport: Arc<dyn MediaServerTransport> = Arc::new(MediaServerClient::new(
        config.media_server.api_base_url(),
        Duration::from_secs_f64(config.media_server.request_timeout_secs),
    )?);

    let metrics = Arc::new(MetricsCollector::new());

    let path_manager = Arc::new(PathManager::new(
        transport.clone(),
        Arc::new(FfprobeActivator::new()),
        metrics.clone(),
        config.media_server.clone(),
        PathManagerConfig::default(),
    ));
    let stream_manager = Arc::new(StreamManager::new(path_manager.clone(), config.media_server.clone()));
    let snapshot_manager = Arc::new(SnapshotManager::new(
        path_manager.clone(),
        // No device-discovery component is wired in by default; Tier 0
        // falls through immediately and Tiers 1-3 still work.
        Arc::new(UnavailableCameraMonitor),
        metrics.clone(),
        config.paths.clone(),
        config.snapshot.clone(),
        config.media_server.clone(),
    ));
    let keepalive = Arc::new(RTSPKeepaliveReader::new(
        metrics.clone(),
        config.keepalive.clone(),
        config.media_server.rtsp_host_port(),
    ));
    let health_monitor = HealthMonitor::new(
        transport,
        HealthMonitorConfig {
            probe_interval: Duration::from_secs(args.health_probe_interval_secs),
            failure_threshold: args.health_failure_threshold,
        },
    );

    let controller = Controller::new(
        path_manager,
        stream_manager,
        snapshot_manager,
        keepalive,
        health_monitor,
        metrics.clone(),
        config.paths.clone(),
    );
    controller.start();
    tracing::info!(target: "camctl", "controller ready");

    let (signal_handler, _rx) = SignalHandler::new();
    signal_handler.wait_for_system_signal().await;

    controller.shutdown().await;
    tracing::info!(target: "camctl", "shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_parse_with_only_defaults() {
        let args = Args::parse_from(["camctl-controller"]);
        assert_eq!(args.config_dir, "./config");
        assert_eq!(args.health_failure_threshold, 3);
    }
}
