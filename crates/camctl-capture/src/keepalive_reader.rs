//! Per-path synthetic RTSP reader that forces an on-demand publisher to
//! start and stay live for the duration of a recording (spec §4.6).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use camctl_config::KeepaliveConfig;
use camctl_metrics::MetricsCollector;
use dashmap::DashMap;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::process_group::ProcessGroup;

struct Session {
    cancel: Arc<Notify>,
    cancelled: Arc<AtomicBool>,
    restart_count: Arc<AtomicU32>,
    /// Set while a sink process is actually running for this path;
    /// cleared for the duration of the restart backoff sleep so
    /// `get_active_count` doesn't count a path that currently has zero
    /// live child processes (spec §8 property 7).
    process_live: Arc<AtomicBool>,
    started_at: Instant,
    monitor: JoinHandle<()>,
}

/// Owns one FFmpeg discard-sink process per path name, restarting it
/// with exponential backoff on unexpected exit (spec §4.6).
pub struct RTSPKeepaliveReader {
    sessions: Arc<DashMap<String, Session>>,
    metrics: Arc<MetricsCollector>,
    config: KeepaliveConfig,
    rtsp_host_port: String,
    stopped: AtomicBool,
}

impl RTSPKeepaliveReader {
    pub fn new(metrics: Arc<MetricsCollector>, config: KeepaliveConfig, rtsp_host_port: impl Into<String>) -> Self {
        metrics.set_max_restart_count(config.max_restart_count);
        Self {
            sessions: Arc::new(DashMap::new()),
            metrics,
            config,
            rtsp_host_port: rtsp_host_port.into(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Idempotent per path name: a second call for a path already
    /// running returns immediately.
    pub async fn start_keepalive(&self, path_name: &str) -> Result<(), camctl_mediaclient::MediaServerError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(camctl_mediaclient::MediaServerError::Cancelled);
        }
        if self.sessions.contains_key(path_name) {
            return Ok(());
        }

        let rtsp_url = format!("rtsp://{}/{}", self.rtsp_host_port, path_name);
        let cancel = Arc::new(Notify::new());
        let cancelled = Arc::new(AtomicBool::new(false));
        let restart_count = Arc::new(AtomicU32::new(0));
        let process_live = Arc::new(AtomicBool::new(true));

        let group = spawn_ffmpeg_sink(&rtsp_url)?;
        self.metrics.record_session_started();

        let monitor = tokio::spawn(monitor_loop(
            group,
            rtsp_url.clone(),
            path_name.to_string(),
            cancel.clone(),
            cancelled.clone(),
            restart_count.clone(),
            process_live.clone(),
            self.metrics.clone(),
            self.config.clone(),
            self.sessions.clone(),
        ));

        self.sessions.insert(
            path_name.to_string(),
            Session { cancel, cancelled, restart_count, process_live, started_at: Instant::now(), monitor },
        );

        // Let the connection establish before returning (spec §4.6:
        // "a short wait tied to stream-readiness config").
        tokio::time::sleep(Duration::from_secs_f64(self.config.stream_readiness.check_interval_secs)).await;
        Ok(())
    }

    /// Cancels the session and awaits a graceful exit asynchronously;
    /// the monitor task itself enforces `processTerminationTimeout` via
    /// `ProcessGroup::terminate`.
    pub async fn stop_keepalive(&self, path_name: &str) {
        if let Some((_, session)) = self.sessions.remove(path_name) {
            session.cancelled.store(true, Ordering::SeqCst);
            session.cancel.notify_waiters();
            let _ = session.monitor.await;
            self.metrics.record_session_stopped();
        }
    }

    /// Synchronous variant used at shutdown: identical to
    /// [`Self::stop_keepalive`] but named separately to match the
    /// distinct call site (spec §4.6).
    pub async fn stop_keepalive_sync(&self, path_name: &str) {
        self.stop_keepalive(path_name).await;
    }

    pub async fn stop_all(&self) {
        let names: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for name in names {
            self.stop_keepalive(&name).await;
        }
    }

    pub async fn cleanup(&self) {
        self.stop_all().await;
    }

    /// Marks the manager stopped; subsequent `start_keepalive` calls
    /// fail immediately (compare-and-swap lifecycle: start is
    /// idempotent-fail, stop is idempotent-ok).
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_all().await;
    }

    /// Counts only sessions whose sink process is currently running —
    /// a session parked in its restart backoff has zero live child
    /// processes and must not be counted (spec §8 property 7).
    pub fn get_active_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|e| e.value().process_live.load(Ordering::SeqCst))
            .count()
    }

    pub fn session_age(&self, path_name: &str) -> Option<Duration> {
        self.sessions.get(path_name).map(|s| s.started_at.elapsed())
    }
}

fn spawn_ffmpeg_sink(rtsp_url: &str) -> Result<ProcessGroup, camctl_mediaclient::MediaServerError> {
    let args = vec![
        "-rtsp_transport".to_string(),
        "tcp".to_string(),
        "-i".to_string(),
        rtsp_url.to_string(),
        "-f".to_string(),
        "null".to_string(),
        "-".to_string(),
    ];
    ProcessGroup::spawn("ffmpeg", &args)
}

#[allow(clippy::too_many_arguments)]
async fn monitor_loop(
    mut group: ProcessGroup,
    rtsp_url: String,
    path_name: String,
    cancel: Arc<Notify>,
    cancelled: Arc<AtomicBool>,
    restart_count: Arc<AtomicU32>,
    process_live: Arc<AtomicBool>,
    metrics: Arc<MetricsCollector>,
    config: KeepaliveConfig,
    sessions: Arc<DashMap<String, Session>>,
) {
    loop {
        let termination_timeout = Duration::from_secs_f64(config.process_termination_timeout_secs);
        tokio::select! {
            _ = cancel.notified() => {
                group.terminate(termination_timeout).await;
                return;
            }
            status = group.wait() => {
                if cancelled.load(Ordering::SeqCst) {
                    return;
                }
                match status {
                    Ok(status) => info!(target: "keepalive", path = %path_name, %status, "keepalive sink exited"),
                    Err(err) => warn!(target: "keepalive", path = %path_name, error = %err, "keepalive sink wait failed"),
                }
                process_live.store(false, Ordering::SeqCst);

                let attempt = restart_count.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt > config.max_restart_count {
                    error!(target: "keepalive", path = %path_name, attempt, "keepalive exceeded max restart count, giving up");
                    metrics.record_process_failure();
                    if sessions.remove(&path_name).is_some() {
                        metrics.record_session_stopped();
                    }
                    return;
                }
                metrics.record_process_restart();

                let backoff = Duration::from_secs_f64(
                    (attempt as f64 * config.stream_readiness.retry_delay_secs)
                        .min(config.max_backoff_delay_secs),
                );
                tokio::select! {
                    _ = cancel.notified() => return,
                    _ = tokio::time::sleep(backoff) => {}
                }

                match spawn_ffmpeg_sink(&rtsp_url) {
                    Ok(new_group) => {
                        group = new_group;
                        process_live.store(true, Ordering::SeqCst);
                    }
                    Err(err) => {
                        error!(target: "keepalive", path = %path_name, error = %err, "failed to respawn keepalive sink");
                        metrics.record_process_failure();
                        if sessions.remove(&path_name).is_some() {
                            metrics.record_session_stopped();
                        }
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> KeepaliveConfig {
        KeepaliveConfig {
            process_termination_timeout_secs: 1.0,
            stream_readiness: camctl_config::StreamReadinessConfig {
                check_interval_secs: 0.01,
                retry_delay_secs: 0.01,
            },
            max_backoff_delay_secs: 0.1,
            max_restart_count: 3,
        }
    }

    #[test]
    fn get_active_count_starts_at_zero() {
        let reader = RTSPKeepaliveReader::new(Arc::new(MetricsCollector::new()), config(), "127.0.0.1:8554");
        assert_eq!(reader.get_active_count(), 0);
    }
}
