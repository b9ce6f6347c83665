//! Periodic media-server liveness probe with debounced state
//! transitions and a circuit-open signal for higher layers.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use camctl_mediaclient::MediaServerTransport;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// {healthy, degraded, unhealthy}.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => HealthState::Healthy,
            1 => HealthState::Degraded,
            _ => HealthState::Unhealthy,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            HealthState::Healthy => 0,
            HealthState::Degraded => 1,
            HealthState::Unhealthy => 2,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HealthMetrics {
    pub state: HealthState,
    pub consecutive_failures: u32,
    pub circuit_open: bool,
}

pub struct HealthMonitorConfig {
    pub probe_interval: Duration,
    /// Consecutive same-direction observations required before a state
    /// transition is committed, so a single flaky probe doesn't flip
    /// the reported status.
    pub failure_threshold: u32,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(5),
            failure_threshold: 3,
        }
    }
}

/// Probes `transport.health_check()` on an interval, debouncing state
/// transitions so a single flaky probe doesn't flip the status.
/// Consecutive failures past `failure_threshold` open the circuit;
/// a single success closes it again.
pub struct HealthMonitor {
    transport: Arc<dyn MediaServerTransport>,
    config: HealthMonitorConfig,
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
    circuit_open: AtomicBool,
    changes: broadcast::Sender<HealthState>,
    stopped: AtomicBool,
}

impl HealthMonitor {
    pub fn new(transport: Arc<dyn MediaServerTransport>, config: HealthMonitorConfig) -> Arc<Self> {
        let (changes, _rx) = broadcast::channel(16);
        Arc::new(Self {
            transport,
            config,
            state: AtomicU8::new(HealthState::Healthy.as_u8()),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            circuit_open: AtomicBool::new(false),
            changes,
            stopped: AtomicBool::new(false),
        })
    }

    /// Spawns the probe loop. The returned handle is joined at shutdown.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move { monitor.run().await })
    }

    async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.probe_interval);
        loop {
            ticker.tick().await;
            if self.stopped.load(Ordering::SeqCst) {
                return;
            }
            self.probe_once().await;
        }
    }

    async fn probe_once(&self) {
        match self.transport.health_check().await {
            Ok(()) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                let successes = self.consecutive_successes.fetch_add(1, Ordering::SeqCst) + 1;
                if self.circuit_open.swap(false, Ordering::SeqCst) {
                    info!(target: "health_monitor", "media server probe succeeded, circuit closed");
                }
                if successes >= self.config.failure_threshold
                    || HealthState::from_u8(self.state.load(Ordering::SeqCst)) == HealthState::Healthy
                {
                    self.transition(HealthState::Healthy);
                } else {
                    self.transition(HealthState::Degraded);
                }
            }
            Err(err) => {
                self.consecutive_successes.store(0, Ordering::SeqCst);
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                warn!(target: "health_monitor", error = %err, failures, "media server probe failed");
                if failures >= self.config.failure_threshold {
                    self.circuit_open.store(true, Ordering::SeqCst);
                    self.transition(HealthState::Unhealthy);
                } else {
                    self.transition(HealthState::Degraded);
                }
            }
        }
    }

    fn transition(&self, new_state: HealthState) {
        let old = self.state.swap(new_state.as_u8(), Ordering::SeqCst);
        if old != new_state.as_u8() {
            debug!(target: "health_monitor", ?new_state, "health state changed");
            // A lagging or absent subscriber is fine: this channel only
            // needs to tolerate missed messages, not guarantee delivery.
            let _ = self.changes.send(new_state);
        }
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_healthy(&self) -> bool {
        HealthState::from_u8(self.state.load(Ordering::SeqCst)) == HealthState::Healthy
    }

    pub fn is_circuit_open(&self) -> bool {
        self.circuit_open.load(Ordering::SeqCst)
    }

    pub fn get_status(&self) -> HealthState {
        HealthState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn get_metrics(&self) -> HealthMetrics {
        HealthMetrics {
            state: self.get_status(),
            consecutive_failures: self.consecutive_failures.load(Ordering::SeqCst),
            circuit_open: self.is_circuit_open(),
        }
    }

    pub fn subscribe_to_health_changes(&self) -> broadcast::Receiver<HealthState> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camctl_mediaclient::{MediaServerError, MockMediaServerTransport};

    fn monitor_with(transport: MockMediaServerTransport, threshold: u32) -> Arc<HealthMonitor> {
        HealthMonitor::new(
            Arc::new(transport),
            HealthMonitorConfig { probe_interval: Duration::from_millis(5), failure_threshold: threshold },
        )
    }

    #[tokio::test]
    async fn starts_healthy_with_circuit_closed() {
        let monitor = monitor_with(MockMediaServerTransport::new(), 3);
        assert!(monitor.is_healthy());
        assert!(!monitor.is_circuit_open());
    }

    #[tokio::test]
    async fn opens_circuit_after_threshold_consecutive_failures() {
        let mut transport = MockMediaServerTransport::new();
        transport.expect_health_check().returning(|| {
            Err(MediaServerError::Transport {
                status: 503,
                endpoint: "/v3/paths/list".into(),
                method: "GET".into(),
                detail: "unavailable".into(),
            })
        });
        let monitor = monitor_with(transport, 2);
        monitor.probe_once().await;
        assert!(!monitor.is_circuit_open());
        monitor.probe_once().await;
        assert!(monitor.is_circuit_open());
        assert_eq!(monitor.get_status(), HealthState::Unhealthy);
    }

    #[tokio::test]
    async fn a_single_success_closes_the_circuit() {
        let mut transport = MockMediaServerTransport::new();
        transport.expect_health_check().returning(|| {
            Err(MediaServerError::Transport {
                status: 503,
                endpoint: "/v3/paths/list".into(),
                method: "GET".into(),
                detail: "unavailable".into(),
            })
        });
        let monitor = monitor_with(transport, 1);
        monitor.probe_once().await;
        assert!(monitor.is_circuit_open());

        let mut healthy_transport = MockMediaServerTransport::new();
        healthy_transport.expect_health_check().returning(|| Ok(()));
        let monitor = monitor_with(healthy_transport, 1);
        monitor.circuit_open.store(true, Ordering::SeqCst);
        monitor.probe_once().await;
        assert!(!monitor.is_circuit_open());
    }

    #[tokio::test]
    async fn subscribers_receive_state_changes() {
        let mut transport = MockMediaServerTransport::new();
        transport.expect_health_check().returning(|| {
            Err(MediaServerError::Transport {
                status: 503,
                endpoint: "/v3/paths/list".into(),
                method: "GET".into(),
                detail: "unavailable".into(),
            })
        });
        let monitor = monitor_with(transport, 1);
        let mut rx = monitor.subscribe_to_health_changes();
        monitor.probe_once().await;
        let seen = rx.recv().await.unwrap();
        assert_eq!(seen, HealthState::Unhealthy);
    }
}
