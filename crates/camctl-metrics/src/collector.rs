use prometheus::{Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

/// Prometheus-backed metrics for the control plane (spec
/// §4.3.1/§4.6/§4.7). One instance is shared across `PathManager`,
/// `StreamManager`, `SnapshotManager`, and `RTSPKeepaliveReader`.
pub struct MetricsCollector {
    path_operations_total: CounterVec,
    patch_attempts_total: Counter,
    device_events_total: CounterVec,
    path_ready_latency_ms: Histogram,

    active_sessions: Gauge,
    total_sessions_started: Counter,
    total_sessions_stopped: Counter,

    process_restarts: Counter,
    process_failures: Counter,
    max_restart_count: Gauge,

    registry: Registry,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::try_new().expect("metric registration must not collide")
    }

    fn try_new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let path_operations_total = CounterVec::new(
            Opts::new("path_operations_total", "Path lifecycle operations by kind and outcome"),
            &["operation", "result"],
        )?;
        registry.register(Box::new(path_operations_total.clone()))?;

        let patch_attempts_total = Counter::new(
            "patch_attempts_total",
            "Total PATCH attempts issued against the media server, including retries",
        )?;
        registry.register(Box::new(patch_attempts_total.clone()))?;

        let device_events_total = CounterVec::new(
            Opts::new("device_events_total", "Device hotplug/loss events observed"),
            &["event"],
        )?;
        registry.register(Box::new(device_events_total.clone()))?;

        let path_ready_latency_ms = Histogram::with_opts(
            HistogramOpts::new(
                "path_ready_latency_ms",
                "Time from publisher activation request to the path reporting ready",
            )
            .buckets(vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]),
        )?;
        registry.register(Box::new(path_ready_latency_ms.clone()))?;

        let active_sessions = Gauge::new("active_sessions", "Currently active keepalive sessions")?;
        registry.register(Box::new(active_sessions.clone()))?;

        let total_sessions_started = Counter::new("total_sessions_started", "Keepalive sessions started")?;
        registry.register(Box::new(total_sessions_started.clone()))?;

        let total_sessions_stopped = Counter::new("total_sessions_stopped", "Keepalive sessions stopped")?;
        registry.register(Box::new(total_sessions_stopped.clone()))?;

        let process_restarts = Counter::new("process_restarts_total", "Publisher process restarts")?;
        registry.register(Box::new(process_restarts.clone()))?;

        let process_failures = Counter::new("process_failures_total", "Publisher process failures")?;
        registry.register(Box::new(process_failures.clone()))?;

        let max_restart_count = Gauge::new("max_restart_count", "Configured restart ceiling before giving up")?;
        registry.register(Box::new(max_restart_count.clone()))?;

        Ok(Self {
            path_operations_total,
            patch_attempts_total,
            device_events_total,
            path_ready_latency_ms,
            active_sessions,
            total_sessions_started,
            total_sessions_stopped,
            process_restarts,
            process_failures,
            max_restart_count,
            registry,
        })
    }

    pub fn record_path_operation(&self, operation: &str, succeeded: bool) {
        let result = if succeeded { "success" } else { "failure" };
        self.path_operations_total.with_label_values(&[operation, result]).inc();
    }

    pub fn record_patch_attempt(&self) {
        self.patch_attempts_total.inc();
    }

    pub fn record_device_event(&self, event: &str) {
        self.device_events_total.with_label_values(&[event]).inc();
    }

    pub fn observe_path_ready_latency_ms(&self, latency_ms: f64) {
        self.path_ready_latency_ms.observe(latency_ms);
    }

    pub fn set_active_sessions(&self, count: i64) {
        self.active_sessions.set(count as f64);
    }

    pub fn record_session_started(&self) {
        self.total_sessions_started.inc();
        self.active_sessions.inc();
    }

    pub fn record_session_stopped(&self) {
        self.total_sessions_stopped.inc();
        self.active_sessions.dec();
    }

    pub fn record_process_restart(&self) {
        self.process_restarts.inc();
    }

    pub fn record_process_failure(&self) {
        self.process_failures.inc();
    }

    pub fn set_max_restart_count(&self, value: u32) {
        self.max_restart_count.set(value as f64);
    }

    pub fn export(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus text encoding is always valid utf-8"))
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_contains_spec_named_metrics() {
        let collector = MetricsCollector::new();
        collector.record_path_operation("create", true);
        collector.record_patch_attempt();
        collector.record_device_event("disconnect");
        collector.observe_path_ready_latency_ms(120.0);
        collector.record_session_started();
        collector.record_process_restart();
        collector.set_max_restart_count(10);

        let text = collector.export().unwrap();
        assert!(text.contains("path_operations_total"));
        assert!(text.contains("patch_attempts_total"));
        assert!(text.contains("device_events_total"));
        assert!(text.contains("path_ready_latency_ms"));
        assert!(text.contains("active_sessions"));
        assert!(text.contains("process_restarts_total"));
        assert!(text.contains("max_restart_count"));
    }

    #[test]
    fn session_counters_move_together() {
        let collector = MetricsCollector::new();
        collector.record_session_started();
        collector.record_session_started();
        collector.record_session_stopped();
        let text = collector.export().unwrap();
        assert!(text.contains("active_sessions 1"));
    }
}
