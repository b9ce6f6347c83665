use serde::{Deserialize, Serialize};

/// RTSP keepalive / restart-backoff parameters (spec §4.6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeepaliveConfig {
    #[serde(default = "default_process_termination_timeout")]
    pub process_termination_timeout_secs: f64,
    #[serde(default)]
    pub stream_readiness: StreamReadinessConfig,
    #[serde(default = "default_max_backoff_delay")]
    pub max_backoff_delay_secs: f64,
    #[serde(default = "default_max_restart_count")]
    pub max_restart_count: u32,
}

/// Polling parameters used while waiting for a path to report `ready`
/// after a publisher process has been spawned.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamReadinessConfig {
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: f64,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: f64,
}

fn default_process_termination_timeout() -> f64 {
    5.0
}
fn default_max_backoff_delay() -> f64 {
    60.0
}
fn default_max_restart_count() -> u32 {
    3
}
fn default_check_interval() -> f64 {
    0.5
}
fn default_retry_delay() -> f64 {
    1.0
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            process_termination_timeout_secs: default_process_termination_timeout(),
            stream_readiness: StreamReadinessConfig::default(),
            max_backoff_delay_secs: default_max_backoff_delay(),
            max_restart_count: default_max_restart_count(),
        }
    }
}

impl Default for StreamReadinessConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}
