//! Deterministic publisher activation via a short `ffprobe` RTSP
//! handshake. Protocol-based, not time-based: a clean exit means the
//! on-demand publisher has started.

use async_trait::async_trait;
use camctl_mediaclient::{MediaServerError, PublisherActivator, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// The probe's own `-timeout` flag, in microseconds. Part of the wire
/// contract (spec §6.2): `ffprobe -v quiet -rtsp_transport tcp -timeout
/// 2000000 -show_entries format=duration <rtspURL>`, independent of
/// whatever outer deadline the caller wraps the subprocess in.
const FFPROBE_TIMEOUT_MICROS: u64 = 2_000_000;

/// Spawns `ffprobe` against an RTSP URL and treats a successful exit as
/// confirmation that the path's on-demand publisher is live.
pub struct FfprobeActivator {
    ffprobe_path: String,
}

impl FfprobeActivator {
    pub fn new() -> Self {
        Self { ffprobe_path: "ffprobe".to_string() }
    }

    pub fn with_binary(ffprobe_path: impl Into<String>) -> Self {
        Self { ffprobe_path: ffprobe_path.into() }
    }
}

impl Default for FfprobeActivator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PublisherActivator for FfprobeActivator {
    async fn activate(&self, rtsp_url: &str, timeout: Duration) -> Result<()> {
        // ffprobe's own `-timeout` is the fixed wire-contract literal;
        // `timeout` (the caller's outer deadline) separately bounds the
        // whole subprocess in case ffprobe ignores its own flag.
        let mut command = Command::new(&self.ffprobe_path);
        command
            .arg("-v")
            .arg("quiet")
            .arg("-rtsp_transport")
            .arg("tcp")
            .arg("-timeout")
            .arg(FFPROBE_TIMEOUT_MICROS.to_string())
            .arg("-show_entries")
            .arg("format=duration")
            .arg(rtsp_url)
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let child = command.spawn().map_err(|e| MediaServerError::SubprocessFailed {
            program: self.ffprobe_path.clone(),
            detail: e.to_string(),
        })?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| MediaServerError::Timeout {
                operation: format!("activate_path_publisher({rtsp_url})"),
                elapsed_ms: timeout.as_millis() as u64,
            })?
            .map_err(|e| MediaServerError::SubprocessFailed {
                program: self.ffprobe_path.clone(),
                detail: e.to_string(),
            })?;

        if output.status.success() {
            debug!(target: "path_manager", url = %rtsp_url, "publisher activation succeeded");
            Ok(())
        } else {
            let detail = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(target: "path_manager", url = %rtsp_url, %detail, "publisher activation probe failed");
            Err(MediaServerError::SubprocessFailed { program: self.ffprobe_path.clone(), detail })
        }
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn activation_against_unreachable_host_fails() {
        let activator = FfprobeActivator::new();
        let result = activator
            .activate("rtsp://127.0.0.1:1/nonexistent", Duration::from_millis(500))
            .await;
        assert!(result.is_err());
    }

    /// The probe's own `-timeout` is the literal wire-contract value
    /// regardless of the caller's outer deadline (spec §6.2) — use a
    /// stand-in "ffprobe" that just echoes its argv so the constructed
    /// command line can be inspected directly.
    #[tokio::test]
    async fn probe_timeout_flag_is_the_wire_contract_literal_not_the_outer_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let echo_argv = dir.path().join("ffprobe");
        std::fs::write(
            &echo_argv,
            "#!/bin/sh\necho \"$@\" > \"$(dirname \"$0\")/argv.txt\"\nexit 1\n",
        )
        .unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&echo_argv, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let activator = FfprobeActivator::with_binary(echo_argv.to_string_lossy().to_string());
        let _ = activator
            .activate("rtsp://127.0.0.1:9/camera0", Duration::from_secs(30))
            .await;

        let recorded = std::fs::read_to_string(dir.path().join("argv.txt")).unwrap();
        assert!(recorded.contains("-timeout 2000000"));
    }
}
