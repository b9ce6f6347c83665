//! Spawns a subprocess in its own process group and tears it down with
//! SIGTERM followed by SIGKILL if it doesn't exit in time, so a
//! publisher's own FFmpeg children never survive as orphans.

use camctl_mediaclient::MediaServerError;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::os::unix::process::CommandExt;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{error, warn};

pub struct ProcessGroup {
    child: Child,
    pgid: Pid,
}

impl ProcessGroup {
    /// Spawns `program` with `args` in a new session (and therefore a
    /// new process group whose id equals the child's pid), so killing
    /// the group later also kills anything the child itself forked.
    pub fn spawn(program: &str, args: &[String]) -> Result<Self, MediaServerError> {
        let mut command = Command::new(program);
        command.args(args);
        command.stdout(Stdio::null());
        command.stderr(Stdio::piped());
        unsafe {
            command.pre_exec(|| {
                nix::unistd::setsid().map_err(std::io::Error::from)?;
                Ok(())
            });
        }

        let child = command.spawn().map_err(|e| MediaServerError::SubprocessFailed {
            program: program.to_string(),
            detail: e.to_string(),
        })?;
        let pgid = Pid::from_raw(
            child
                .id()
                .ok_or_else(|| MediaServerError::SubprocessFailed {
                    program: program.to_string(),
                    detail: "child exited before its pid could be read".to_string(),
                })? as i32,
        );
        Ok(Self { child, pgid })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// True if the process has exited, without blocking.
    pub fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    /// Waits for a natural exit and returns its status, leaving the
    /// process group's lifetime to the caller (used by one-shot
    /// capture subprocesses rather than the long-lived keepalive sink).
    pub async fn wait(&mut self) -> Result<std::process::ExitStatus, MediaServerError> {
        self.child.wait().await.map_err(|e| MediaServerError::SubprocessFailed {
            program: "ffmpeg".to_string(),
            detail: e.to_string(),
        })
    }

    /// Collects stderr for diagnostics after [`Self::wait`] returns a
    /// failed status.
    pub async fn take_stderr(&mut self) -> String {
        use tokio::io::AsyncReadExt;
        let mut buf = String::new();
        if let Some(stderr) = self.child.stderr.as_mut() {
            let _ = stderr.read_to_string(&mut buf).await;
        }
        buf
    }

    pub fn pgid(&self) -> Pid {
        self.pgid
    }

    /// SIGTERM the whole group, wait up to `termination_timeout`, then
    /// SIGKILL anything still alive.
    pub async fn terminate(mut self, termination_timeout: Duration) {
        if let Err(e) = signal::killpg(self.pgid, Signal::SIGTERM) {
            warn!(target: "keepalive", pgid = self.pgid.as_raw(), error = %e, "SIGTERM to process group failed");
        }

        let waited = tokio::time::timeout(termination_timeout, self.child.wait()).await;
        if waited.is_err() {
            warn!(
                target: "keepalive",
                pgid = self.pgid.as_raw(),
                "process group did not exit within termination timeout, sending SIGKILL"
            );
            if let Err(e) = signal::killpg(self.pgid, Signal::SIGKILL) {
                error!(target: "keepalive", pgid = self.pgid.as_raw(), error = %e, "SIGKILL to process group failed");
            }
            let _ = self.child.wait().await;
        }
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_and_terminate_a_sleep_process() {
        let group = ProcessGroup::spawn("sleep", &["30".to_string()]).unwrap();
        assert!(group.id().is_some());
        group.terminate(Duration::from_millis(500)).await;
    }

    #[tokio::test]
    async fn terminate_kills_a_process_ignoring_sigterm() {
        // `sh -c 'trap "" TERM; sleep 30'` ignores SIGTERM, forcing the
        // SIGKILL fallback path to run.
        let group = ProcessGroup::spawn(
            "sh",
            &["-c".to_string(), "trap '' TERM; sleep 30".to_string()],
        )
        .unwrap();
        group.terminate(Duration::from_millis(200)).await;
    }
}
