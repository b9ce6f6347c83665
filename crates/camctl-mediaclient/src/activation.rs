//! Capability seam for deterministic publisher activation (spec
//! §4.3.5). `PathManager` depends only on this trait, never on a
//! concrete subprocess implementation, so the cyclic-dependency design
//! note (§9) is satisfied the same way the `CameraMonitor` capability
//! is kept narrow: the real `ffprobe`-driven implementation lives in
//! `camctl-capture`, which depends on `camctl-mediaclient` rather than
//! the other way around.

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Issues the short RTSP handshake that confirms an on-demand
/// publisher has started for `rtsp_url`. Protocol-based, not
/// time-based: success implies the publisher is live.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PublisherActivator: Send + Sync {
    async fn activate(&self, rtsp_url: &str, timeout: Duration) -> Result<()>;
}
