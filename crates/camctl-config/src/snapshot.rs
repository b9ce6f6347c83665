use serde::{Deserialize, Serialize};

/// Per-tier timeouts for the four-tier snapshot pipeline (spec §4.5),
/// plus the UX thresholds that classify a successful capture's elapsed
/// time as `excellent`/`good`/`acceptable`/`slow` (spec §4.5, §6.3
/// `performance.snapshotTiers`).
///
/// Tier 0 (`v4l2_direct`) has no named timeout in spec §6.3 — the
/// original configuration surface only budgets tiers 1-3. A timeout for
/// it is added here so the pipeline never blocks indefinitely on an
/// unavailable `CameraMonitor`; see DESIGN.md for this decision.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SnapshotTierConfig {
    #[serde(default = "default_tier0_timeout")]
    pub tier0_v4l2_direct_timeout_secs: f64,
    #[serde(default = "default_tier1_timeout")]
    pub tier1_usb_direct_timeout_secs: f64,
    #[serde(default = "default_tier2_timeout")]
    pub tier2_rtsp_ready_check_timeout_secs: f64,
    #[serde(default = "default_tier3_timeout")]
    pub tier3_activation_timeout_secs: f64,
    #[serde(default = "default_immediate_threshold")]
    pub immediate_response_threshold_secs: f64,
    #[serde(default = "default_acceptable_threshold")]
    pub acceptable_response_threshold_secs: f64,
    #[serde(default = "default_slow_threshold")]
    pub slow_response_threshold_secs: f64,
}

fn default_tier0_timeout() -> f64 {
    0.2
}
fn default_tier1_timeout() -> f64 {
    2.0
}
fn default_tier2_timeout() -> f64 {
    1.0
}
fn default_tier3_timeout() -> f64 {
    5.0
}
fn default_immediate_threshold() -> f64 {
    0.3
}
fn default_acceptable_threshold() -> f64 {
    1.5
}
fn default_slow_threshold() -> f64 {
    4.0
}

impl Default for SnapshotTierConfig {
    fn default() -> Self {
        Self {
            tier0_v4l2_direct_timeout_secs: default_tier0_timeout(),
            tier1_usb_direct_timeout_secs: default_tier1_timeout(),
            tier2_rtsp_ready_check_timeout_secs: default_tier2_timeout(),
            tier3_activation_timeout_secs: default_tier3_timeout(),
            immediate_response_threshold_secs: default_immediate_threshold(),
            acceptable_response_threshold_secs: default_acceptable_threshold(),
            slow_response_threshold_secs: default_slow_threshold(),
        }
    }
}

/// Coarse user-experience label attached to a successful capture based
/// on its elapsed time (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureExperience {
    Excellent,
    Good,
    Acceptable,
    Slow,
}

impl SnapshotTierConfig {
    /// Classifies `elapsed_secs` against the configured thresholds.
    /// Anything at or under `immediate` is `Excellent`; progressively
    /// looser bounds downgrade to `Good`, `Acceptable`, then `Slow`.
    pub fn classify(&self, elapsed_secs: f64) -> CaptureExperience {
        if elapsed_secs <= self.immediate_response_threshold_secs {
            CaptureExperience::Excellent
        } else if elapsed_secs <= self.acceptable_response_threshold_secs {
            CaptureExperience::Good
        } else if elapsed_secs <= self.slow_response_threshold_secs {
            CaptureExperience::Acceptable
        } else {
            CaptureExperience::Slow
        }
    }

    /// Per-tier timeout indexed by tier number (0-3).
    pub fn timeout_for_tier(&self, tier: u8) -> f64 {
        match tier {
            0 => self.tier0_v4l2_direct_timeout_secs,
            1 => self.tier1_usb_direct_timeout_secs,
            2 => self.tier2_rtsp_ready_check_timeout_secs,
            _ => self.tier3_activation_timeout_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tier_timeouts_are_ordered_sensibly() {
        let cfg = SnapshotTierConfig::default();
        assert!(cfg.tier0_v4l2_direct_timeout_secs < cfg.tier1_usb_direct_timeout_secs);
        assert!(cfg.tier3_activation_timeout_secs >= cfg.tier2_rtsp_ready_check_timeout_secs);
    }

    #[test]
    fn classify_picks_expected_bucket() {
        let cfg = SnapshotTierConfig::default();
        assert_eq!(cfg.classify(0.1), CaptureExperience::Excellent);
        assert_eq!(cfg.classify(1.0), CaptureExperience::Good);
        assert_eq!(cfg.classify(3.0), CaptureExperience::Acceptable);
        assert_eq!(cfg.classify(10.0), CaptureExperience::Slow);
    }
}
