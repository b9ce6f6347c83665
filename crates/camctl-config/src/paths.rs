use serde::{Deserialize, Serialize};

/// Filesystem layout for recordings and snapshots (spec §6.3).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    #[serde(default = "default_recordings_path")]
    pub recordings_path: String,
    #[serde(default = "default_snapshots_path")]
    pub snapshots_path: String,
    #[serde(default = "default_use_device_subdirs")]
    pub use_device_subdirs: bool,
    #[serde(default = "default_recording_filename_pattern")]
    pub recording_filename_pattern: String,
    #[serde(default = "default_snapshot_filename_pattern")]
    pub snapshot_filename_pattern: String,
}

fn default_recordings_path() -> String {
    "/var/lib/camctl/recordings".to_string()
}
fn default_snapshots_path() -> String {
    "/var/lib/camctl/snapshots".to_string()
}
fn default_use_device_subdirs() -> bool {
    true
}
fn default_recording_filename_pattern() -> String {
    "%Y-%m-%d_%H-%M-%S.mp4".to_string()
}
fn default_snapshot_filename_pattern() -> String {
    "%device_%timestamp.jpg".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            recordings_path: default_recordings_path(),
            snapshots_path: default_snapshots_path(),
            use_device_subdirs: default_use_device_subdirs(),
            recording_filename_pattern: default_recording_filename_pattern(),
            snapshot_filename_pattern: default_snapshot_filename_pattern(),
        }
    }
}
